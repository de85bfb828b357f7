#![forbid(unsafe_code)]
#![warn(clippy::all)]

pub mod chain;
pub mod config;
pub mod convo;
pub mod coordinator;
pub mod deaddrop;
pub mod histogram;
pub mod noise;
pub mod rounds;
pub mod rpc;
pub mod ws;

pub use config::ServerConfig;
pub use convo::ConvoService;
pub use histogram::{access_count_channel, AccessCount, Histogram};
