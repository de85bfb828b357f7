mod client;
mod server;

pub use client::RpcClient;
pub use server::serve;

use tokio_util::codec::LengthDelimitedCodec;

const MAX_FRAME_LENGTH: usize = 64 * 1024 * 1024;

pub(crate) fn codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .max_frame_length(MAX_FRAME_LENGTH)
        .new_codec()
}
