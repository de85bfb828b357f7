use thiserror::Error;

#[derive(Error, Debug)]
pub enum ChorusError {
    #[error("Cryptographic error: {0}")]
    Crypto(String),

    #[error("Invalid key format: {0}")]
    InvalidKey(String),

    #[error("PKI error: {0}")]
    Pki(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("round {0} not found")]
    RoundNotFound(u32),

    #[error("round {0} already exists")]
    RoundExists(u32),

    #[error("round {round}: status {status}, expecting {expecting}")]
    RoundStatus {
        round: u32,
        status: String,
        expecting: String,
    },

    #[error("overflowing onions (offset={offset}, onions={onions}, incoming={incoming})")]
    OnionOverflow {
        offset: usize,
        onions: usize,
        incoming: usize,
    },

    /// Recoverable chain abort: the named downstream server was unreachable
    /// and a skip peer exists, so the client can drop it from the route and
    /// retry in a later round.
    #[error("round {round}: server chain broken at {failed}")]
    ChainBroken { round: u32, failed: String },

    /// Downstream unreachable with no skip peer configured.
    #[error("server chain down: {0}")]
    ChainFatal(String),

    /// Error reported by a remote server over the RPC channel.
    #[error("rpc: {0}")]
    Rpc(String),

    #[error("internal error: {0}")]
    Internal(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type ChorusResult<T> = Result<T, ChorusError>;
