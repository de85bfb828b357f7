use chorus_crypto::{generate_keypair, public_key};
use chorus_types::{BoxPrivateKey, BoxPublicKey, ChorusError, ChorusResult};
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:2718";

const DEFAULT_ROUND_INTERVAL_MS: u64 = 1000;
const DEFAULT_ROUND_WINDOW_MS: u64 = 500;

/// Per-server configuration, JSON on disk. The Laplace parameters feed the
/// cover-traffic sampler; the round timings only matter on the entry server.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerConfig {
    pub server_name: String,
    pub public_key: BoxPublicKey,
    pub private_key: BoxPrivateKey,

    #[serde(default)]
    pub listen_addr: Option<String>,
    #[serde(default)]
    pub ws_listen_addr: Option<String>,

    pub convo_mu: f64,
    pub convo_b: f64,

    #[serde(default = "default_round_interval_ms")]
    pub round_interval_ms: u64,
    #[serde(default = "default_round_window_ms")]
    pub round_window_ms: u64,
}

fn default_round_interval_ms() -> u64 {
    DEFAULT_ROUND_INTERVAL_MS
}

fn default_round_window_ms() -> u64 {
    DEFAULT_ROUND_WINDOW_MS
}

impl ServerConfig {
    pub fn from_file(path: impl AsRef<Path>) -> ChorusResult<Self> {
        let data = std::fs::read_to_string(path.as_ref())?;
        let config: ServerConfig =
            serde_json::from_str(&data).map_err(|e| ChorusError::Serialization(e.to_string()))?;
        Ok(config)
    }

    pub fn validate(&self) -> ChorusResult<()> {
        if self.server_name.is_empty() {
            return Err(ChorusError::Config("server_name must not be empty".into()));
        }
        if public_key(&self.private_key) != self.public_key {
            return Err(ChorusError::Config(
                "public_key does not match private_key".into(),
            ));
        }
        if self.convo_mu < 0.0 {
            return Err(ChorusError::Config("convo_mu must be nonnegative".into()));
        }
        if self.convo_b <= 0.0 {
            return Err(ChorusError::Config("convo_b must be positive".into()));
        }
        if self.round_window_ms >= self.round_interval_ms {
            return Err(ChorusError::Config(
                "round_window_ms must be shorter than round_interval_ms".into(),
            ));
        }
        Ok(())
    }

    /// Write a fresh config with a newly generated keypair.
    pub fn write_default(path: impl AsRef<Path>, server_name: &str) -> ChorusResult<()> {
        let (public_key, private_key) = generate_keypair(&mut rand::thread_rng());
        let config = ServerConfig {
            server_name: server_name.to_string(),
            public_key,
            private_key,
            listen_addr: None,
            ws_listen_addr: None,
            convo_mu: 300.0,
            convo_b: 13.8,
            round_interval_ms: DEFAULT_ROUND_INTERVAL_MS,
            round_window_ms: DEFAULT_ROUND_WINDOW_MS,
        };
        let data = serde_json::to_string_pretty(&config)
            .map_err(|e| ChorusError::Serialization(e.to_string()))?;
        std::fs::write(path.as_ref(), data)?;
        println!("wrote {:?}", path.as_ref());
        Ok(())
    }
}
