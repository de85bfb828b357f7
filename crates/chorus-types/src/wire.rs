use crate::ChorusError;
use serde::{Deserialize, Serialize};
use serde_with::base64::Base64;
use serde_with::serde_as;
use thiserror::Error;

/// Server-to-server RPC surface, identical at every server. Carried as
/// bincode inside length-delimited frames.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum RpcRequest {
    NewRound { round: u32, route: Vec<String> },
    Open { round: u32, num_incoming: u32 },
    Add { round: u32, offset: u32, onions: Vec<Vec<u8>> },
    Close { round: u32 },
    Get { round: u32, offset: u32, count: u32 },
    Delete { round: u32 },
}

impl RpcRequest {
    pub fn method(&self) -> &'static str {
        match self {
            RpcRequest::NewRound { .. } => "ConvoService.NewRound",
            RpcRequest::Open { .. } => "ConvoService.Open",
            RpcRequest::Add { .. } => "ConvoService.Add",
            RpcRequest::Close { .. } => "ConvoService.Close",
            RpcRequest::Get { .. } => "ConvoService.Get",
            RpcRequest::Delete { .. } => "ConvoService.Delete",
        }
    }

    pub fn round(&self) -> u32 {
        match *self {
            RpcRequest::NewRound { round, .. }
            | RpcRequest::Open { round, .. }
            | RpcRequest::Add { round, .. }
            | RpcRequest::Close { round }
            | RpcRequest::Get { round, .. }
            | RpcRequest::Delete { round } => round,
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum RpcResponse {
    Ack,
    Onions(Vec<Vec<u8>>),
}

/// Error as it travels on the RPC wire. A chain break keeps its structure so
/// the failed server's name survives all the way to the head server; every
/// other error flattens to a string.
#[derive(Clone, Debug, Error, Serialize, Deserialize)]
pub enum WireError {
    #[error("round {round}: server chain broken at {failed}")]
    ChainBroken { round: u32, failed: String },
    #[error("{0}")]
    Other(String),
}

impl From<&ChorusError> for WireError {
    fn from(err: &ChorusError) -> Self {
        match err {
            ChorusError::ChainBroken { round, failed } => WireError::ChainBroken {
                round: *round,
                failed: failed.clone(),
            },
            other => WireError::Other(other.to_string()),
        }
    }
}

impl From<WireError> for ChorusError {
    fn from(err: WireError) -> Self {
        match err {
            WireError::ChainBroken { round, failed } => ChorusError::ChainBroken { round, failed },
            WireError::Other(msg) => ChorusError::Rpc(msg),
        }
    }
}

/// One in-flight call. Ids pair concurrent responses with their requests on
/// a single connection.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RequestFrame {
    pub id: u64,
    pub request: RpcRequest,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResponseFrame {
    pub id: u64,
    pub result: Result<RpcResponse, WireError>,
}

/// Client-to-entry WebSocket envelope, JSON with a type tag. Onion bytes
/// travel base64-encoded.
#[serde_as]
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum Envelope {
    AnnounceConvoRound {
        round: u32,
    },
    ConvoRequest {
        round: u32,
        #[serde_as(as = "Base64")]
        onion: Vec<u8>,
    },
    ConvoResponse {
        round: u32,
        #[serde_as(as = "Base64")]
        onion: Vec<u8>,
    },
    ConvoError {
        round: u32,
        err: String,
    },
}
