use crate::{
    BoxPublicKey, ChorusError, ChorusResult, BOX_OVERHEAD, DEFAULT_SERVER_PORT,
    ONION_LAYER_OVERHEAD,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerInfo {
    #[serde(rename = "Address")]
    pub address: String,
    #[serde(rename = "PublicKey")]
    pub public_key: BoxPublicKey,
}

/// Globally known PKI snapshot, immutable during a round. Loaded from the
/// JSON file shared by all participants.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Pki {
    #[serde(rename = "People", default)]
    pub people: HashMap<String, BoxPublicKey>,
    #[serde(rename = "Servers")]
    pub servers: HashMap<String, ServerInfo>,
    #[serde(rename = "ServerOrder")]
    pub server_order: Vec<String>,
    #[serde(rename = "EntryServer", default)]
    pub entry_server: String,
}

impl Pki {
    pub fn from_file(path: impl AsRef<Path>) -> ChorusResult<Self> {
        let data = std::fs::read_to_string(path.as_ref())?;
        let pki: Pki = serde_json::from_str(&data)
            .map_err(|e| ChorusError::Serialization(e.to_string()))?;
        pki.validate()?;
        Ok(pki)
    }

    pub fn validate(&self) -> ChorusResult<()> {
        if self.server_order.is_empty() {
            return Err(ChorusError::Pki(
                "ServerOrder must contain at least one server".into(),
            ));
        }
        for name in &self.server_order {
            let info = self
                .servers
                .get(name)
                .ok_or_else(|| ChorusError::Pki(format!("server {:?} not found", name)))?;
            if info.address.is_empty() {
                return Err(ChorusError::Pki(format!(
                    "server {:?} does not specify an Address",
                    name
                )));
            }
        }
        Ok(())
    }

    /// Resolve a server's address, appending the default port when the PKI
    /// entry does not name one.
    pub fn server_addr(&self, name: &str) -> ChorusResult<String> {
        let info = self
            .servers
            .get(name)
            .ok_or_else(|| ChorusError::Pki(format!("server {:?} not found", name)))?;
        if info.address.contains(':') {
            Ok(info.address.clone())
        } else {
            Ok(format!("{}:{}", info.address, DEFAULT_SERVER_PORT))
        }
    }

    /// Public keys of every server on the route, in route order. This is the
    /// key sequence a client seals its onion through.
    pub fn server_keys(&self, route: &[String]) -> ChorusResult<Vec<BoxPublicKey>> {
        route
            .iter()
            .map(|name| {
                self.servers
                    .get(name)
                    .map(|info| info.public_key)
                    .ok_or_else(|| ChorusError::Pki(format!("server {:?} not found", name)))
            })
            .collect()
    }

    pub fn first_server_addr(&self, route: &[String]) -> ChorusResult<String> {
        let name = route
            .first()
            .ok_or_else(|| ChorusError::Pki("empty route".into()))?;
        self.server_addr(name)
    }

    pub fn last_server_addr(&self, route: &[String]) -> ChorusResult<String> {
        let name = route
            .last()
            .ok_or_else(|| ChorusError::Pki("empty route".into()))?;
        self.server_addr(name)
    }

    pub fn index(&self, server_name: &str, route: &[String]) -> Option<usize> {
        route.iter().position(|s| s == server_name)
    }

    pub fn is_last(&self, server_name: &str, route: &[String]) -> bool {
        route.last().map(String::as_str) == Some(server_name)
    }

    /// The server one hop downstream, if any.
    pub fn next_server_name<'a>(&self, server_name: &str, route: &'a [String]) -> Option<&'a str> {
        let i = self.index(server_name, route)?;
        route.get(i + 1).map(String::as_str)
    }

    /// The server two hops downstream, used as the failover target when the
    /// immediate next server is unreachable.
    pub fn skip_server_name<'a>(&self, server_name: &str, route: &'a [String]) -> Option<&'a str> {
        let i = self.index(server_name, route)?;
        route.get(i + 2).map(String::as_str)
    }

    pub fn next_server_addr(&self, server_name: &str, route: &[String]) -> Option<String> {
        let name = self.next_server_name(server_name, route)?;
        self.server_addr(name).ok()
    }

    pub fn skip_server_addr(&self, server_name: &str, route: &[String]) -> Option<String> {
        let name = self.skip_server_name(server_name, route)?;
        self.server_addr(name).ok()
    }

    /// Public keys of every server after the named one, in route order. Cover
    /// traffic generated at that server is sealed through exactly these keys.
    pub fn next_server_keys(
        &self,
        server_name: &str,
        route: &[String],
    ) -> ChorusResult<Vec<BoxPublicKey>> {
        let i = self
            .index(server_name, route)
            .ok_or_else(|| ChorusError::Pki(format!("server {:?} not on route", server_name)))?;
        self.server_keys(&route[i + 1..])
    }

    /// Layer bytes around the inner payload of an onion arriving at the named
    /// server: one full layer per remaining hop, this server included.
    pub fn incoming_onion_overhead(
        &self,
        server_name: &str,
        route: &[String],
    ) -> ChorusResult<usize> {
        let i = self
            .index(server_name, route)
            .ok_or_else(|| ChorusError::Pki(format!("server {:?} not on route", server_name)))?;
        Ok((route.len() - i) * ONION_LAYER_OVERHEAD)
    }

    /// Seal bytes around the reply leaving the named server toward the
    /// client: replies reuse the forward shared keys, so each hop adds only
    /// the authenticator.
    pub fn outgoing_onion_overhead(
        &self,
        server_name: &str,
        route: &[String],
    ) -> ChorusResult<usize> {
        let i = self
            .index(server_name, route)
            .ok_or_else(|| ChorusError::Pki(format!("server {:?} not on route", server_name)))?;
        Ok((route.len() - i) * BOX_OVERHEAD)
    }
}
