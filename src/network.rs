//! Networks a relayer can be operated against.
use std::{fmt, str::FromStr};

use strum::{AsRefStr, EnumString};

/// Public API endpoint of a local network started by the node tooling.
pub const LOCAL_API_ENDPOINT: &str = "http://127.0.0.1:9650";

/// Public API endpoint of the Fuji test network.
pub const FUJI_API_ENDPOINT: &str = "https://api.avax-test.network";

/// Public API endpoint of mainnet.
pub const MAINNET_API_ENDPOINT: &str = "https://api.avax.network";

/// Kind of network, used to scope on-host relayer state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumString, AsRefStr)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
pub enum NetworkKind {
    /// Local network on this host.
    Local,
    /// Devnet reachable at a custom endpoint.
    Devnet,
    /// Fuji test network.
    Fuji,
    /// Mainnet.
    Mainnet,
}

impl NetworkKind {
    /// Default API endpoint for the kind, if it has a well-known one.
    pub fn default_endpoint(&self) -> Option<&'static str> {
        match self {
            NetworkKind::Local => Some(LOCAL_API_ENDPOINT),
            NetworkKind::Devnet => None,
            NetworkKind::Fuji => Some(FUJI_API_ENDPOINT),
            NetworkKind::Mainnet => Some(MAINNET_API_ENDPOINT),
        }
    }
}

impl fmt::Display for NetworkKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_ref())
    }
}

/// A network together with the API endpoint the relayer queries for validator info.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Network {
    /// Network kind.
    pub kind: NetworkKind,
    /// Base URL of the info and P-Chain APIs.
    pub endpoint: String,
}

impl Network {
    /// Builds a network with an explicit endpoint.
    pub fn new(kind: NetworkKind, endpoint: impl Into<String>) -> Self {
        Self {
            kind,
            endpoint: endpoint.into(),
        }
    }

    /// Local network at the default endpoint.
    pub fn local() -> Self {
        Self::new(NetworkKind::Local, LOCAL_API_ENDPOINT)
    }

    /// Resolves a kind to a network, preferring `endpoint` over the kind's default.
    pub fn resolve(kind: NetworkKind, endpoint: Option<&str>) -> Result<Self, String> {
        match endpoint.or_else(|| kind.default_endpoint()) {
            Some(endpoint) => Ok(Self::new(kind, endpoint.trim_end_matches('/'))),
            None => Err(format!("network '{kind}' requires an explicit endpoint")),
        }
    }
}

impl FromStr for Network {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let kind = NetworkKind::from_str(s.trim())
            .map_err(|_| format!("unknown network '{s}' (expected local, devnet, fuji or mainnet)"))?;
        Self::resolve(kind, None)
    }
}
