//! Connection settings as entered by the user, and their validated form.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::SessionError;

/// How to reach the printer, exactly as the user supplied it.
///
/// The network port stays a string here: validating it is the first step
/// of a run, and a malformed value must fail the run before any transport
/// is built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConnectionConfig {
    Bluetooth { address: String },
    Network { host: String, port: String },
}

impl ConnectionConfig {
    pub fn bluetooth(address: impl Into<String>) -> Self {
        ConnectionConfig::Bluetooth {
            address: address.into(),
        }
    }

    pub fn network(host: impl Into<String>, port: impl Into<String>) -> Self {
        ConnectionConfig::Network {
            host: host.into(),
            port: port.into(),
        }
    }

    /// Validate into an [`Endpoint`].
    ///
    /// Fails with [`SessionError::InvalidPort`] when the port is not an
    /// integer in `1..=65535`.
    pub fn resolve(&self) -> Result<Endpoint, SessionError> {
        match self {
            ConnectionConfig::Bluetooth { address } => Ok(Endpoint::Bluetooth {
                address: address.trim().to_string(),
            }),
            ConnectionConfig::Network { host, port } => {
                let port = parse_port(port)?;
                Ok(Endpoint::Network {
                    host: host.trim().to_string(),
                    port,
                })
            }
        }
    }
}

impl fmt::Display for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionConfig::Bluetooth { address } => write!(f, "bt://{}", address),
            ConnectionConfig::Network { host, port } => write!(f, "tcp://{}:{}", host, port),
        }
    }
}

fn parse_port(raw: &str) -> Result<u16, SessionError> {
    match raw.trim().parse::<u16>() {
        Ok(0) | Err(_) => Err(SessionError::InvalidPort(raw.to_string())),
        Ok(port) => Ok(port),
    }
}

/// A validated, connectable printer address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    Bluetooth { address: String },
    Network { host: String, port: u16 },
}

impl Endpoint {
    pub fn is_bluetooth(&self) -> bool {
        matches!(self, Endpoint::Bluetooth { .. })
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Endpoint::Bluetooth { address } => write!(f, "bt://{}", address),
            Endpoint::Network { host, port } => write!(f, "tcp://{}:{}", host, port),
        }
    }
}
