//! # Printer Transport Layer
//!
//! This module provides the byte links used to talk to a printer.
//!
//! ## Available Transports
//!
//! - [`bluetooth`]: Bluetooth RFCOMM TTY (Linux)
//! - [`network`]: raw TCP socket, port 9100 by default
//!
//! ## Ownership
//!
//! A session never holds a bare transport. [`Connector`] builds one per run
//! and the controller wraps it in a [`TransportGuard`], which closes the link
//! exactly once: either explicitly during disconnect or when the guard is
//! dropped.

pub mod bluetooth;
pub mod network;

use std::time::Duration;

use tracing::{debug, warn};

use crate::error::ProbeError;
use crate::session::Endpoint;

pub use bluetooth::BluetoothTransport;
pub use network::NetworkTransport;

/// A bidirectional byte link to a printer.
///
/// Implementations are blocking. Bounded waits come from the [`Timeouts`]
/// the transport was built with.
pub trait Transport: Send {
    /// Establish the link.
    fn open(&mut self) -> Result<(), ProbeError>;

    /// Whether the link is currently usable.
    fn is_connected(&self) -> bool;

    /// Send all of `data`.
    fn write(&mut self, data: &[u8]) -> Result<(), ProbeError>;

    /// Read whatever the printer has sent.
    ///
    /// Waits at most the read timeout and returns `Ok(0)` when nothing
    /// arrived in time.
    fn read(&mut self, buf: &mut [u8]) -> Result<usize, ProbeError>;

    /// Throw away input left over from an earlier exchange.
    ///
    /// Keeps reading until nothing arrives for `grace` and returns how many
    /// bytes were dropped. Links that never buffer input can keep the
    /// default.
    fn discard_input(&mut self, grace: Duration) -> Result<usize, ProbeError> {
        let _ = grace;
        Ok(0)
    }

    /// Tear the link down. Calling this on a closed or never-opened
    /// transport is a no-op.
    fn close(&mut self) -> Result<(), ProbeError>;

    /// Human-readable device name, when the link type has one.
    fn friendly_name(&self) -> Option<String> {
        None
    }

    /// Short description for logs, e.g. `tcp://10.0.0.5:9100`.
    fn describe(&self) -> String;
}

/// Upper bounds for blocking transport operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub open: Duration,
    pub write: Duration,
    pub read: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            open: Duration::from_secs(10),
            write: Duration::from_secs(10),
            read: Duration::from_secs(3),
        }
    }
}

/// Builds a transport for an endpoint.
///
/// The controller calls this once per run. Tests substitute a scripted
/// implementation.
pub trait Connector: Send + Sync {
    fn connect(&self, endpoint: &Endpoint) -> Box<dyn Transport>;
}

/// Connector backed by the operating system's sockets and RFCOMM nodes.
#[derive(Debug, Clone, Default)]
pub struct SystemConnector {
    timeouts: Timeouts,
}

impl SystemConnector {
    pub fn new(timeouts: Timeouts) -> Self {
        Self { timeouts }
    }
}

impl Connector for SystemConnector {
    fn connect(&self, endpoint: &Endpoint) -> Box<dyn Transport> {
        match endpoint {
            Endpoint::Bluetooth { address } => {
                Box::new(BluetoothTransport::new(address, self.timeouts))
            }
            Endpoint::Network { host, port } => {
                Box::new(NetworkTransport::new(host, *port, self.timeouts))
            }
        }
    }
}

/// Owns a transport for the duration of one run and closes it exactly once.
pub struct TransportGuard {
    inner: Box<dyn Transport>,
    closed: bool,
}

impl TransportGuard {
    pub fn new(inner: Box<dyn Transport>) -> Self {
        Self {
            inner,
            closed: false,
        }
    }

    /// Access the guarded transport.
    pub fn get_mut(&mut self) -> &mut dyn Transport {
        self.inner.as_mut()
    }

    pub fn get(&self) -> &dyn Transport {
        self.inner.as_ref()
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Close the transport. Only the first call reaches the transport.
    pub fn close(&mut self) -> Result<(), ProbeError> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;
        debug!(transport = %self.inner.describe(), "Closing transport");
        self.inner.close()
    }
}

impl Drop for TransportGuard {
    fn drop(&mut self) {
        if !self.closed {
            if let Err(e) = self.close() {
                warn!(error = %e, "Failed to close transport on drop");
            }
        }
    }
}
