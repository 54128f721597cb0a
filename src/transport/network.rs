//! # Network Transport
//!
//! Raw TCP link to a printer. Zebra printers accept ZPL, CPCL and SGD on
//! port 9100 and answer queries on the same socket.

use std::io::{self, Read, Write};
use std::net::{Shutdown, SocketAddr, TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::{debug, info, instrument};

use super::{Timeouts, Transport};
use crate::error::ProbeError;

/// Default raw printing port
pub const DEFAULT_PORT: u16 = 9100;

/// TCP connection to a printer.
#[derive(Debug)]
pub struct NetworkTransport {
    host: String,
    port: u16,
    timeouts: Timeouts,
    stream: Option<TcpStream>,
}

impl NetworkTransport {
    pub fn new(host: &str, port: u16, timeouts: Timeouts) -> Self {
        Self {
            host: host.to_string(),
            port,
            timeouts,
            stream: None,
        }
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    fn resolve(&self) -> Result<Vec<SocketAddr>, ProbeError> {
        let addrs: Vec<SocketAddr> = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| {
                ProbeError::Transport(format!("Cannot resolve {}: {}", self.host, e))
            })?
            .collect();

        if addrs.is_empty() {
            return Err(ProbeError::Transport(format!(
                "No address found for {}",
                self.host
            )));
        }
        Ok(addrs)
    }

    fn stream_mut(&mut self) -> Result<&mut TcpStream, ProbeError> {
        self.stream
            .as_mut()
            .ok_or_else(|| ProbeError::Transport("Not connected".to_string()))
    }
}

impl Transport for NetworkTransport {
    #[instrument(skip(self), fields(host = %self.host, port = self.port))]
    fn open(&mut self) -> Result<(), ProbeError> {
        if self.stream.is_some() {
            return Ok(());
        }

        let mut last_err = None;
        for addr in self.resolve()? {
            debug!(%addr, "Connecting");
            match TcpStream::connect_timeout(&addr, self.timeouts.open) {
                Ok(stream) => {
                    stream.set_write_timeout(Some(self.timeouts.write))?;
                    stream.set_read_timeout(Some(self.timeouts.read))?;
                    stream.set_nodelay(true)?;
                    info!(%addr, "Connected to printer");
                    self.stream = Some(stream);
                    return Ok(());
                }
                Err(e) => last_err = Some((addr, e)),
            }
        }

        match last_err {
            Some((addr, e)) if e.kind() == io::ErrorKind::TimedOut => Err(ProbeError::Timeout(
                format!("Connection timeout: {}", addr),
            )),
            Some((addr, e)) => Err(ProbeError::Transport(format!("{}: {}", addr, e))),
            None => Err(ProbeError::Transport(format!(
                "No address found for {}",
                self.host
            ))),
        }
    }

    fn is_connected(&self) -> bool {
        self.stream
            .as_ref()
            .is_some_and(|stream| stream.peer_addr().is_ok())
    }

    fn write(&mut self, data: &[u8]) -> Result<(), ProbeError> {
        let stream = self.stream_mut()?;
        stream
            .write_all(data)
            .and_then(|_| stream.flush())
            .map_err(|e| match e.kind() {
                io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut => {
                    ProbeError::Timeout(format!("Write timeout after {} bytes", data.len()))
                }
                _ => ProbeError::Transport(format!("Write failed: {}", e)),
            })
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, ProbeError> {
        let stream = self.stream_mut()?;
        match stream.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                Ok(0)
            }
            Err(e) => Err(ProbeError::Transport(format!("Read failed: {}", e))),
        }
    }

    fn discard_input(&mut self, grace: Duration) -> Result<usize, ProbeError> {
        let read_timeout = self.timeouts.read;
        let stream = self.stream_mut()?;
        // A zero read timeout is rejected by the socket API
        stream.set_read_timeout(Some(grace.max(Duration::from_millis(1))))?;

        let mut buf = [0u8; 256];
        let mut discarded = 0;
        let result = loop {
            match stream.read(&mut buf) {
                Ok(0) => break Ok(discarded),
                Ok(n) => discarded += n,
                Err(e) if matches!(e.kind(), io::ErrorKind::WouldBlock | io::ErrorKind::TimedOut) => {
                    break Ok(discarded);
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => break Err(ProbeError::Transport(format!("Read failed: {}", e))),
            }
        };

        stream.set_read_timeout(Some(read_timeout))?;
        if let Ok(n) = result {
            if n > 0 {
                debug!(bytes = n, "Discarded stale input");
            }
        }
        result
    }

    fn close(&mut self) -> Result<(), ProbeError> {
        if let Some(stream) = self.stream.take() {
            match stream.shutdown(Shutdown::Both) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotConnected => {}
                Err(e) => return Err(ProbeError::Io(e)),
            }
        }
        Ok(())
    }

    fn describe(&self) -> String {
        format!("tcp://{}:{}", self.host, self.port)
    }
}
