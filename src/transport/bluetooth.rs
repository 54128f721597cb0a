//! # Bluetooth RFCOMM Transport
//!
//! Talks to a Zebra printer over the Bluetooth Serial Port Profile through
//! an RFCOMM TTY node.
//!
//! ## Bluetooth Setup (Linux)
//!
//! The printer must be paired and bound to an RFCOMM device first:
//!
//! ```bash
//! $ bluetoothctl
//! [bluetooth]# pair AC:3F:A4:XX:XX:XX
//! $ sudo rfcomm bind 0 AC:3F:A4:XX:XX:XX
//! # This creates /dev/rfcomm0
//! ```
//!
//! The transport accepts either the MAC address (the bound node is looked up
//! in `/proc/net/rfcomm`) or the device path itself.
//!
//! ## Timeouts
//!
//! The node is opened non-blocking. Every write and read waits on `poll(2)`
//! with the configured timeout, so a printer that drops off the air cannot
//! hang the session. The `rfcomm` and `bluetoothctl` helpers are killed if
//! they outlive the read timeout.
//!
//! RFCOMM nodes only exist on Unix; elsewhere `open` fails.

use std::fs::{self, File};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, info, instrument, warn};

use super::{Timeouts, Transport};
use crate::error::ProbeError;

/// Writes larger than this are split up
const CHUNK_SIZE: usize = 1024;

/// Poll interval while waiting for a helper command to exit
const COMMAND_POLL: Duration = Duration::from_millis(20);

/// # Bluetooth Printer Transport
///
/// ## Example
///
/// ```no_run
/// use zebra_probe::transport::{BluetoothTransport, Timeouts, Transport};
///
/// let mut transport = BluetoothTransport::new("AC:3F:A4:F0:94:3B", Timeouts::default());
/// transport.open()?;
/// transport.write(b"~WC")?;
/// transport.close()?;
/// # Ok::<(), zebra_probe::ProbeError>(())
/// ```
pub struct BluetoothTransport {
    address: String,
    timeouts: Timeouts,
    device: Option<PathBuf>,
    file: Option<File>,
}

impl BluetoothTransport {
    /// `address` is a MAC (`XX:XX:XX:XX:XX:XX`) or an RFCOMM device path.
    pub fn new(address: &str, timeouts: Timeouts) -> Self {
        Self {
            address: address.trim().to_string(),
            timeouts,
            device: None,
            file: None,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// Device node in use, once opened
    pub fn device(&self) -> Option<&Path> {
        self.device.as_deref()
    }

    fn resolve_device(&self) -> Result<PathBuf, ProbeError> {
        if self.address.starts_with('/') {
            return Ok(PathBuf::from(&self.address));
        }

        if !is_valid_mac(&self.address) {
            return Err(ProbeError::Transport(format!(
                "Invalid Bluetooth address '{}'",
                self.address
            )));
        }

        find_rfcomm_for_mac(&self.address, self.timeouts.read)?
            .map(PathBuf::from)
            .ok_or_else(|| {
                ProbeError::Transport(format!(
                    "No RFCOMM device bound to {} (try `rfcomm bind 0 {}`)",
                    self.address, self.address
                ))
            })
    }

    fn file_mut(&mut self) -> Result<&mut File, ProbeError> {
        self.file
            .as_mut()
            .ok_or_else(|| ProbeError::Transport("Not connected".to_string()))
    }

    /// Write one chunk, waiting for the TTY to drain between partial writes.
    fn write_chunk(&mut self, chunk: &[u8]) -> Result<(), ProbeError> {
        let timeout = self.timeouts.write;
        let deadline = Instant::now() + timeout;
        let file = self.file_mut()?;
        let mut rest = chunk;

        while !rest.is_empty() {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() || !wait_for(file, Readiness::Write, remaining)? {
                return Err(ProbeError::Timeout(format!(
                    "Write timeout after {:?}",
                    timeout
                )));
            }

            match file.write(rest) {
                Ok(0) => {
                    return Err(ProbeError::Transport(
                        "Write failed: device accepted no data".to_string(),
                    ));
                }
                Ok(n) => rest = &rest[n..],
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => continue,
                Err(e) => return Err(ProbeError::Transport(format!("Write failed: {}", e))),
            }
        }

        Ok(())
    }
}

impl Transport for BluetoothTransport {
    #[instrument(skip(self), fields(address = %self.address))]
    fn open(&mut self) -> Result<(), ProbeError> {
        if self.file.is_some() {
            return Ok(());
        }

        let path = self.resolve_device()?;
        debug!(device = %path.display(), "Opening RFCOMM device");

        let file = open_device(&path).map_err(|e| {
            ProbeError::Transport(format!("Failed to open {}: {}", path.display(), e))
        })?;

        configure_tty_raw(&file)?;

        info!(device = %path.display(), "Connected to printer");
        self.device = Some(path);
        self.file = Some(file);
        Ok(())
    }

    fn is_connected(&self) -> bool {
        match (&self.file, &self.device) {
            (Some(_), Some(path)) => path.exists(),
            _ => false,
        }
    }

    fn write(&mut self, data: &[u8]) -> Result<(), ProbeError> {
        for chunk in data.chunks(CHUNK_SIZE) {
            self.write_chunk(chunk)?;
        }
        Ok(())
    }

    fn read(&mut self, buf: &mut [u8]) -> Result<usize, ProbeError> {
        let timeout = self.timeouts.read;
        let file = self.file_mut()?;

        if !wait_for(file, Readiness::Read, timeout)? {
            return Ok(0);
        }

        match file.read(buf) {
            Ok(n) => Ok(n),
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(0),
            Err(e) => Err(ProbeError::Transport(format!("Read failed: {}", e))),
        }
    }

    fn discard_input(&mut self, grace: Duration) -> Result<usize, ProbeError> {
        let file = self.file_mut()?;
        let mut buf = [0u8; 256];
        let mut discarded = 0;

        while wait_for(file, Readiness::Read, grace)? {
            match file.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => discarded += n,
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => return Err(ProbeError::Transport(format!("Read failed: {}", e))),
            }
        }

        if discarded > 0 {
            debug!(bytes = discarded, "Discarded stale input");
        }
        Ok(discarded)
    }

    fn close(&mut self) -> Result<(), ProbeError> {
        // Dropping the File closes the descriptor and releases the link
        self.file = None;
        Ok(())
    }

    fn friendly_name(&self) -> Option<String> {
        if !is_valid_mac(&self.address) {
            return None;
        }
        let mut command = Command::new("bluetoothctl");
        command.arg("info").arg(self.address.to_uppercase());
        let output = run_bounded(&mut command, self.timeouts.read).ok()??;
        parse_device_name(&String::from_utf8_lossy(&output.stdout))
    }

    fn describe(&self) -> String {
        match &self.device {
            Some(path) => format!("bt://{} ({})", self.address, path.display()),
            None => format!("bt://{}", self.address),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Readiness {
    Read,
    Write,
}

#[cfg(unix)]
fn open_device(path: &Path) -> io::Result<File> {
    use std::fs::OpenOptions;
    use std::os::unix::fs::OpenOptionsExt;

    OpenOptions::new()
        .read(true)
        .write(true)
        .custom_flags(libc::O_NOCTTY | libc::O_NONBLOCK)
        .open(path)
}

#[cfg(not(unix))]
fn open_device(_path: &Path) -> io::Result<File> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "RFCOMM devices are only supported on Unix",
    ))
}

/// Wait until `file` is ready for `readiness`. Returns `false` on timeout.
///
/// Data still buffered when the printer hangs up is reported as readable;
/// the hangup only becomes an error once nothing is left to read.
#[cfg(unix)]
fn wait_for(file: &File, readiness: Readiness, timeout: Duration) -> Result<bool, ProbeError> {
    use std::os::unix::io::AsRawFd;

    let events = match readiness {
        Readiness::Read => libc::POLLIN,
        Readiness::Write => libc::POLLOUT,
    };
    let millis = timeout.as_millis().min(libc::c_int::MAX as u128) as libc::c_int;
    let mut pfd = libc::pollfd {
        fd: file.as_raw_fd(),
        events,
        revents: 0,
    };

    loop {
        let result = unsafe { libc::poll(&mut pfd, 1, millis) };
        if result < 0 {
            let err = io::Error::last_os_error();
            if err.kind() == io::ErrorKind::Interrupted {
                continue;
            }
            return Err(ProbeError::Transport(format!("poll failed: {}", err)));
        }
        if result == 0 {
            return Ok(false);
        }
        if pfd.revents & events != 0 {
            return Ok(true);
        }
        if pfd.revents & (libc::POLLERR | libc::POLLHUP) != 0 {
            return Err(ProbeError::Transport("Device hung up".to_string()));
        }
        return Ok(false);
    }
}

#[cfg(not(unix))]
fn wait_for(_file: &File, _readiness: Readiness, _timeout: Duration) -> Result<bool, ProbeError> {
    Ok(true)
}

/// Configure the device for raw TTY mode.
///
/// Binary label data must pass through unmodified: no CR/LF translation, no
/// echo, no XON/XOFF (0x11/0x13 may appear in graphics fields).
#[cfg(unix)]
fn configure_tty_raw(file: &File) -> Result<(), ProbeError> {
    use std::mem::MaybeUninit;
    use std::os::unix::io::AsRawFd;

    let fd = file.as_raw_fd();
    let mut termios = MaybeUninit::uninit();
    let result = unsafe { libc::tcgetattr(fd, termios.as_mut_ptr()) };
    if result != 0 {
        return Err(ProbeError::Transport(format!(
            "tcgetattr failed: {}",
            io::Error::last_os_error()
        )));
    }
    let mut termios = unsafe { termios.assume_init() };

    termios.c_iflag &= !(libc::IGNBRK
        | libc::BRKINT
        | libc::PARMRK
        | libc::ISTRIP
        | libc::INLCR
        | libc::IGNCR
        | libc::ICRNL
        | libc::IXON
        | libc::IXOFF
        | libc::IXANY);
    termios.c_oflag &= !libc::OPOST;
    termios.c_lflag &= !(libc::ECHO | libc::ECHONL | libc::ICANON | libc::ISIG | libc::IEXTEN);
    termios.c_cflag &= !(libc::CSIZE | libc::PARENB);
    termios.c_cflag |= libc::CS8;

    let result = unsafe { libc::tcsetattr(fd, libc::TCSANOW, &termios) };
    if result != 0 {
        return Err(ProbeError::Transport(format!(
            "tcsetattr failed: {}",
            io::Error::last_os_error()
        )));
    }

    Ok(())
}

#[cfg(not(unix))]
fn configure_tty_raw(_file: &File) -> Result<(), ProbeError> {
    Ok(())
}

/// Run a helper command, giving up after `timeout`.
///
/// Returns `Ok(None)` when the command had to be killed. `bluetoothctl`
/// blocks indefinitely when bluetoothd is not running.
fn run_bounded(command: &mut Command, timeout: Duration) -> io::Result<Option<Output>> {
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .spawn()?;
    let deadline = Instant::now() + timeout;

    loop {
        if child.try_wait()?.is_some() {
            return child.wait_with_output().map(Some);
        }
        if Instant::now() >= deadline {
            warn!(?command, ?timeout, "Helper command timed out, killing it");
            // The child may exit on its own between try_wait and kill
            let _ = child.kill();
            child.wait()?;
            return Ok(None);
        }
        thread::sleep(COMMAND_POLL);
    }
}

/// Validate a Bluetooth MAC address format (XX:XX:XX:XX:XX:XX).
pub fn is_valid_mac(mac: &str) -> bool {
    let parts: Vec<&str> = mac.split(':').collect();
    if parts.len() != 6 {
        return false;
    }
    parts
        .iter()
        .all(|part| part.len() == 2 && part.chars().all(|c| c.is_ascii_hexdigit()))
}

/// Find an existing RFCOMM device bound to the given MAC address.
///
/// Checks `/proc/net/rfcomm` and falls back to `rfcomm -a`, which may run
/// for at most `timeout`.
#[cfg(unix)]
pub fn find_rfcomm_for_mac(mac: &str, timeout: Duration) -> Result<Option<String>, ProbeError> {
    if let Ok(contents) = fs::read_to_string("/proc/net/rfcomm") {
        if let Some(path) = device_for_mac(&contents, mac) {
            return Ok(Some(path));
        }
    }

    let mut command = Command::new("rfcomm");
    command.arg("-a");
    let output = run_bounded(&mut command, timeout)
        .map_err(|e| ProbeError::Transport(format!("Failed to run 'rfcomm -a': {}", e)))?
        .ok_or_else(|| ProbeError::Timeout(format!("'rfcomm -a' gave no answer in {:?}", timeout)))?;

    Ok(device_for_mac(&String::from_utf8_lossy(&output.stdout), mac))
}

#[cfg(not(unix))]
pub fn find_rfcomm_for_mac(_mac: &str, _timeout: Duration) -> Result<Option<String>, ProbeError> {
    Ok(None)
}

/// Scan an rfcomm listing (`rfcomm0: XX:XX:... channel 1 clean`) for `mac`.
fn device_for_mac(listing: &str, mac: &str) -> Option<String> {
    let mac_upper = mac.to_uppercase();
    listing
        .lines()
        .filter(|line| line.to_uppercase().contains(&mac_upper))
        .filter_map(|line| line.split(':').next())
        .map(|name| format!("/dev/{}", name.trim()))
        .find(|path| Path::new(path).exists())
}

/// Pull the `Name:` field out of `bluetoothctl info` output.
fn parse_device_name(info: &str) -> Option<String> {
    info.lines()
        .map(str::trim)
        .find_map(|line| line.strip_prefix("Name:"))
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
}
