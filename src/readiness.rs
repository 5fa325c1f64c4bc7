//! Service-manager readiness notifications.
//!
//! When started under a supervisor that sets `NOTIFY_SOCKET` (systemd with
//! `Type=notify`), the daemon reports `READY=1` once the scan loop is about
//! to start and `STOPPING=1` on shutdown. Without the variable every call
//! is a no-op.

use std::io;

const NOTIFY_SOCKET_ENV: &str = "NOTIFY_SOCKET";

/// Sends a raw state string such as `READY=1`.
///
/// Returns `Ok(false)` if no notification socket is configured.
pub fn notify(state: &str) -> io::Result<bool> {
    match std::env::var_os(NOTIFY_SOCKET_ENV) {
        Some(socket) if !socket.is_empty() => {
            send(&socket, state)?;
            Ok(true)
        }
        _ => Ok(false),
    }
}

/// Reports that startup is complete.
pub fn notify_ready() -> io::Result<bool> {
    notify("READY=1")
}

/// Reports that shutdown has begun.
pub fn notify_stopping() -> io::Result<bool> {
    notify("STOPPING=1")
}

/// Publishes a free-form status line.
pub fn notify_status(status: &str) -> io::Result<bool> {
    notify(&format!("STATUS={}", status.replace('\n', " ")))
}

#[cfg(unix)]
fn send(socket: &std::ffi::OsStr, state: &str) -> io::Result<()> {
    use std::os::unix::ffi::OsStrExt;
    use std::os::unix::net::UnixDatagram;

    let datagram = UnixDatagram::unbound()?;
    let bytes = socket.as_bytes();

    if let Some(name) = bytes.strip_prefix(b"@") {
        return send_abstract(&datagram, name, state);
    }

    datagram.send_to(state.as_bytes(), std::path::Path::new(socket))?;
    Ok(())
}

#[cfg(target_os = "linux")]
fn send_abstract(
    datagram: &std::os::unix::net::UnixDatagram,
    name: &[u8],
    state: &str,
) -> io::Result<()> {
    use std::os::linux::net::SocketAddrExt;
    use std::os::unix::net::SocketAddr;

    let addr = SocketAddr::from_abstract_name(name)?;
    datagram.send_to_addr(state.as_bytes(), &addr)?;
    Ok(())
}

#[cfg(all(unix, not(target_os = "linux")))]
fn send_abstract(
    _datagram: &std::os::unix::net::UnixDatagram,
    _name: &[u8],
    _state: &str,
) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "abstract notification sockets are Linux-only",
    ))
}

#[cfg(not(unix))]
fn send(_socket: &std::ffi::OsStr, _state: &str) -> io::Result<()> {
    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "readiness notification requires Unix sockets",
    ))
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::net::UnixDatagram;

    #[test]
    fn test_send_to_path_socket() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("notify.sock");
        let listener = UnixDatagram::bind(&path).unwrap();

        send(path.as_os_str(), "READY=1").unwrap();

        let mut buf = [0u8; 64];
        let n = listener.recv(&mut buf).unwrap();
        assert_eq!(&buf[..n], b"READY=1");
    }

    #[test]
    fn test_send_to_missing_socket_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.sock");
        assert!(send(path.as_os_str(), "STOPPING=1").is_err());
    }
}
