use std::net::TcpStream;
use std::time::Duration;

use crate::health::HealthCheckerError;

/// A raw TCP connect to `addr` (`host:port`) must succeed within `timeout`
/// (spec §4.3).
pub fn check(addr: &str, timeout: Duration) -> Result<(), HealthCheckerError> {
    let socket_addr = addr
        .to_socket_addrs_one()
        .map_err(|err| HealthCheckerError::Failed(format!("{addr}: {err}")))?;

    TcpStream::connect_timeout(&socket_addr, timeout)
        .map(|_| ())
        .map_err(|err| HealthCheckerError::Failed(format!("{addr}: {err}")))
}

trait ToSocketAddrOne {
    fn to_socket_addrs_one(&self) -> std::io::Result<std::net::SocketAddr>;
}

impl ToSocketAddrOne for str {
    fn to_socket_addrs_one(&self) -> std::io::Result<std::net::SocketAddr> {
        use std::net::ToSocketAddrs;
        self.to_socket_addrs()?
            .next()
            .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "no address resolved"))
    }
}
