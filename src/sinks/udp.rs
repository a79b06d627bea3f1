// Downbeat - A Statsd client for Rust
//
// Licensed under the Apache License, Version 2.0 <LICENSE-APACHE or
// http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your
// option. This file may not be copied, modified, or distributed
// except according to those terms.

use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};

use crate::sinks::core::{MetricSink, SinkStats, SocketStats};
use crate::types::{ErrorKind, MetricError, MetricResult};

/// Attempt to convert anything implementing the `ToSocketAddrs` trait
/// into a concrete `SocketAddr` instance, returning an `InvalidInput`
/// error if the address could not be parsed.
fn get_addr<A: ToSocketAddrs>(addr: A) -> MetricResult<SocketAddr> {
    match addr.to_socket_addrs()?.next() {
        Some(addr) => Ok(addr),
        None => Err(MetricError::from((
            ErrorKind::InvalidInput,
            "No socket addresses yielded",
        ))),
    }
}

/// Connection to a Statsd daemon that emits payloads over UDP.
///
/// The connection owns a UDP socket aimed at the daemon's host and port.
/// The target address is resolved once at construction and the socket is
/// never reopened: a connection that fails to write simply drops that
/// payload and reports it, it does not attempt recovery.
///
/// Each payload is sent in the thread of the caller with a single
/// nonblocking write. A full OS send buffer therefore surfaces as a failed
/// write, not as a stall of the embedding application.
///
/// # Example
///
/// ```no_run
/// use downbeat::{UdpConnection, DEFAULT_PORT};
///
/// let conn = UdpConnection::new("metrics.example.com", DEFAULT_PORT).unwrap();
/// assert_eq!("metrics.example.com", conn.host());
/// assert_eq!(DEFAULT_PORT, conn.port());
/// ```
#[derive(Debug)]
pub struct UdpConnection {
    host: String,
    port: u16,
    addr: SocketAddr,
    socket: UdpSocket,
    force_sampling: bool,
    stats: SocketStats,
}

impl UdpConnection {
    /// Open a new connection toward the daemon at `host:port`.
    ///
    /// A local socket is bound to an OS-assigned port and put into
    /// nonblocking mode. The remote hostname is resolved once, here.
    ///
    /// # Failures
    ///
    /// This method may fail if:
    ///
    /// * It is unable to bind a local UDP socket.
    /// * It is unable to resolve the hostname of the metric server.
    /// * The host address is otherwise unable to be parsed.
    pub fn new(host: &str, port: u16) -> MetricResult<UdpConnection> {
        let socket = UdpSocket::bind("0.0.0.0:0")?;
        socket.set_nonblocking(true)?;
        let addr = get_addr((host, port))?;

        Ok(UdpConnection {
            host: host.to_string(),
            port,
            addr,
            socket,
            force_sampling: false,
            stats: SocketStats::default(),
        })
    }

    /// Adopt a caller-configured socket instead of binding a fresh one.
    ///
    /// The socket should already be bound to a local address with any
    /// desired configuration applied (blocking vs non-blocking, timeouts,
    /// etc.).
    ///
    /// # Example
    ///
    /// ```no_run
    /// use std::net::UdpSocket;
    /// use downbeat::{UdpConnection, DEFAULT_PORT};
    ///
    /// let socket = UdpSocket::bind("0.0.0.0:0").unwrap();
    /// socket.set_nonblocking(true).unwrap();
    /// let conn = UdpConnection::from_socket(("metrics.example.com", DEFAULT_PORT), socket);
    /// ```
    ///
    /// # Failures
    ///
    /// This method may fail if:
    ///
    /// * It is unable to resolve the hostname of the metric server.
    /// * The host address is otherwise unable to be parsed.
    pub fn from_socket<A>(to_addr: A, socket: UdpSocket) -> MetricResult<UdpConnection>
    where
        A: ToSocketAddrs,
    {
        let addr = get_addr(to_addr)?;

        Ok(UdpConnection {
            host: addr.ip().to_string(),
            port: addr.port(),
            addr,
            socket,
            force_sampling: false,
            stats: SocketStats::default(),
        })
    }

    /// Cause every sampled emission through this connection to be sent
    /// regardless of its sampling draw. Intended for deterministic testing
    /// and debugging; rate annotations are still attached.
    pub fn with_force_sampling(mut self, force: bool) -> Self {
        self.force_sampling = force;
        self
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }
}

impl MetricSink for UdpConnection {
    fn emit(&self, payload: &str) -> io::Result<usize> {
        if payload.is_empty() {
            return Ok(0);
        }
        self.stats
            .update(self.socket.send_to(payload.as_bytes(), self.addr), payload.len())
    }

    fn force_sampling(&self) -> bool {
        self.force_sampling
    }

    fn stats(&self) -> SinkStats {
        (&self.stats).into()
    }
}

#[cfg(test)]
mod tests {
    use super::{get_addr, MetricSink, UdpConnection};
    use std::net::UdpSocket;

    #[test]
    fn test_get_addr_bad_address() {
        let res = get_addr("asdf");
        assert!(res.is_err());
    }

    #[test]
    fn test_get_addr_valid_address() {
        let res = get_addr("127.0.0.1:8125");
        assert!(res.is_ok());
    }

    #[test]
    fn test_udp_connection_emit() {
        let conn = UdpConnection::new("127.0.0.1", 8125).unwrap();
        assert_eq!(7, conn.emit("buz:1|c").unwrap());

        let stats = conn.stats();
        assert_eq!(7, stats.bytes_sent);
        assert_eq!(1, stats.packets_sent);
    }

    #[test]
    fn test_udp_connection_empty_payload_is_noop() {
        let conn = UdpConnection::new("127.0.0.1", 8125).unwrap();
        assert_eq!(0, conn.emit("").unwrap());

        let stats = conn.stats();
        assert_eq!(0, stats.packets_sent);
    }

    #[test]
    fn test_udp_connection_accessors() {
        let conn = UdpConnection::new("127.0.0.1", 8125).unwrap();
        assert_eq!("127.0.0.1", conn.host());
        assert_eq!(8125, conn.port());
        assert!(!conn.force_sampling());

        let forced = conn.with_force_sampling(true);
        assert!(forced.force_sampling());
    }

    #[test]
    fn test_udp_connection_from_socket() {
        let socket = UdpSocket::bind("0.0.0.0:0").unwrap();
        socket.set_nonblocking(true).unwrap();
        let conn = UdpConnection::from_socket("127.0.0.1:8125", socket).unwrap();

        assert_eq!(8125, conn.port());
        assert_eq!(7, conn.emit("baz:1|c").unwrap());
    }
}
