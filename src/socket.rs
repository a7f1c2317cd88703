//! Async UDP socket abstraction.
//!
//! [`Socket`] is a thin wrapper around `tokio::net::UdpSocket` that encodes
//! outbound [`crate::packet::Packet`]s but hands inbound datagrams to the
//! caller as raw bytes.  Decoding happens above this layer on purpose: the
//! server must run raw datagrams through the impairment simulator and react
//! to checksum failures itself, so the socket cannot swallow them.
//!
//! All methods are `&self`, so one socket can be shared (via `Arc`) between
//! the dispatcher and the per-peer session handlers — only the dispatcher
//! receives, handlers only send.

use std::io;
use std::net::SocketAddr;

use tokio::net::UdpSocket;

use crate::packet::Packet;

/// Receive buffer size; comfortably above the largest frame we ever send.
const MAX_DATAGRAM: usize = 2048;

/// An async UDP socket speaking the protocol's wire format on send.
#[derive(Debug)]
pub struct Socket {
    /// Address this socket is bound to (resolved after the OS assigns an
    /// ephemeral port).
    pub local_addr: SocketAddr,
    inner: UdpSocket,
}

impl Socket {
    /// Bind a new socket to `local_addr`.
    ///
    /// Passing `0.0.0.0:0` lets the OS choose an ephemeral port.
    pub async fn bind(local_addr: SocketAddr) -> io::Result<Self> {
        let inner = UdpSocket::bind(local_addr).await?;
        let local_addr = inner.local_addr()?;
        Ok(Self { local_addr, inner })
    }

    /// Encode `packet` and send it as a single UDP datagram to `dest`.
    pub async fn send(&self, packet: &Packet, dest: SocketAddr) -> io::Result<()> {
        self.send_bytes(&packet.encode(), dest).await
    }

    /// Send pre-encoded bytes as a single UDP datagram to `dest`.
    ///
    /// Mostly useful for tests that need to put deliberately malformed
    /// frames on the wire.
    pub async fn send_bytes(&self, bytes: &[u8], dest: SocketAddr) -> io::Result<()> {
        self.inner.send_to(bytes, dest).await?;
        Ok(())
    }

    /// Receive the next raw datagram.
    ///
    /// Returns `(bytes, sender_address)`.  No validation happens here.
    pub async fn recv(&self) -> io::Result<(Vec<u8>, SocketAddr)> {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        let (n, addr) = self.inner.recv_from(&mut buf).await?;
        buf.truncate(n);
        Ok((buf, addr))
    }
}
