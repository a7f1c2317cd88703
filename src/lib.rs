//! `gbn-over-udp` — a reliable byte stream implemented over UDP with
//! Go-Back-N, plus a fault-injecting reference server.
//!
//! # Architecture
//!
//! ```text
//!  ┌──────────┐    DATA segments    ┌──────────────────┐
//!  │  Client  │────────────────────▶│ Server dispatcher │
//!  │ session  │                     └────────┬─────────┘
//!  └────┬─────┘                              │ per-peer mpsc
//!       │        cumulative ACKs     ┌───────▼────────┐
//!       │◀───────────────────────────│ SessionHandler │ (one task per peer,
//!       │                            │  + Simulator   │  impairment on rx)
//!  ┌────▼──────┐                     └────────────────┘
//!  │  Socket   │  (thin async wrapper around tokio UdpSocket)
//!  └───────────┘
//! ```
//!
//! The client drives a three-way handshake, a byte-counted Go-Back-N window
//! with an adaptive retransmission timeout, and a four-way teardown.  The
//! server routes datagrams by source address to one independent session
//! handler per peer; each handler passes its traffic through an impairment
//! simulator (loss/corruption) before the receive-side state machine, so the
//! reliability layer can be exercised without a real lossy network.
//!
//! Each module has a single responsibility:
//! - [`packet`]    — wire format: 14-byte header, flags, 12-bit CRC
//! - [`rtt`]       — adaptive retransmission-timeout estimation
//! - [`window`]    — client-side Go-Back-N send window (byte-counted)
//! - [`simulator`] — seedable loss/corruption fault injection
//! - [`client`]    — client session: handshake, transfer, teardown
//! - [`server`]    — dispatcher + per-peer session handlers
//! - [`state`]     — finite-state-machine types for both sides
//! - [`report`]    — per-packet RTT report (CSV + summary)
//! - [`socket`]    — async UDP socket abstraction

pub mod client;
pub mod packet;
pub mod report;
pub mod rtt;
pub mod server;
pub mod simulator;
pub mod socket;
pub mod state;
pub mod window;
