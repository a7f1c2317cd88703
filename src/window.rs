//! Go-Back-N send-side window state.
//!
//! [`SendWindow`] tracks the outstanding byte span of one client session.
//! Unlike segment-counted GBN variants, the window is measured in **bytes**:
//! new packets may be issued while the span from `base` (oldest
//! unacknowledged byte) to the next free offset stays within a fixed byte
//! capacity.
//!
//! # Protocol contract
//!
//! - ACKs are **cumulative**: `ack = K` means the receiver has accepted all
//!   bytes up to (but not including) offset `K`.
//! - On timeout of the oldest unacknowledged packet, the caller retransmits
//!   **every** unacknowledged packet (go back N), then calls
//!   [`mark_retransmitted`] to refresh their send times.
//! - Offsets are plain `u32` byte positions starting at 0 for the first
//!   payload byte; no wraparound contract is provided.
//!
//! This module only manages state; all socket I/O and payload construction
//! is the caller's responsibility.
//!
//! [`mark_retransmitted`]: SendWindow::mark_retransmitted

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

/// Bookkeeping for one transmitted data packet.
#[derive(Debug, Clone)]
pub struct OutstandingPacket {
    /// Window offset of the first payload byte.
    pub start: u32,
    /// Window offset of the last payload byte (`start + size - 1`).
    pub end: u32,
    /// Payload size in bytes.
    pub size: u32,
    /// Wall-clock time of the most recent transmission.
    pub sent_at: Instant,
    /// Whether a cumulative ACK has covered this packet.
    pub acked: bool,
    /// Round trip observed when the packet was acknowledged.
    pub rtt: Option<Duration>,
}

/// Send-side sliding window for one session.
///
/// ```text
///   base                next_offset
///    │                      │
///  ──┼──────────────────────┼──────────────▶ byte offsets
///    │ ◀── outstanding ──▶  │ ◀ sendable ▶
///    │ ◀───────── capacity ──────────▶
/// ```
#[derive(Debug)]
pub struct SendWindow {
    /// Offset of the oldest unacknowledged byte (left window edge).
    base: u32,
    /// Offset the next new packet will start at.
    next_offset: u32,
    /// Maximum outstanding byte span.
    capacity: u32,
    /// Every packet sent this session, keyed by packet number.
    packets: BTreeMap<u32, OutstandingPacket>,
}

impl SendWindow {
    /// Create an empty window with the given byte capacity.
    pub fn new(capacity: u32) -> Self {
        assert!(capacity >= 1, "window capacity must be at least 1 byte");
        Self {
            base: 0,
            next_offset: 0,
            capacity,
            packets: BTreeMap::new(),
        }
    }

    /// Offset of the oldest unacknowledged byte.
    pub fn base(&self) -> u32 {
        self.base
    }

    /// Offset the next new packet will start at (trailing window edge).
    pub fn next_offset(&self) -> u32 {
        self.next_offset
    }

    /// `true` when a packet of `size` bytes fits in the remaining capacity.
    pub fn fits(&self, size: u32) -> bool {
        self.next_offset - self.base + size <= self.capacity
    }

    /// Record a newly transmitted packet and advance the trailing edge.
    ///
    /// Returns the packet's start offset (its `sequence` on the wire).
    /// Check [`fits`] before calling.
    ///
    /// [`fits`]: SendWindow::fits
    pub fn record_sent(&mut self, pkt_num: u32, size: u32, now: Instant) -> u32 {
        debug_assert!(self.fits(size), "record_sent would overrun the window");
        let start = self.next_offset;
        let end = start + size - 1;
        self.packets.insert(
            pkt_num,
            OutstandingPacket {
                start,
                end,
                size,
                sent_at: now,
                acked: false,
                rtt: None,
            },
        );
        self.next_offset = end + 1;
        start
    }

    /// Apply a cumulative ACK.
    ///
    /// Marks every unacknowledged packet whose end offset lies below `ack`,
    /// records its round-trip sample, and advances `base` to `ack`.  Returns
    /// the newly acknowledged packets as `(packet number, RTT)` pairs, oldest
    /// first.  Duplicate ACKs (`ack ≤ base`) and ACKs beyond the highest
    /// transmitted offset are ignored.
    pub fn on_ack(&mut self, ack: u32, now: Instant) -> Vec<(u32, Duration)> {
        if ack <= self.base || ack > self.next_offset {
            return Vec::new();
        }

        let mut newly_acked = Vec::new();
        for (&pkt_num, info) in self.packets.iter_mut() {
            if !info.acked && info.end < ack {
                let rtt = now.saturating_duration_since(info.sent_at);
                info.acked = true;
                info.rtt = Some(rtt);
                newly_acked.push((pkt_num, rtt));
            }
        }
        self.base = ack;
        newly_acked
    }

    /// `true` when at least one packet awaits acknowledgement.
    pub fn has_unacked(&self) -> bool {
        self.packets.values().any(|p| !p.acked)
    }

    /// Iterate over unacknowledged packets, oldest first.
    pub fn unacked(&self) -> impl Iterator<Item = (u32, &OutstandingPacket)> {
        self.packets
            .iter()
            .filter(|(_, p)| !p.acked)
            .map(|(&n, p)| (n, p))
    }

    /// Send time of the oldest unacknowledged packet, or `None` when the
    /// window is fully acknowledged.
    pub fn oldest_unacked_sent_at(&self) -> Option<Instant> {
        self.packets
            .values()
            .filter(|p| !p.acked)
            .map(|p| p.sent_at)
            .min()
    }

    /// Refresh the send time of every unacknowledged packet.
    ///
    /// Call immediately after retransmitting the whole window.
    pub fn mark_retransmitted(&mut self, now: Instant) {
        for info in self.packets.values_mut() {
            if !info.acked {
                info.sent_at = now;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> Instant {
        Instant::now()
    }

    #[test]
    fn initial_state() {
        let w = SendWindow::new(400);
        assert_eq!(w.base(), 0);
        assert_eq!(w.next_offset(), 0);
        assert!(w.fits(400));
        assert!(!w.fits(401));
        assert!(!w.has_unacked());
    }

    #[test]
    fn record_sent_advances_next_offset() {
        let mut w = SendWindow::new(400);
        let start = w.record_sent(1, 60, now());
        assert_eq!(start, 0);
        assert_eq!(w.next_offset(), 60);
        assert_eq!(w.base(), 0);
        assert!(w.has_unacked());
    }

    #[test]
    fn window_full_blocks_send() {
        let mut w = SendWindow::new(100);
        w.record_sent(1, 60, now());
        assert!(w.fits(40));
        assert!(!w.fits(41));
        w.record_sent(2, 40, now());
        assert!(!w.fits(1));
    }

    #[test]
    fn cumulative_ack_covers_multiple_packets() {
        let mut w = SendWindow::new(400);
        w.record_sent(1, 50, now()); // bytes 0..=49
        w.record_sent(2, 50, now()); // bytes 50..=99
        w.record_sent(3, 50, now()); // bytes 100..=149

        let acked = w.on_ack(100, now());
        let nums: Vec<u32> = acked.iter().map(|(n, _)| *n).collect();
        assert_eq!(nums, vec![1, 2]);
        assert_eq!(w.base(), 100);
        assert!(w.has_unacked());
    }

    #[test]
    fn duplicate_ack_is_a_no_op() {
        let mut w = SendWindow::new(400);
        w.record_sent(1, 50, now());
        assert_eq!(w.on_ack(50, now()).len(), 1);
        assert!(w.on_ack(50, now()).is_empty());
        assert_eq!(w.base(), 50);
    }

    #[test]
    fn ack_beyond_highest_sent_is_ignored() {
        let mut w = SendWindow::new(400);
        w.record_sent(1, 50, now());
        assert!(w.on_ack(1000, now()).is_empty());
        assert_eq!(w.base(), 0);
    }

    #[test]
    fn base_is_monotonic_under_increasing_acks() {
        let mut w = SendWindow::new(400);
        for n in 1..=4u32 {
            w.record_sent(n, 40, now());
        }
        let mut prev = w.base();
        for ack in [40u32, 80, 120, 160] {
            w.on_ack(ack, now());
            assert!(w.base() >= prev);
            assert!(w.base() <= w.next_offset());
            prev = w.base();
        }
        assert!(!w.has_unacked());
    }

    #[test]
    fn mark_retransmitted_refreshes_unacked_only() {
        let mut w = SendWindow::new(400);
        let t0 = now();
        w.record_sent(1, 50, t0);
        w.record_sent(2, 50, t0);
        w.on_ack(50, t0);

        let t1 = t0 + Duration::from_millis(500);
        w.mark_retransmitted(t1);
        let unacked: Vec<_> = w.unacked().collect();
        assert_eq!(unacked.len(), 1);
        assert_eq!(unacked[0].0, 2);
        assert_eq!(unacked[0].1.sent_at, t1);
    }

    #[test]
    fn oldest_unacked_sent_at_tracks_minimum() {
        let mut w = SendWindow::new(400);
        assert_eq!(w.oldest_unacked_sent_at(), None);
        let t0 = now();
        let t1 = t0 + Duration::from_millis(10);
        w.record_sent(1, 50, t0);
        w.record_sent(2, 50, t1);
        assert_eq!(w.oldest_unacked_sent_at(), Some(t0));
        w.on_ack(50, t1);
        assert_eq!(w.oldest_unacked_sent_at(), Some(t1));
    }

    #[test]
    fn rtt_sample_measured_from_last_transmission() {
        let mut w = SendWindow::new(400);
        let t0 = now();
        w.record_sent(1, 50, t0);
        let t_ack = t0 + Duration::from_millis(30);
        let acked = w.on_ack(50, t_ack);
        assert_eq!(acked, vec![(1, Duration::from_millis(30))]);
    }
}
