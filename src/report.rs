//! Per-packet round-trip-time reporting.
//!
//! The client records one RTT per packet number (the sample taken when the
//! packet was first covered by a cumulative ACK) and persists the result as
//! a CSV file — one row per packet, a blank RTT cell for packets that were
//! never acknowledged.  A [`RttSummary`] aggregates the same data for the
//! end-of-run log line.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::time::Duration;

/// RTT samples for one client run, indexed by packet number (1-based).
#[derive(Debug)]
pub struct RttReport {
    rows: Vec<Option<Duration>>,
}

impl RttReport {
    /// Create an empty report for `total` packets.
    pub fn new(total: u32) -> Self {
        Self {
            rows: vec![None; total as usize],
        }
    }

    /// Record the round trip observed for `pkt_num`.
    ///
    /// Later samples for the same packet (retransmission artifacts) keep the
    /// first recorded value.  Packet numbers outside the configured range
    /// are ignored.
    pub fn record(&mut self, pkt_num: u32, rtt: Duration) {
        if pkt_num == 0 {
            return;
        }
        if let Some(slot) = self.rows.get_mut(pkt_num as usize - 1) {
            slot.get_or_insert(rtt);
        }
    }

    /// All rows in packet-number order; `None` marks a never-acked packet.
    pub fn rows(&self) -> &[Option<Duration>] {
        &self.rows
    }

    /// Number of packets with a recorded acknowledgement.
    pub fn acked_count(&self) -> usize {
        self.rows.iter().filter(|r| r.is_some()).count()
    }

    /// Write the report as CSV: header line, then one `packet,rtt_ms` row
    /// per packet number with an empty RTT field for unacknowledged packets.
    pub fn write_csv(&self, path: &Path) -> io::Result<()> {
        let mut out = BufWriter::new(File::create(path)?);
        writeln!(out, "packet,rtt_ms")?;
        for (i, row) in self.rows.iter().enumerate() {
            match row {
                Some(rtt) => writeln!(out, "{},{:.2}", i + 1, rtt.as_secs_f64() * 1000.0)?,
                None => writeln!(out, "{},", i + 1)?,
            }
        }
        out.flush()
    }

    /// Aggregate statistics over the acknowledged packets.
    ///
    /// Returns `None` when no packet was ever acknowledged.
    pub fn summary(&self) -> Option<RttSummary> {
        let samples: Vec<f64> = self
            .rows
            .iter()
            .flatten()
            .map(|d| d.as_secs_f64() * 1000.0)
            .collect();
        if samples.is_empty() {
            return None;
        }

        let n = samples.len();
        let mean = samples.iter().sum::<f64>() / n as f64;
        let max = samples.iter().cloned().fold(f64::MIN, f64::max);
        let min = samples.iter().cloned().fold(f64::MAX, f64::min);
        // Sample standard deviation (n - 1 denominator), 0 for a single sample.
        let stddev = if n > 1 {
            let var = samples.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / (n - 1) as f64;
            var.sqrt()
        } else {
            0.0
        };

        Some(RttSummary {
            acked: n,
            total: self.rows.len(),
            min_ms: min,
            max_ms: max,
            mean_ms: mean,
            stddev_ms: stddev,
        })
    }
}

/// Aggregate RTT statistics for one run, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RttSummary {
    /// Packets acknowledged at least once.
    pub acked: usize,
    /// Packets budgeted for the run.
    pub total: usize,
    pub min_ms: f64,
    pub max_ms: f64,
    pub mean_ms: f64,
    pub stddev_ms: f64,
}

impl std::fmt::Display for RttSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{} acked, rtt min={:.2}ms max={:.2}ms mean={:.2}ms stddev={:.2}ms",
            self.acked, self.total, self.min_ms, self.max_ms, self.mean_ms, self.stddev_ms
        )
    }
}
