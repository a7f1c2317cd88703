//! Network impairment simulator for exercising the reliability layer.
//!
//! Real networks drop and corrupt packets.  To test retransmission and
//! checksum recovery without depending on actual network conditions, the
//! server passes every inbound datagram through a [`Simulator`] that applies
//! a configurable fault model:
//!
//! | Fault       | Description                                               |
//! |-------------|-----------------------------------------------------------|
//! | Packet loss | Drop a DATA payload with probability `loss_rate`.         |
//! | Corruption  | XOR-flip one random byte with probability `corruption_rate`, |
//! |             | making the downstream checksum verification fail.         |
//!
//! The two decisions are independent per datagram.  Each simulator owns an
//! explicit seedable RNG ([`rand::rngs::StdRng`]) so test runs can be made
//! reproducible.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Configuration for the fault-injection model.
///
/// Both probabilities are in the range `[0.0, 1.0]`.
#[derive(Debug, Clone, Copy)]
pub struct SimulatorConfig {
    /// Probability that a DATA packet is silently dropped.
    pub loss_rate: f64,
    /// Probability that one byte of a raw datagram is flipped.
    pub corruption_rate: f64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        // No faults by default — the simulator is a transparent pass-through.
        Self {
            loss_rate: 0.0,
            corruption_rate: 0.0,
        }
    }
}

/// Per-session fault injector with its own RNG.
#[derive(Debug)]
pub struct Simulator {
    config: SimulatorConfig,
    rng: StdRng,
}

impl Simulator {
    /// Create a simulator seeded from OS entropy.
    pub fn new(config: SimulatorConfig) -> Self {
        Self {
            config,
            rng: StdRng::from_entropy(),
        }
    }

    /// Create a simulator with a fixed seed for reproducible runs.
    pub fn seeded(config: SimulatorConfig, seed: u64) -> Self {
        Self {
            config,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    /// Decide whether to drop the current DATA packet.
    pub fn should_drop(&mut self) -> bool {
        self.config.loss_rate > 0.0 && self.rng.gen::<f64>() < self.config.loss_rate
    }

    /// Possibly flip one random byte of `datagram` in place.
    ///
    /// Returns the flipped byte's position, or `None` when the datagram was
    /// left intact (corruption not triggered, or the buffer is empty).
    pub fn maybe_corrupt(&mut self, datagram: &mut [u8]) -> Option<usize> {
        if datagram.is_empty()
            || self.config.corruption_rate <= 0.0
            || self.rng.gen::<f64>() >= self.config.corruption_rate
        {
            return None;
        }
        let pos = self.rng.gen_range(0..datagram.len());
        datagram[pos] ^= 0xFF;
        Some(pos)
    }
}
