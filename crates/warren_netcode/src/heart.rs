//! Round-trip latency estimation.
//!
//! The server periodically sends a numbered probe to each player; the
//! client echoes the number back. A [`Heart`] tracks the last ten
//! round-trip delays per player and estimates one-way latency as half the
//! average. Estimates land on a [`LatencyBoard`] of atomics so the tick
//! resolution path can read them without taking any lock.

use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

/// One-way latency assumed for a player before any probe has returned,
/// in milliseconds.
pub const DEFAULT_LATENCY_MS: u32 = 100;

/// Round-trip delay each history slot starts out with, in milliseconds.
const DEFAULT_DELAY_MS: u32 = 2 * DEFAULT_LATENCY_MS;

/// How many round trips the estimate averages over.
const BEAT_HISTORY: usize = 10;

/// A probe slot whose echo has not arrived after this long is considered
/// lost and may be reused.
const MAX_DELAY_MS: u64 = 60_000;

/// An outgoing probe: which player to send it to and the id the client
/// must echo back.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Probe {
    /// Slot of the player to probe.
    pub slot: usize,

    /// Probe id to echo.
    pub beat_id: u32,
}

/// Latency estimator for a single player.
pub struct Heart {
    delays: [u32; BEAT_HISTORY],
    sent_at: [u64; BEAT_HISTORY],
    /// Probe id awaited per slot; 0 means the slot is free.
    expected_id: [u32; BEAT_HISTORY],
    delay_sum: u32,
    next_beat_id: u32,
    cursor: usize,
}

impl Heart {
    /// Creates an estimator that reports [`DEFAULT_LATENCY_MS`] until
    /// real measurements displace the seeded history.
    #[must_use]
    pub fn new() -> Self {
        Self {
            delays: [DEFAULT_DELAY_MS; BEAT_HISTORY],
            sent_at: [0; BEAT_HISTORY],
            expected_id: [0; BEAT_HISTORY],
            delay_sum: DEFAULT_DELAY_MS * BEAT_HISTORY as u32,
            next_beat_id: 0,
            cursor: BEAT_HISTORY - 1,
        }
    }

    /// Picks the next probe id, or `None` when all ten slots are still
    /// awaiting an echo younger than the staleness ceiling.
    pub fn prepare_beat(&mut self, now_ms: u64) -> Option<u32> {
        let mut slot = None;
        for offset in 1..=BEAT_HISTORY {
            let candidate = (self.cursor + offset) % BEAT_HISTORY;
            if self.expected_id[candidate] == 0
                || now_ms.saturating_sub(self.sent_at[candidate]) > MAX_DELAY_MS
            {
                slot = Some(candidate);
                break;
            }
        }
        let slot = slot?;
        self.cursor = slot;
        self.next_beat_id += 1;
        self.expected_id[slot] = self.next_beat_id;
        self.sent_at[slot] = now_ms;
        Some(self.next_beat_id)
    }

    /// Accepts an echoed probe id and returns the refreshed one-way
    /// latency estimate in milliseconds, or `None` when the id matches no
    /// outstanding probe.
    pub fn receive(&mut self, beat_id: u32, now_ms: u64) -> Option<u32> {
        let slot = self
            .expected_id
            .iter()
            .position(|&expected| expected != 0 && expected == beat_id)?;
        let delay = u32::try_from(now_ms.saturating_sub(self.sent_at[slot]))
            .unwrap_or(u32::MAX)
            .min(MAX_DELAY_MS as u32);
        self.delay_sum = self.delay_sum - self.delays[slot] + delay;
        self.delays[slot] = delay;
        self.expected_id[slot] = 0;
        Some(self.delay_sum / (2 * BEAT_HISTORY as u32))
    }
}

impl Default for Heart {
    fn default() -> Self {
        Self::new()
    }
}

/// Lock-free per-slot latency estimates, shared between the session
/// threads that record them and the simulation that reads them.
pub struct LatencyBoard {
    slots: Box<[AtomicU32]>,
}

impl LatencyBoard {
    /// Creates a board with every slot at the default estimate.
    #[must_use]
    pub fn new(max_players: usize) -> Self {
        Self {
            slots: (0..max_players)
                .map(|_| AtomicU32::new(DEFAULT_LATENCY_MS))
                .collect(),
        }
    }

    /// Latest one-way latency estimate for `slot`, in milliseconds.
    #[must_use]
    pub fn get(&self, slot: usize) -> u32 {
        self.slots[slot].load(Ordering::Relaxed)
    }

    /// Publishes a fresh estimate for `slot`.
    pub fn set(&self, slot: usize, latency_ms: u32) {
        self.slots[slot].store(latency_ms, Ordering::Relaxed);
    }

    /// Resets `slot` to the default estimate, for when its player leaves
    /// or a new one takes over.
    pub fn reset(&self, slot: usize) {
        self.set(slot, DEFAULT_LATENCY_MS);
    }
}

/// Round-robin probe scheduling across every connected player.
pub struct MultiPlayerHeart {
    hearts: Vec<Option<Heart>>,
    cursor: usize,
    probe_interval: Duration,
}

impl MultiPlayerHeart {
    /// Creates a scheduler for `max_players` slots. The probe interval is
    /// sized so each player is probed three times per second when the
    /// world is full.
    #[must_use]
    pub fn new(max_players: usize) -> Self {
        Self {
            hearts: (0..max_players).map(|_| None).collect(),
            cursor: 0,
            probe_interval: Duration::from_millis(1000 / 3 / max_players as u64),
        }
    }

    /// Wall-clock pause between consecutive probes.
    #[must_use]
    pub fn probe_interval(&self) -> Duration {
        self.probe_interval
    }

    /// Starts probing `slot`.
    pub fn add_player(&mut self, slot: usize) {
        self.hearts[slot] = Some(Heart::new());
    }

    /// Stops probing `slot`.
    pub fn remove_player(&mut self, slot: usize) {
        self.hearts[slot] = None;
    }

    /// Picks the next player to probe, skipping empty slots, and prepares
    /// a probe for them. Returns `None` when no occupied slot can accept
    /// a probe right now.
    pub fn next_probe(&mut self, now_ms: u64) -> Option<Probe> {
        for _ in 0..self.hearts.len() {
            let slot = self.cursor;
            self.cursor = (self.cursor + 1) % self.hearts.len();
            if let Some(heart) = self.hearts[slot].as_mut() {
                if let Some(beat_id) = heart.prepare_beat(now_ms) {
                    return Some(Probe { slot, beat_id });
                }
            }
        }
        None
    }

    /// Routes an echoed probe id to the player's estimator and publishes
    /// the refreshed estimate on `board`.
    pub fn receive(&mut self, slot: usize, beat_id: u32, now_ms: u64, board: &LatencyBoard) {
        let Some(heart) = self.hearts.get_mut(slot).and_then(Option::as_mut) else {
            tracing::debug!("Dropping echo #{} for empty slot {}", beat_id, slot);
            return;
        };
        if let Some(latency) = heart.receive(beat_id, now_ms) {
            board.set(slot, latency);
        } else {
            tracing::debug!("Dropping unknown echo #{} for slot {}", beat_id, slot);
        }
    }
}
