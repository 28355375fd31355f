//! Player slot bookkeeping and the shared snapshot header.
//!
//! Slots are dense indices into per-slot arrays everywhere else in the
//! crate (avatars, input queues, history cells, the latency board). The
//! registry owns which of them are live, hands out connection uids, and
//! serializes the tick counter at the head of every snapshot.

use warren_core::{FrameCompiler, FrameKind, FrameSection};

/// Slot allocator plus the tick header section of the snapshot layout.
pub struct SlotRegistry {
    max_players: usize,
    /// Free slot indices, popped last-in-first-out. Seeded in descending
    /// order so a fresh registry hands out 0, 1, 2, ...
    free: Vec<usize>,
    live: Vec<bool>,
    next_uid: u32,
    header: FrameSection,
    tick: i64,
}

impl SlotRegistry {
    /// Creates a registry for `max_players` slots and reserves the tick
    /// header in the frame layout.
    pub fn new(max_players: usize, compiler: &mut FrameCompiler) -> Self {
        Self {
            max_players,
            free: (0..max_players).rev().collect(),
            live: vec![false; max_players],
            next_uid: 0,
            header: compiler.reserve(&[FrameKind::Long]),
            tick: 0,
        }
    }

    /// Total slot capacity.
    #[must_use]
    pub fn max_players(&self) -> usize {
        self.max_players
    }

    /// Number of live players.
    #[must_use]
    pub fn player_count(&self) -> usize {
        self.max_players - self.free.len()
    }

    /// Whether any player is connected.
    #[must_use]
    pub fn has_players(&self) -> bool {
        self.player_count() > 0
    }

    /// Whether `slot` is currently occupied.
    #[must_use]
    pub fn is_live(&self, slot: usize) -> bool {
        self.live.get(slot).copied().unwrap_or(false)
    }

    /// Iterates over occupied slot indices in ascending order.
    pub fn live_slots(&self) -> impl Iterator<Item = usize> + '_ {
        self.live
            .iter()
            .enumerate()
            .filter_map(|(slot, &live)| live.then_some(slot))
    }

    /// Claims a free slot, or `None` when the world is full.
    pub fn reserve_slot(&mut self) -> Option<usize> {
        let slot = self.free.pop()?;
        self.live[slot] = true;
        Some(slot)
    }

    /// Returns `slot` to the free pool. Releasing a slot that is not live
    /// is a no-op and reports `false`.
    pub fn release_slot(&mut self, slot: usize) -> bool {
        if !self.is_live(slot) {
            return false;
        }
        self.live[slot] = false;
        self.free.push(slot);
        true
    }

    /// Hands out the next connection uid. Uids start at 1 and are never
    /// reused, so 0 can serve as "no player".
    pub fn next_uid(&mut self) -> u32 {
        self.next_uid += 1;
        self.next_uid
    }

    /// Current simulation tick.
    #[must_use]
    pub fn tick(&self) -> i64 {
        self.tick
    }

    /// Advances the tick counter by one.
    pub fn advance_tick(&mut self) {
        self.tick += 1;
    }

    /// Writes the tick header into a snapshot.
    pub fn write_header(&self, frame: &mut [u8]) {
        self.header.writer(frame).write_i64(self.tick);
    }

    /// Restores the tick counter from a snapshot.
    pub fn read_header(&mut self, frame: &[u8]) {
        self.tick = self.header.reader(frame).read_i64();
    }
}
