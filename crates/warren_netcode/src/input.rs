//! Player inputs and their ordering rules.
//!
//! Inputs arrive with a client-claimed target tick and a per-player
//! monotonically increasing id. Two rules keep replays deterministic:
//!
//! 1. Within a queue, inputs are consumed in `(target_tick, id)` order.
//! 2. Within a history cell, an event only replaces another if it comes
//!    from a different player or carries a strictly greater id. Ties never
//!    replace, so re-delivery of the same event is idempotent.

use std::cmp::Ordering;
use std::collections::BinaryHeap;

use warren_core::{SectionReader, SectionWriter, Vec2};

/// A single unit of player intent, addressed to a simulation tick.
pub trait PlayerInput: Clone + Send + 'static {
    /// Per-player monotonically increasing input id.
    fn id(&self) -> u32;

    /// The tick this input wants to take effect at.
    fn target_tick(&self) -> i64;

    /// Overrides the target tick. Called when the claimed tick falls
    /// outside the window the server is willing to honour.
    fn set_target_tick(&mut self, tick: i64);
}

/// An input bound to the player connection that produced it.
///
/// The `uid` pins the event to a connection, not a slot: slots are reused
/// after a player leaves, and a stale event must never act on behalf of a
/// slot's next occupant.
#[derive(Clone, Debug)]
pub struct InputEvent<I> {
    /// Slot index of the player at the time the event was accepted.
    pub slot: usize,

    /// Unique id of the player connection.
    pub uid: u32,

    /// The input payload.
    pub input: I,
}

impl<I: PlayerInput> InputEvent<I> {
    /// Binds an input to a player connection.
    pub fn new(slot: usize, uid: u32, input: I) -> Self {
        Self { slot, uid, input }
    }

    /// Target tick of the payload.
    #[must_use]
    pub fn target_tick(&self) -> i64 {
        self.input.target_tick()
    }

    /// Whether this event may overwrite `other` in a history cell.
    ///
    /// An empty cell is always claimable. An occupied cell yields to a
    /// different player (slot reuse) or to a strictly newer input from the
    /// same player.
    #[must_use]
    pub fn can_replace(&self, other: Option<&Self>) -> bool {
        match other {
            None => true,
            Some(other) => other.uid != self.uid || self.input.id() > other.input.id(),
        }
    }
}

struct ByOrder<I>(I);

impl<I: PlayerInput> ByOrder<I> {
    fn key(&self) -> (i64, u32) {
        (self.0.target_tick(), self.0.id())
    }
}

impl<I: PlayerInput> PartialEq for ByOrder<I> {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl<I: PlayerInput> Eq for ByOrder<I> {}

impl<I: PlayerInput> PartialOrd for ByOrder<I> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<I: PlayerInput> Ord for ByOrder<I> {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed so the BinaryHeap pops the earliest input first.
        other.key().cmp(&self.key())
    }
}

/// A per-player queue of not-yet-applied inputs, ordered by
/// `(target_tick, id)` ascending.
pub struct InputQueue<I> {
    heap: BinaryHeap<ByOrder<I>>,
}

impl<I: PlayerInput> InputQueue<I> {
    /// Creates an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
        }
    }

    /// Enqueues an input.
    pub fn push(&mut self, input: I) {
        self.heap.push(ByOrder(input));
    }

    /// The earliest queued input, if any.
    #[must_use]
    pub fn peek(&self) -> Option<&I> {
        self.heap.peek().map(|entry| &entry.0)
    }

    /// Removes and returns the earliest queued input.
    pub fn pop(&mut self) -> Option<I> {
        self.heap.pop().map(|entry| entry.0)
    }

    /// Number of queued inputs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.heap.len()
    }

    /// Whether the queue is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }
}

impl<I: PlayerInput> Default for InputQueue<I> {
    fn default() -> Self {
        Self::new()
    }
}

/// Up key bit.
pub const KEY_UP: u8 = 1;
/// Down key bit.
pub const KEY_DOWN: u8 = 1 << 1;
/// Left key bit.
pub const KEY_LEFT: u8 = 1 << 2;
/// Right key bit.
pub const KEY_RIGHT: u8 = 1 << 3;
/// Jump key bit.
pub const KEY_JUMP: u8 = 1 << 4;

/// Eighth-turn steps for the key-combination-to-direction table.
const EIGHTH: f32 = std::f32::consts::FRAC_PI_4;

/// Direction multipliers indexed by `[1 + up - down][1 + right - left]`.
/// Entries on the no-vertical/no-horizontal row and column other than the
/// centre are reachable; the centre itself means "no movement".
const ANGLE_MAP: [[f32; 3]; 3] = [
    [3.0, 2.0, 1.0],
    [4.0, 0.0, 0.0],
    [5.0, 6.0, 7.0],
];

/// Movement intent: held direction keys plus the camera angle they are
/// relative to.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SteerInput {
    id: u32,
    target_tick: i64,
    keys: u8,
    angle: f32,
}

impl SteerInput {
    /// Encoded size: id, target tick, key bitmask, camera angle.
    pub const ENCODED_LEN: usize = 4 + 8 + 1 + 4;

    /// Creates an input from its wire fields.
    #[must_use]
    pub const fn new(id: u32, target_tick: i64, keys: u8, angle: f32) -> Self {
        Self {
            id,
            target_tick,
            keys,
            angle,
        }
    }

    /// Whether the jump key is held.
    #[must_use]
    pub fn is_jumping(&self) -> bool {
        self.keys & KEY_JUMP != 0
    }

    /// The horizontal velocity this input asks for, at full speed
    /// `max_speed`, rotated by the camera angle.
    #[must_use]
    pub fn target_motion(&self, max_speed: f32) -> Vec2 {
        let up = i32::from(self.keys & KEY_UP != 0);
        let down = i32::from(self.keys & KEY_DOWN != 0);
        let left = i32::from(self.keys & KEY_LEFT != 0);
        let right = i32::from(self.keys & KEY_RIGHT != 0);
        if up + down + left + right == 0 {
            return Vec2::ZERO;
        }
        let row = (1 + up - down) as usize;
        let column = (1 + right - left) as usize;
        if row == 1 && column == 1 {
            // Opposing keys cancel out.
            return Vec2::ZERO;
        }
        let direction = ANGLE_MAP[row][column] * EIGHTH - self.angle;
        Vec2::new(direction.cos() * max_speed, direction.sin() * max_speed)
    }

    /// Writes the input through a section cursor.
    pub fn encode(&self, writer: &mut SectionWriter<'_>) {
        writer.write_u32(self.id);
        writer.write_i64(self.target_tick);
        writer.write_u8(self.keys);
        writer.write_f32(self.angle);
    }

    /// Reads an input through a section cursor.
    #[must_use]
    pub fn decode(reader: &mut SectionReader<'_>) -> Self {
        Self {
            id: reader.read_u32(),
            target_tick: reader.read_i64(),
            keys: reader.read_u8(),
            angle: reader.read_f32(),
        }
    }
}

impl PlayerInput for SteerInput {
    fn id(&self) -> u32 {
        self.id
    }

    fn target_tick(&self) -> i64 {
        self.target_tick
    }

    fn set_target_tick(&mut self, tick: i64) {
        self.target_tick = tick;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warren_core::{FrameCompiler, FrameKind};

    fn event(uid: u32, id: u32) -> InputEvent<SteerInput> {
        InputEvent::new(0, uid, SteerInput::new(id, 0, 0, 0.0))
    }

    #[test]
    fn test_can_replace_empty_cell() {
        assert!(event(1, 1).can_replace(None));
    }

    #[test]
    fn test_can_replace_same_player_newer_only() {
        let old = event(1, 3);
        assert!(event(1, 4).can_replace(Some(&old)));
        assert!(!event(1, 3).can_replace(Some(&old)));
        assert!(!event(1, 2).can_replace(Some(&old)));
    }

    #[test]
    fn test_can_replace_other_player_always() {
        let old = event(1, 100);
        assert!(event(2, 1).can_replace(Some(&old)));
    }

    #[test]
    fn test_queue_orders_by_tick_then_id() {
        let mut queue = InputQueue::new();
        queue.push(SteerInput::new(4, 7, 0, 0.0));
        queue.push(SteerInput::new(2, 3, 0, 0.0));
        queue.push(SteerInput::new(3, 3, 0, 0.0));
        queue.push(SteerInput::new(1, 9, 0, 0.0));

        let order: Vec<u32> = std::iter::from_fn(|| queue.pop().map(|input| input.id())).collect();
        assert_eq!(order, vec![2, 3, 4, 1]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_no_keys_means_no_motion() {
        let input = SteerInput::new(1, 0, KEY_JUMP, 1.0);
        assert_eq!(input.target_motion(100.0), Vec2::ZERO);
        assert!(input.is_jumping());
    }

    #[test]
    fn test_opposing_keys_cancel() {
        let input = SteerInput::new(1, 0, KEY_UP | KEY_DOWN, 0.5);
        assert_eq!(input.target_motion(100.0), Vec2::ZERO);
    }

    #[test]
    fn test_up_key_direction() {
        let motion = SteerInput::new(1, 0, KEY_UP, 0.0).target_motion(100.0);
        let expected = 6.0 * EIGHTH;
        assert!((motion.x - expected.cos() * 100.0).abs() < 1e-4);
        assert!((motion.y - expected.sin() * 100.0).abs() < 1e-4);
    }

    #[test]
    fn test_camera_angle_rotates_motion() {
        let straight = SteerInput::new(1, 0, KEY_RIGHT, 0.0).target_motion(100.0);
        let rotated = SteerInput::new(1, 0, KEY_RIGHT, EIGHTH).target_motion(100.0);
        assert!((straight.length() - 100.0).abs() < 1e-3);
        assert!((rotated.length() - 100.0).abs() < 1e-3);
        assert!((straight.x - rotated.x).abs() > 1e-3);
    }

    #[test]
    fn test_wire_roundtrip() {
        let mut compiler = FrameCompiler::new();
        let section = compiler.reserve(&[
            FrameKind::Int,
            FrameKind::Long,
            FrameKind::Byte,
            FrameKind::Float,
        ]);
        assert_eq!(section.len(), SteerInput::ENCODED_LEN);

        let mut frame = vec![0u8; compiler.len()];
        let input = SteerInput::new(42, -3, KEY_UP | KEY_JUMP, 1.25);
        input.encode(&mut section.writer(&mut frame));
        let decoded = SteerInput::decode(&mut section.reader(&frame));
        assert_eq!(decoded, input);
    }
}
