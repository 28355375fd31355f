//! The rollback engine.
//!
//! Two ring buffers, indexed by the same write position, cover the recent
//! past of the simulation:
//!
//! - a snapshot per tick, so any tick in the window can be restored, and
//! - the input events per tick and slot that made those snapshots happen.
//!
//! Inputs arrive through a bounded channel and are resolved onto a tick
//! the server is willing to honour. An input landing in the past marks a
//! watermark; the next update rewinds to the watermark's snapshot,
//! rebuilds every player's input timeline from the history ring and
//! replays forward. Inputs never get rejected for bad timing, only
//! shifted and logged.

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use crossbeam_channel::{Receiver, Sender};
use parking_lot::{MappedMutexGuard, Mutex, MutexGuard};
use thiserror::Error;

use crate::config::SimConfig;
use crate::heart::LatencyBoard;
use crate::input::{InputEvent, InputQueue, PlayerInput};
use crate::world::{PlayerHandle, World};

/// Errors surfaced to input producers.
#[derive(Debug, Error)]
pub enum InputError {
    /// The simulation has been torn down.
    #[error("simulation is no longer accepting inputs")]
    ChannelClosed,
}

/// Milliseconds since the Unix epoch, the time base shared by input
/// timestamps and update calls.
#[must_use]
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| elapsed.as_millis() as u64)
}

struct Delivery<I> {
    slot: usize,
    uid: u32,
    input: I,
    received_at_ms: u64,
}

struct RollbackEngine<W: World> {
    world: W,
    config: SimConfig,
    dt: f32,
    /// One serialized world per ring position.
    snapshots: Vec<Vec<u8>>,
    /// The input event per ring position and slot that is authoritative
    /// for that tick. Events are carried forward from tick to tick so a
    /// replay can reconstruct each player's intent at any covered tick.
    history: Vec<Vec<Option<InputEvent<W::Input>>>>,
    /// Accepted inputs not yet applied, per slot.
    pending: Vec<InputQueue<W::Input>>,
    /// Ring position of the current tick's snapshot.
    write_index: usize,
    /// Oldest tick dirtied by a late input since the last replay.
    watermark: Option<i64>,
    started_at_ms: u64,
    latency: Arc<LatencyBoard>,
    receiver: Receiver<Delivery<W::Input>>,
}

impl<W: World> RollbackEngine<W> {
    fn new(
        world: W,
        config: SimConfig,
        latency: Arc<LatencyBoard>,
        receiver: Receiver<Delivery<W::Input>>,
        started_at_ms: u64,
    ) -> Self {
        let ring_len = config.ring_len();
        let frame_len = world.frame_len();
        let max_players = world.max_players();
        let mut snapshots = vec![vec![0u8; frame_len]; ring_len];
        world.store(&mut snapshots[0]);
        tracing::info!(
            "Rollback rings ready: {} positions x {} snapshot bytes ({} KiB)",
            ring_len,
            frame_len,
            ring_len * frame_len / 1024
        );
        Self {
            world,
            dt: config.seconds_per_tick(),
            snapshots,
            history: (0..ring_len)
                .map(|_| (0..max_players).map(|_| None).collect())
                .collect(),
            pending: (0..max_players).map(|_| InputQueue::new()).collect(),
            write_index: 0,
            watermark: None,
            started_at_ms,
            latency,
            receiver,
            config,
        }
    }

    /// Ring position holding (or about to hold) `tick`.
    fn position_of(&self, tick: i64) -> usize {
        let ring_len = self.snapshots.len() as i64;
        let delta = tick - self.world.tick();
        (self.write_index as i64 + delta).rem_euclid(ring_len) as usize
    }

    /// Decides which tick an input takes effect at.
    ///
    /// The claimed tick is honoured as long as it stays within
    /// `max_input_shift` ticks of the latency-compensated receive tick,
    /// then clamped into the span the rings can still serve: no further
    /// back than a full replay window, no further ahead than the future
    /// slack, and never before tick 1.
    fn resolve_tick(&self, slot: usize, requested: i64, received_at_ms: u64) -> i64 {
        let latency_ms = u64::from(self.latency.get(slot).min(self.config.max_rollback_ms));
        let compensated_ms = received_at_ms
            .saturating_sub(self.started_at_ms)
            .saturating_sub(latency_ms);
        let reference =
            (compensated_ms as f64 * f64::from(self.config.tick_rate) / 1000.0).round() as i64;
        let shift = self.config.max_input_shift;
        let claimed = requested.clamp(reference - shift, reference + shift);

        let current = self.world.tick();
        let ring_len = self.snapshots.len() as i64;
        let slack = i64::from(self.config.future_slack);
        let lower = current - ring_len + slack + 2;
        let upper = current + slack;
        claimed.max(1).max(lower).min(upper)
    }

    fn drain_deliveries(&mut self) {
        while let Ok(delivery) = self.receiver.try_recv() {
            self.deliver(delivery);
        }
    }

    fn deliver(&mut self, delivery: Delivery<W::Input>) {
        let Delivery {
            slot,
            uid,
            mut input,
            received_at_ms,
        } = delivery;
        if self.world.live_uid(slot) != Some(uid) {
            tracing::debug!(
                "Dropping input #{} from departed player (slot {}, uid {})",
                input.id(),
                slot,
                uid
            );
            return;
        }

        let requested = input.target_tick();
        let resolved = self.resolve_tick(slot, requested, received_at_ms);
        if resolved != requested {
            tracing::warn!(
                "Shifting input #{} for slot {} from tick {} to tick {}",
                input.id(),
                slot,
                requested,
                resolved
            );
            input.set_target_tick(resolved);
        }

        let position = self.position_of(resolved);
        let event = InputEvent::new(slot, uid, input.clone());
        if event.can_replace(self.history[position][slot].as_ref()) {
            self.history[position][slot] = Some(event);
        }

        if resolved < self.world.tick() {
            self.watermark = Some(self.watermark.map_or(resolved, |tick| tick.min(resolved)));
        } else {
            self.pending[slot].push(input);
        }
    }

    fn update_to(&mut self, now_ms: u64) {
        self.drain_deliveries();
        if let Some(watermark) = self.watermark.take() {
            self.replay_from(watermark);
        }
        let elapsed_ms = now_ms.saturating_sub(self.started_at_ms);
        let target =
            (elapsed_ms as f64 * f64::from(self.config.tick_rate) / 1000.0).round() as i64;
        while self.world.tick() < target {
            self.world.apply_inputs(&mut self.pending, false);
            self.world.step(self.dt);
            self.advance_and_store();
        }
    }

    /// Moves the write position onto the tick the world just entered,
    /// snapshots it and settles that position's history cells.
    fn advance_and_store(&mut self) {
        self.write_index = (self.write_index + 1) % self.snapshots.len();
        self.world.store(&mut self.snapshots[self.write_index]);

        // Evict leftovers from the ring's previous lap. Events already
        // targeted at this exact tick were stored ahead of time and stay.
        let tick = self.world.tick();
        for cell in &mut self.history[self.write_index] {
            if cell.as_ref().is_some_and(|event| event.target_tick() != tick) {
                *cell = None;
            }
        }
        self.world.record_events(&mut self.history[self.write_index]);
    }

    /// Rewinds to `watermark` and replays up to the present.
    fn replay_from(&mut self, watermark: i64) {
        let current = self.world.tick();
        let span = current - watermark;
        let slack = i64::from(self.config.future_slack);
        let ring_len = self.snapshots.len();
        tracing::debug!("Rolling back {} ticks to tick {}", span, watermark);

        // Rebuild every player's input timeline from the history cells
        // covering the watermark through the future slack window. Carried
        // events repeat across consecutive positions; each is queued once.
        let max_players = self.world.max_players();
        let mut rebuilt: Vec<InputQueue<W::Input>> =
            (0..max_players).map(|_| InputQueue::new()).collect();
        let mut queued_ids: Vec<Option<u32>> = vec![None; max_players];
        let start = self.position_of(watermark);
        let positions = (current + slack - watermark) as usize;
        for offset in 0..=positions {
            let position = (start + offset) % ring_len;
            for slot in 0..max_players {
                let Some(event) = self.history[position][slot].as_ref() else {
                    continue;
                };
                if self.world.live_uid(slot) != Some(event.uid) {
                    continue;
                }
                if queued_ids[slot] == Some(event.input.id()) {
                    continue;
                }
                queued_ids[slot] = Some(event.input.id());
                rebuilt[slot].push(event.input.clone());
            }
        }

        self.world.load(&self.snapshots[start]);
        self.write_index = start;
        self.world.apply_inputs(&mut rebuilt, true);
        for _ in 0..span {
            self.world.step(self.dt);
            self.advance_and_store();
            self.world.apply_inputs(&mut rebuilt, false);
        }
        // Whatever still targets the future becomes the live queue set.
        self.pending = rebuilt;
    }

    fn current_snapshot(&self) -> &[u8] {
        &self.snapshots[self.write_index]
    }

    /// The snapshot closest to `age_ms` ago, clamped to what the ring
    /// still holds.
    fn past_snapshot(&self, age_ms: u64) -> &[u8] {
        let ring_len = self.snapshots.len() as i64;
        let ticks_back = (age_ms * u64::from(self.config.tick_rate) / 1000) as i64;
        let diff = ticks_back.min(self.world.tick()).min(ring_len - 1);
        let position = (self.write_index as i64 - diff).rem_euclid(ring_len) as usize;
        &self.snapshots[position]
    }
}

/// Thread-safe facade over the rollback engine.
///
/// Session threads feed inputs through a bounded channel (a full channel
/// blocks the sender rather than dropping the input) and read snapshots
/// out under a short lock. The runner thread calls [`Simulation::update`].
pub struct Simulation<W: World> {
    engine: Mutex<RollbackEngine<W>>,
    sender: Sender<Delivery<W::Input>>,
}

impl<W: World> Simulation<W> {
    /// Wraps `world` in an engine whose tick 0 corresponds to
    /// `started_at_ms`. Latency estimates for tick resolution are read
    /// from `latency`.
    pub fn new(world: W, config: SimConfig, latency: Arc<LatencyBoard>, started_at_ms: u64) -> Self {
        let (sender, receiver) = crossbeam_channel::bounded(config.input_channel_capacity);
        Self {
            engine: Mutex::new(RollbackEngine::new(
                world,
                config,
                latency,
                receiver,
                started_at_ms,
            )),
            sender,
        }
    }

    /// Queues an input received right now.
    pub fn accept_input(&self, handle: PlayerHandle, input: W::Input) -> Result<(), InputError> {
        self.accept_input_at(handle, input, now_millis())
    }

    /// Queues an input received at `received_at_ms`. The timestamp, not
    /// the moment of processing, anchors latency compensation.
    pub fn accept_input_at(
        &self,
        handle: PlayerHandle,
        input: W::Input,
        received_at_ms: u64,
    ) -> Result<(), InputError> {
        self.sender
            .send(Delivery {
                slot: handle.slot,
                uid: handle.uid,
                input,
                received_at_ms,
            })
            .map_err(|_| InputError::ChannelClosed)
    }

    /// Catches the simulation up to `now_ms`: drains queued inputs,
    /// replays if any landed in the past, then steps to the tick the
    /// wall clock calls for. Returns the world, still locked.
    pub fn update(&self, now_ms: u64) -> MappedMutexGuard<'_, W> {
        let mut engine = self.engine.lock();
        engine.update_to(now_ms);
        MutexGuard::map(engine, |engine| &mut engine.world)
    }

    /// Locks and returns the world without advancing it.
    pub fn world(&self) -> MappedMutexGuard<'_, W> {
        MutexGuard::map(self.engine.lock(), |engine| &mut engine.world)
    }

    /// Copy of the current tick's snapshot.
    #[must_use]
    pub fn current_snapshot(&self) -> Vec<u8> {
        self.engine.lock().current_snapshot().to_vec()
    }

    /// Copy of the snapshot closest to `age_ms` ago, clamped to the
    /// oldest snapshot the ring still holds.
    #[must_use]
    pub fn past_snapshot(&self, age_ms: u64) -> Vec<u8> {
        self.engine.lock().past_snapshot(age_ms).to_vec()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::WorldConfig;
    use crate::input::{SteerInput, KEY_RIGHT};
    use crate::physics::{FlatPhysics, Physics, TorusTerrain};
    use crate::world::GameWorld;
    use warren_core::Vec3;

    type TestWorld = GameWorld<FlatPhysics, TorusTerrain>;

    fn simulation(max_players: usize) -> (Simulation<TestWorld>, Arc<LatencyBoard>) {
        let config = SimConfig {
            max_players,
            ..SimConfig::default()
        };
        let world_config = WorldConfig::default();
        let physics = FlatPhysics::new(world_config.gravity, world_config.min_y);
        let terrain = TorusTerrain::new(world_config.width, world_config.depth);
        let world = TestWorld::new(
            world_config,
            max_players,
            physics,
            terrain,
            &[Vec3::new(30.0, 1.0, 0.0)],
        );
        let latency = Arc::new(LatencyBoard::new(max_players));
        (
            Simulation::new(world, config, Arc::clone(&latency), 0),
            latency,
        )
    }

    fn avatar_x(world: &TestWorld) -> f32 {
        let avatar = world.avatar(0).unwrap();
        world.physics().body(avatar.body_id()).position.x
    }

    #[test]
    fn test_update_follows_the_wall_clock() {
        let (simulation, _) = simulation(1);
        assert_eq!(simulation.update(1000).tick(), 60);
        // Going nowhere in time steps nothing.
        assert_eq!(simulation.update(1000).tick(), 60);
        assert_eq!(simulation.update(1500).tick(), 90);
    }

    #[test]
    fn test_input_tick_never_resolves_below_one() {
        let (simulation, _) = simulation(1);
        let handle = simulation.world().create_player(None, false).unwrap();
        simulation
            .accept_input_at(handle, SteerInput::new(1, -5000, KEY_RIGHT, 0.0), 0)
            .unwrap();
        simulation.update(0);

        let engine = simulation.engine.lock();
        assert_eq!(engine.pending[0].peek().unwrap().target_tick(), 1);
    }

    #[test]
    fn test_far_future_tick_is_pulled_back() {
        let (simulation, _) = simulation(1);
        let handle = simulation.world().create_player(None, false).unwrap();
        // Claimed tick 10000 at receive time 100ms: the reference tick is
        // 0, so the claim collapses to the maximum forward shift.
        simulation
            .accept_input_at(handle, SteerInput::new(1, 10_000, KEY_RIGHT, 0.0), 100)
            .unwrap();
        simulation.update(0);

        let engine = simulation.engine.lock();
        assert_eq!(engine.pending[0].peek().unwrap().target_tick(), 15);
    }

    #[test]
    fn test_honest_tick_claims_are_honoured() {
        let (simulation, _) = simulation(1);
        let handle = simulation.world().create_player(None, false).unwrap();
        simulation
            .accept_input_at(handle, SteerInput::new(1, 5, KEY_RIGHT, 0.0), 100)
            .unwrap();
        simulation.update(0);

        let engine = simulation.engine.lock();
        assert_eq!(engine.pending[0].peek().unwrap().target_tick(), 5);
    }

    #[test]
    fn test_late_input_rewrites_history() {
        let (simulation, _) = simulation(1);
        let handle = simulation.world().create_player(None, false).unwrap();
        let resting_x = {
            let world = simulation.update(1000);
            assert_eq!(world.tick(), 60);
            avatar_x(&world)
        };

        // An input for tick 5 arrives after tick 60 already ran.
        simulation
            .accept_input_at(handle, SteerInput::new(1, 5, KEY_RIGHT, 0.0), 100)
            .unwrap();
        let world = simulation.update(1000);
        assert_eq!(world.tick(), 60);
        assert!(
            avatar_x(&world) > resting_x + 1.0,
            "replay should have moved the avatar"
        );
    }

    #[test]
    fn test_inputs_from_departed_players_are_dropped() {
        let (simulation, _) = simulation(2);
        let handle = simulation.world().create_player(None, false).unwrap();
        simulation.world().remove_player(handle);
        simulation
            .accept_input_at(handle, SteerInput::new(1, 5, KEY_RIGHT, 0.0), 100)
            .unwrap();
        simulation.update(1000);

        let engine = simulation.engine.lock();
        assert!(engine.pending.iter().all(InputQueue::is_empty));
        assert!(engine.watermark.is_none());
    }

    #[test]
    fn test_past_snapshot_is_clamped_to_available_history() {
        let (simulation, _) = simulation(1);
        let oldest = simulation.current_snapshot();
        simulation.update(500);

        assert_eq!(simulation.past_snapshot(0), simulation.current_snapshot());
        // Way past the start of time: the oldest snapshot, not a panic.
        assert_eq!(simulation.past_snapshot(1 << 40), oldest);
    }

    #[test]
    fn test_past_snapshot_reaches_back_in_ticks() {
        let (simulation, _) = simulation(1);
        simulation.update(500);
        let halfway = simulation.current_snapshot();
        simulation.update(1000);

        assert_eq!(simulation.past_snapshot(500), halfway);
        assert_ne!(simulation.past_snapshot(0), halfway);
    }
}
