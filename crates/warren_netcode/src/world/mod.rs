//! The simulated world.
//!
//! [`World`] is the contract the rollback engine drives: a fixed-tick
//! state machine that can apply queued inputs, step, and serialize itself
//! into a flat snapshot. [`GameWorld`] is the concrete world of the Warren
//! backend: player avatars and drifting decor on a toroidal map, backed by
//! a pluggable physics collaborator.

mod avatar;
mod decor;

pub use avatar::Avatar;
pub use decor::DriftBall;

use warren_core::{FrameCompiler, FrameSection, Vec3};

use crate::config::WorldConfig;
use crate::input::{InputEvent, InputQueue, PlayerInput, SteerInput};
use crate::physics::{Body, Physics, Terrain};
use crate::registry::SlotRegistry;

/// What the rollback engine needs from a simulated world.
pub trait World {
    /// The input type players steer this world with.
    type Input: PlayerInput;

    /// Slot capacity. Fixed for the lifetime of the world.
    fn max_players(&self) -> usize;

    /// Current simulation tick.
    fn tick(&self) -> i64;

    /// Size in bytes of one snapshot of this world.
    fn frame_len(&self) -> usize;

    /// Uid of the player occupying `slot`, if any.
    fn live_uid(&self, slot: usize) -> Option<u32>;

    /// Drains every input targeted at the current tick or earlier from the
    /// per-slot queues and applies it.
    ///
    /// With `force` unset, inputs older than a player's latest applied
    /// input are skipped. With `force` set, all input-derived state is
    /// cleared first and the drained inputs are applied unconditionally;
    /// this rebuilds input state exactly as of the current tick during a
    /// replay. Inputs targeted at future ticks stay queued either way.
    fn apply_inputs(&mut self, queues: &mut [InputQueue<Self::Input>], force: bool);

    /// Offers each player's latest applied input event to the matching
    /// history cell, overwriting only where the event wins the cell's
    /// replacement rule.
    fn record_events(&self, cells: &mut [Option<InputEvent<Self::Input>>]);

    /// Advances the world by one tick of `dt` simulated seconds.
    fn step(&mut self, dt: f32);

    /// Serializes the world into `frame`.
    fn store(&self, frame: &mut [u8]);

    /// Restores the world from `frame`, including the tick counter.
    fn load(&mut self, frame: &[u8]);
}

/// A player's claim on a slot: the slot index plus the connection uid that
/// proves the claim is still current after the slot is recycled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PlayerHandle {
    /// Slot index.
    pub slot: usize,

    /// Connection uid.
    pub uid: u32,
}

/// The concrete Warren world.
pub struct GameWorld<P: Physics, T: Terrain> {
    config: WorldConfig,
    registry: SlotRegistry,
    physics: P,
    terrain: T,
    avatars: Vec<Option<Avatar>>,
    avatar_sections: Vec<FrameSection>,
    decor: Vec<DriftBall>,
    frame_len: usize,
}

impl<P: Physics, T: Terrain> GameWorld<P, T> {
    /// Builds a world, deciding the full snapshot layout up front: tick
    /// header, then one avatar section per slot, then the decor.
    pub fn new(
        config: WorldConfig,
        max_players: usize,
        mut physics: P,
        terrain: T,
        decor_spawns: &[Vec3],
    ) -> Self {
        let mut compiler = FrameCompiler::new();
        let registry = SlotRegistry::new(max_players, &mut compiler);
        let avatar_sections = compiler.reserve_multiple(max_players, &Avatar::FRAME_KINDS);
        let decor = decor_spawns
            .iter()
            .map(|&spawn| {
                let body = physics.add_body(Body::at_rest(spawn));
                DriftBall::new(body, compiler.reserve(&DriftBall::FRAME_KINDS))
            })
            .collect();
        let frame_len = compiler.len();
        tracing::debug!(
            "World layout compiled: {} bytes, {} player slots, {} decor bodies",
            frame_len,
            max_players,
            decor_spawns.len()
        );
        Self {
            config,
            registry,
            physics,
            terrain,
            avatars: (0..max_players).map(|_| None).collect(),
            avatar_sections,
            decor,
            frame_len,
        }
    }

    /// Admits a new player, or `None` when every slot is taken.
    pub fn create_player(
        &mut self,
        username: Option<String>,
        alt_skin: bool,
    ) -> Option<PlayerHandle> {
        let slot = self.registry.reserve_slot()?;
        let uid = self.registry.next_uid();
        let username = username.unwrap_or_else(|| format!("Player {}", slot + 1));
        let spawn = Vec3::new(0.0, self.config.spawn_height, 0.0);
        let body = self.physics.add_body(Body::at_rest(spawn));
        tracing::info!("Player joined: {} (uid {}, slot {})", username, uid, slot);
        self.avatars[slot] = Some(Avatar::new(
            uid,
            slot,
            username,
            alt_skin,
            body,
            self.avatar_sections[slot],
        ));
        Some(PlayerHandle { slot, uid })
    }

    /// Removes a player. Rejects handles whose uid no longer matches the
    /// slot's occupant.
    pub fn remove_player(&mut self, handle: PlayerHandle) -> bool {
        let matches = self.avatars[handle.slot]
            .as_ref()
            .is_some_and(|avatar| avatar.uid() == handle.uid);
        if !matches {
            return false;
        }
        if let Some(avatar) = self.avatars[handle.slot].take() {
            tracing::info!(
                "Player left: {} (uid {}, slot {})",
                avatar.username(),
                avatar.uid(),
                avatar.slot()
            );
            self.physics.remove_body(avatar.body_id());
        }
        self.registry.release_slot(handle.slot)
    }

    /// The avatar in `slot`, if occupied.
    #[must_use]
    pub fn avatar(&self, slot: usize) -> Option<&Avatar> {
        self.avatars.get(slot).and_then(Option::as_ref)
    }

    /// Iterates over live avatars.
    pub fn avatars(&self) -> impl Iterator<Item = &Avatar> {
        self.avatars.iter().flatten()
    }

    /// The physics collaborator.
    #[must_use]
    pub fn physics(&self) -> &P {
        &self.physics
    }

    /// The slot registry.
    #[must_use]
    pub fn registry(&self) -> &SlotRegistry {
        &self.registry
    }
}

impl<P: Physics, T: Terrain> World for GameWorld<P, T> {
    type Input = SteerInput;

    fn max_players(&self) -> usize {
        self.registry.max_players()
    }

    fn tick(&self) -> i64 {
        self.registry.tick()
    }

    fn frame_len(&self) -> usize {
        self.frame_len
    }

    fn live_uid(&self, slot: usize) -> Option<u32> {
        self.avatar(slot).map(Avatar::uid)
    }

    fn apply_inputs(&mut self, queues: &mut [InputQueue<SteerInput>], force: bool) {
        let tick = self.registry.tick();
        let max_speed = self.config.max_speed;
        for (slot, entry) in self.avatars.iter_mut().enumerate() {
            let Some(avatar) = entry.as_mut() else {
                continue;
            };
            let Some(queue) = queues.get_mut(slot) else {
                continue;
            };
            if force {
                avatar.clear_input();
            }
            loop {
                match queue.peek() {
                    Some(next) if next.target_tick() <= tick => {}
                    _ => break,
                }
                let Some(input) = queue.pop() else {
                    break;
                };
                if !force && avatar.input_id().is_some_and(|current| input.id() < current) {
                    tracing::debug!(
                        "Skipping outdated input #{} for slot {} at tick {}",
                        input.id(),
                        slot,
                        tick
                    );
                    continue;
                }
                avatar.apply_input(input, max_speed);
            }
        }
    }

    fn record_events(&self, cells: &mut [Option<InputEvent<SteerInput>>]) {
        for avatar in self.avatars.iter().flatten() {
            if let Some(event) = avatar.last_event() {
                if event.can_replace(cells[avatar.slot()].as_ref()) {
                    cells[avatar.slot()] = Some(event.clone());
                }
            }
        }
    }

    fn step(&mut self, dt: f32) {
        for avatar in self.avatars.iter_mut().flatten() {
            let body = self.physics.body_mut(avatar.body_id());
            avatar.before_physics(body, dt, &self.config);
        }
        if let Err(error) = self.physics.step_simulation(dt) {
            tracing::warn!(
                "Physics step failed at tick {}: {}",
                self.registry.tick(),
                error
            );
        }
        for avatar in self.avatars.iter_mut().flatten() {
            let contact = self.physics.has_ground_contact(avatar.body_id());
            let body = self.physics.body_mut(avatar.body_id());
            avatar.after_physics(body, &self.terrain, contact, &self.config);
        }
        self.registry.advance_tick();
    }

    fn store(&self, frame: &mut [u8]) {
        self.registry.write_header(frame);
        for avatar in self.avatars.iter().flatten() {
            avatar.store(frame, self.physics.body(avatar.body_id()));
        }
        for ball in &self.decor {
            ball.store(frame, self.physics.body(ball.body_id()));
        }
    }

    fn load(&mut self, frame: &[u8]) {
        self.registry.read_header(frame);
        for avatar in self.avatars.iter_mut().flatten() {
            let body = self.physics.body_mut(avatar.body_id());
            avatar.load(frame, body);
        }
        for ball in &self.decor {
            ball.load(frame, self.physics.body_mut(ball.body_id()));
        }
    }
}
