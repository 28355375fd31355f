//! Player avatars.
//!
//! An avatar joins three things: the player's identity (uid, slot, name),
//! the rigid body it drives, and the input-derived movement state. The
//! physical half is serialized into the snapshot; the input-derived half
//! is reconstructed from the input history during replays.

use warren_core::{FrameKind, FrameSection, Vec2, Vec3};

use crate::config::WorldConfig;
use crate::input::{InputEvent, PlayerInput, SteerInput};
use crate::physics::{Body, BodyId, Terrain};

/// A connected player's presence in the world.
pub struct Avatar {
    uid: u32,
    slot: usize,
    username: String,
    alt_skin: bool,
    body: BodyId,
    section: FrameSection,
    target_motion: Vec2,
    jumping: bool,
    last_event: Option<InputEvent<SteerInput>>,
    ground_time_left: f32,
    jump_control_time_left: f32,
}

impl Avatar {
    /// Snapshot layout of one avatar: activation flag, position, velocity,
    /// ground leniency timer, jump control timer.
    pub const FRAME_KINDS: [FrameKind; 5] = [
        FrameKind::Bool,
        FrameKind::Vec3,
        FrameKind::Vec3,
        FrameKind::Float,
        FrameKind::Float,
    ];

    pub(crate) fn new(
        uid: u32,
        slot: usize,
        username: String,
        alt_skin: bool,
        body: BodyId,
        section: FrameSection,
    ) -> Self {
        Self {
            uid,
            slot,
            username,
            alt_skin,
            body,
            section,
            target_motion: Vec2::ZERO,
            jumping: false,
            last_event: None,
            ground_time_left: 0.0,
            jump_control_time_left: 0.0,
        }
    }

    /// Connection uid.
    #[must_use]
    pub fn uid(&self) -> u32 {
        self.uid
    }

    /// Slot index.
    #[must_use]
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Display name.
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Whether the player uses the alternative skin.
    #[must_use]
    pub fn alt_skin(&self) -> bool {
        self.alt_skin
    }

    /// Handle of the rigid body this avatar drives.
    #[must_use]
    pub fn body_id(&self) -> BodyId {
        self.body
    }

    /// Id of the most recently applied input, if any.
    #[must_use]
    pub fn input_id(&self) -> Option<u32> {
        self.last_event.as_ref().map(|event| event.input.id())
    }

    /// The most recently applied input event, if any.
    #[must_use]
    pub fn last_event(&self) -> Option<&InputEvent<SteerInput>> {
        self.last_event.as_ref()
    }

    /// Adopts `input` as the avatar's current intent.
    pub fn apply_input(&mut self, input: SteerInput, max_speed: f32) {
        self.target_motion = input.target_motion(max_speed);
        self.jumping = input.is_jumping();
        self.last_event = Some(InputEvent::new(self.slot, self.uid, input));
    }

    /// Forgets all input-derived state. Used at the start of a replay so
    /// state from the abandoned timeline cannot leak into the new one.
    pub fn clear_input(&mut self) {
        self.target_motion = Vec2::ZERO;
        self.jumping = false;
        self.last_event = None;
    }

    /// Steers the rigid body before the physics step.
    pub fn before_physics(&mut self, body: &mut Body, dt: f32, config: &WorldConfig) {
        // Horizontal velocity chases the target motion at a bounded rate.
        let delta_x = self.target_motion.x - body.velocity.x;
        let delta_z = self.target_motion.y - body.velocity.z;
        let delta_len = (delta_x * delta_x + delta_z * delta_z).sqrt();
        let max_delta = config.acceleration * dt;
        if delta_len <= max_delta {
            body.velocity.x = self.target_motion.x;
            body.velocity.z = self.target_motion.y;
        } else {
            let scale = max_delta / delta_len;
            body.velocity.x += delta_x * scale;
            body.velocity.z += delta_z * scale;
        }

        if self.jumping {
            if self.ground_time_left > 0.0 {
                body.velocity.y = config.jump_speed;
                self.ground_time_left = 0.0;
                self.jump_control_time_left = config.jump_control_leniency;
            } else if self.jump_control_time_left > 0.0 {
                // Still within the control window of the last jump.
                body.velocity.y = config.jump_speed;
            }
        } else {
            self.jump_control_time_left = 0.0;
        }

        let max_y_speed = 2.0 * config.jump_speed;
        body.velocity.y = body.velocity.y.clamp(-max_y_speed, max_y_speed);

        if self.target_motion != Vec2::ZERO || self.jumping {
            body.active = true;
        }

        self.ground_time_left = (self.ground_time_left - dt).max(0.0);
        self.jump_control_time_left = (self.jump_control_time_left - dt).max(0.0);
    }

    /// Settles the rigid body after the physics step: refreshes ground
    /// leniency, wraps the horizontal position, recovers from out-of-range
    /// heights and puts idle bodies to sleep.
    pub fn after_physics(
        &mut self,
        body: &mut Body,
        terrain: &impl Terrain,
        ground_contact: bool,
        config: &WorldConfig,
    ) {
        if ground_contact {
            self.ground_time_left = config.ground_leniency;
        }

        body.position.x = terrain.wrap_x(body.position.x);
        body.position.z = terrain.wrap_z(body.position.z);

        if body.position.y < config.min_y || body.position.y > config.max_y {
            body.position.y = config.spawn_height;
            body.velocity = Vec3::ZERO;
        }

        if ground_contact
            && self.target_motion == Vec2::ZERO
            && !self.jumping
            && body.velocity == Vec3::ZERO
        {
            body.active = false;
        }
    }

    /// Serializes the physical state into the avatar's snapshot section.
    pub fn store(&self, frame: &mut [u8], body: &Body) {
        let mut writer = self.section.writer(frame);
        writer.write_bool(body.active);
        writer.write_vec3(body.position);
        writer.write_vec3(body.velocity);
        writer.write_f32(self.ground_time_left);
        writer.write_f32(self.jump_control_time_left);
    }

    /// Restores the physical state from the avatar's snapshot section.
    pub fn load(&mut self, frame: &[u8], body: &mut Body) {
        let mut reader = self.section.reader(frame);
        body.active = reader.read_bool();
        body.position = reader.read_vec3();
        body.velocity = reader.read_vec3();
        self.ground_time_left = reader.read_f32();
        self.jump_control_time_left = reader.read_f32();
    }
}
