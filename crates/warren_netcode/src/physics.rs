//! The physics collaborator boundary.
//!
//! The world drives an external physics engine through a narrow trait:
//! bodies go in, one fixed step runs, positions and contacts come out.
//! Nothing in the simulation assumes the collaborator is deterministic;
//! determinism is recovered by snapshotting body state every tick and
//! restoring it before replays.
//!
//! [`FlatPhysics`] is the in-tree collaborator: a flat-ground integrator
//! that is fully deterministic and fast enough for tests and headless runs.

use thiserror::Error;
use warren_core::Vec3;

/// A physics step failure. The simulation logs it and carries on with
/// whatever state the collaborator left behind.
#[derive(Debug, Error)]
#[error("physics step failed: {0}")]
pub struct StepError(pub String);

/// Handle to a rigid body owned by a physics collaborator.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BodyId(pub usize);

/// The mutable state of one rigid body.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Body {
    /// World position.
    pub position: Vec3,

    /// Linear velocity.
    pub velocity: Vec3,

    /// Whether the body participates in the next step. Inactive bodies
    /// are skipped entirely.
    pub active: bool,
}

impl Body {
    /// A body at rest at `position`.
    #[must_use]
    pub fn at_rest(position: Vec3) -> Self {
        Self {
            position,
            velocity: Vec3::ZERO,
            active: false,
        }
    }
}

/// What the simulation needs from a physics engine.
pub trait Physics {
    /// Registers a body and returns its handle.
    fn add_body(&mut self, body: Body) -> BodyId;

    /// Removes a body. The handle must not be used afterwards.
    fn remove_body(&mut self, id: BodyId);

    /// Read access to a body's state.
    fn body(&self, id: BodyId) -> &Body;

    /// Write access to a body's state.
    fn body_mut(&mut self, id: BodyId) -> &mut Body;

    /// Advances every active body by `dt` seconds.
    fn step_simulation(&mut self, dt: f32) -> Result<(), StepError>;

    /// Whether the body ended the last step resting on the ground.
    fn has_ground_contact(&self, id: BodyId) -> bool;
}

/// What the simulation needs from the terrain: a wrapping rule per
/// horizontal axis.
pub trait Terrain {
    /// Maps `x` into the canonical world span.
    fn wrap_x(&self, x: f32) -> f32;

    /// Maps `z` into the canonical world span.
    fn wrap_z(&self, z: f32) -> f32;
}

/// Toroidal terrain: both horizontal axes wrap around a fixed span
/// centred on the origin.
#[derive(Clone, Copy, Debug)]
pub struct TorusTerrain {
    width: f32,
    depth: f32,
}

impl TorusTerrain {
    /// Creates a torus spanning `[-width / 2, width / 2)` by
    /// `[-depth / 2, depth / 2)`.
    #[must_use]
    pub const fn new(width: f32, depth: f32) -> Self {
        Self { width, depth }
    }
}

fn wrap_centered(value: f32, span: f32) -> f32 {
    value - (value / span + 0.5).floor() * span
}

impl Terrain for TorusTerrain {
    fn wrap_x(&self, x: f32) -> f32 {
        wrap_centered(x, self.width)
    }

    fn wrap_z(&self, z: f32) -> f32 {
        wrap_centered(z, self.depth)
    }
}

/// Deterministic flat-ground collaborator.
///
/// Semi-implicit Euler over a ground plane: gravity first, then position,
/// then a ground clamp. No body-body collisions.
pub struct FlatPhysics {
    gravity: f32,
    floor_y: f32,
    bodies: Vec<Option<Body>>,
    grounded: Vec<bool>,
}

impl FlatPhysics {
    /// Creates a collaborator with the given downward acceleration and
    /// ground plane height.
    #[must_use]
    pub fn new(gravity: f32, floor_y: f32) -> Self {
        Self {
            gravity,
            floor_y,
            bodies: Vec::new(),
            grounded: Vec::new(),
        }
    }
}

impl Physics for FlatPhysics {
    fn add_body(&mut self, body: Body) -> BodyId {
        let grounded = body.position.y <= self.floor_y;
        if let Some(index) = self.bodies.iter().position(Option::is_none) {
            self.bodies[index] = Some(body);
            self.grounded[index] = grounded;
            BodyId(index)
        } else {
            self.bodies.push(Some(body));
            self.grounded.push(grounded);
            BodyId(self.bodies.len() - 1)
        }
    }

    fn remove_body(&mut self, id: BodyId) {
        self.bodies[id.0] = None;
        self.grounded[id.0] = false;
    }

    fn body(&self, id: BodyId) -> &Body {
        self.bodies[id.0]
            .as_ref()
            .unwrap_or_else(|| panic!("body {} was removed", id.0))
    }

    fn body_mut(&mut self, id: BodyId) -> &mut Body {
        self.bodies[id.0]
            .as_mut()
            .unwrap_or_else(|| panic!("body {} was removed", id.0))
    }

    fn step_simulation(&mut self, dt: f32) -> Result<(), StepError> {
        for (index, slot) in self.bodies.iter_mut().enumerate() {
            let Some(body) = slot else { continue };
            if !body.active {
                continue;
            }
            body.velocity.y -= self.gravity * dt;
            body.position += body.velocity * dt;
            if body.position.y <= self.floor_y {
                body.position.y = self.floor_y;
                if body.velocity.y < 0.0 {
                    body.velocity.y = 0.0;
                }
                self.grounded[index] = true;
            } else {
                self.grounded[index] = false;
            }
        }
        Ok(())
    }

    fn has_ground_contact(&self, id: BodyId) -> bool {
        self.grounded[id.0]
    }
}
