//! Non-player simulated objects.

use warren_core::{FrameKind, FrameSection};

use crate::physics::{Body, BodyId};

/// A free-floating ball that players can bump around. Purely physical:
/// no input state, so its snapshot section is self-contained.
pub struct DriftBall {
    body: BodyId,
    section: FrameSection,
}

impl DriftBall {
    /// Snapshot layout of one ball: activation flag, position, velocity.
    pub const FRAME_KINDS: [FrameKind; 3] = [FrameKind::Byte, FrameKind::Vec3, FrameKind::Vec3];

    pub(crate) fn new(body: BodyId, section: FrameSection) -> Self {
        Self { body, section }
    }

    /// Handle of the ball's rigid body.
    #[must_use]
    pub fn body_id(&self) -> BodyId {
        self.body
    }

    /// Serializes the ball's state into its snapshot section.
    pub fn store(&self, frame: &mut [u8], body: &Body) {
        let mut writer = self.section.writer(frame);
        writer.write_u8(u8::from(body.active));
        writer.write_vec3(body.position);
        writer.write_vec3(body.velocity);
    }

    /// Restores the ball's state from its snapshot section.
    pub fn load(&self, frame: &[u8], body: &mut Body) {
        let mut reader = self.section.reader(frame);
        body.active = reader.read_u8() != 0;
        body.position = reader.read_vec3();
        body.velocity = reader.read_vec3();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use warren_core::{FrameCompiler, Vec3};

    #[test]
    fn test_snapshot_roundtrip() {
        let mut compiler = FrameCompiler::new();
        let ball = DriftBall::new(BodyId(3), compiler.reserve(&DriftBall::FRAME_KINDS));
        let mut frame = vec![0u8; compiler.len()];

        let stored = Body {
            position: Vec3::new(10.0, 0.5, -10.0),
            velocity: Vec3::new(0.0, 0.0, 2.0),
            active: true,
        };
        ball.store(&mut frame, &stored);

        let mut restored = Body::default();
        ball.load(&frame, &mut restored);
        assert_eq!(restored, stored);
    }
}
