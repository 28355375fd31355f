//! # Warren Core
//!
//! Leaf crate for the Warren backend: the frame layout compiler and the
//! binary section codec that every snapshot buffer in the simulation goes
//! through, plus the POD vector types they carry.
//!
//! ## Architecture rules
//!
//! 1. **Layout is decided once** - all reservations happen at world
//!    construction; offsets never move afterwards
//! 2. **Snapshots are flat bytes** - entities serialize into pre-sized
//!    sections of one shared buffer, not into per-entity heap objects
//! 3. **Overruns are bugs** - a cursor running past its section is a
//!    contract violation between the compiler and an entity, and panics

#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]

pub mod frame;
pub mod math;

pub use frame::{FrameCompiler, FrameKind, FrameSection, SectionReader, SectionWriter};
pub use math::{Vec2, Vec3};
