//! # Warren Netcode
//!
//! The authoritative simulation core of the Warren backend: a fixed-tick
//! world with rollback netcode. Clients timestamp their inputs with the
//! tick they were produced for; the server honours honest timestamps,
//! shifts dishonest ones, and rewinds-and-replays whenever an input lands
//! on a tick that has already run.
//!
//! ## The shape of a tick
//!
//! ```text
//!              inputs (bounded channel, any session thread)
//!                               |
//!                               v
//!   +--------------------- Simulation ----------------------+
//!   |  resolve tick <- LatencyBoard (lock-free estimates)   |
//!   |       |                                               |
//!   |  late? -> rewind to watermark snapshot, replay        |
//!   |       |                                               |
//!   |  apply inputs -> step world -> store snapshot         |
//!   |                        |            |                 |
//!   |                 snapshot ring   history ring          |
//!   +--------------------------------------------------------+
//!                               |
//!                               v
//!              flat snapshot bytes (to every session)
//! ```
//!
//! ## Module map
//!
//! - [`config`] - tuning knobs, loaded from TOML
//! - [`input`] - input traits, ordering rules, the steering input
//! - [`registry`] - player slot allocation and the snapshot tick header
//! - [`physics`] - the physics collaborator boundary and the flat-ground
//!   reference collaborator
//! - [`world`] - the [`World`] contract and the concrete game world
//! - [`heart`] - round-trip latency probes and estimates
//! - [`rollback`] - the engine itself and its thread-safe facade
//! - [`runner`] - the dedicated simulation thread

#![deny(unsafe_code)]
#![deny(clippy::all)]
#![warn(clippy::pedantic)]

pub mod config;
pub mod heart;
pub mod input;
pub mod physics;
pub mod registry;
pub mod rollback;
pub mod runner;
pub mod world;

pub use config::{ConfigError, SimConfig, WorldConfig};
pub use heart::{Heart, LatencyBoard, MultiPlayerHeart, Probe, DEFAULT_LATENCY_MS};
pub use input::{InputEvent, InputQueue, PlayerInput, SteerInput};
pub use physics::{Body, BodyId, FlatPhysics, Physics, StepError, Terrain, TorusTerrain};
pub use registry::SlotRegistry;
pub use rollback::{now_millis, InputError, Simulation};
pub use runner::SimulationRunner;
pub use world::{Avatar, DriftBall, GameWorld, PlayerHandle, World};
