//! Scene state for the cube field demo.
//!
//! Everything here is independent of the GPU: the renderer consumes the
//! instance transforms and camera matrices, the event loop drives the clock.
//!
//! # Invariants
//! - The instance array length always equals the configured instance count.
//! - The instance array is never mutated after generation.
//! - The frame clock never drops or invents elapsed time.

mod camera;
mod clock;
mod config;
mod instances;

pub use camera::OrbitCamera;
pub use clock::{FrameClock, FrameTick, MAX_TICK_RATE, MIN_TICK_RATE};
pub use config::{ConfigError, DemoConfig};
pub use instances::{
    InstanceField, SPREAD_PER_INSTANCE, generate_transforms, generate_transforms_with, spread_for,
};
