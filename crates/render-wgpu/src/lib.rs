//! wgpu render backend for the cube field demo.
//!
//! Uploads one cube mesh and a two-stage WGSL program, then draws every
//! instance with its own bind + draw call.
//!
//! # Invariants
//! - A `Mesh` records exactly the number of indices it uploaded.
//! - GPU objects are released when their owner drops them.
//! - Renderer never mutates the instance field.

mod error;
mod mesh;
mod renderer;
mod shader;

pub use error::{RenderError, ShaderError, ShaderStage};
pub use mesh::{Mesh, MeshData, Vertex};
pub use renderer::{CubeRenderer, MVP_UNIFORM};
pub use shader::{Shader, UniformLocation, UniformTable, read_source};
