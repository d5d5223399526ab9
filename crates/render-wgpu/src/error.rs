use std::fmt;
use std::path::PathBuf;

/// Pipeline stage a shader source belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}

impl ShaderStage {
    pub(crate) fn label(self) -> &'static str {
        match self {
            Self::Vertex => "vertex_shader",
            Self::Fragment => "fragment_shader",
        }
    }
}

impl fmt::Display for ShaderStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vertex => f.write_str("vertex"),
            Self::Fragment => f.write_str("fragment"),
        }
    }
}

/// Errors from loading or compiling a shader program.
#[derive(Debug, thiserror::Error)]
pub enum ShaderError {
    #[error("failed to read shader source {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("{stage} shader failed to compile:\n{log}")]
    Compile { stage: ShaderStage, log: String },
}

/// Errors from creating GPU resources for the renderer.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("mesh has no indices")]
    EmptyMesh,
    #[error("index {index} is out of range for {vertex_count} vertices")]
    IndexOutOfRange { index: u16, vertex_count: usize },
    #[error("GPU allocation failed for {what}: {message}")]
    Allocation { what: &'static str, message: String },
    #[error("shader program does not declare uniform `{0}`")]
    UnresolvedUniform(String),
    #[error("{count} instances exceed the per-draw uniform capacity of this device ({max})")]
    TooManyInstances { count: usize, max: usize },
    #[error("instance field holds {actual} transforms but the renderer was built for {expected}")]
    InstanceCountMismatch { expected: usize, actual: usize },
    #[error("render pipeline creation failed: {0}")]
    Pipeline(String),
    #[error(transparent)]
    Shader(#[from] ShaderError),
}

/// Run `f` inside a wgpu error scope and return whatever the scope caught.
pub(crate) fn scoped<T>(
    device: &wgpu::Device,
    filter: wgpu::ErrorFilter,
    f: impl FnOnce() -> T,
) -> (T, Option<wgpu::Error>) {
    device.push_error_scope(filter);
    let value = f();
    let error = pollster::block_on(device.pop_error_scope());
    (value, error)
}
