use crate::error::{ShaderError, ShaderStage, scoped};
use std::collections::HashMap;
use std::path::Path;

/// Bind point of a `var<uniform>` declaration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UniformLocation {
    pub group: u32,
    pub binding: u32,
}

/// Read a shader source file. A missing file is fatal to startup.
pub fn read_source(path: impl AsRef<Path>) -> Result<String, ShaderError> {
    let path = path.as_ref();
    std::fs::read_to_string(path).map_err(|source| ShaderError::Read {
        path: path.to_path_buf(),
        source,
    })
}

/// Name to bind point lookup built from the `var<uniform>` declarations in
/// WGSL sources.
#[derive(Debug, Clone, Default)]
pub struct UniformTable {
    locations: HashMap<String, UniformLocation>,
}

impl UniformTable {
    /// Collect uniforms from every source. When two stages declare the same
    /// name the first declaration wins.
    pub fn from_sources<'a>(sources: impl IntoIterator<Item = &'a str>) -> Self {
        let mut locations = HashMap::new();
        for source in sources {
            for (name, location) in uniform_declarations(source) {
                match locations.get(&name) {
                    Some(existing) if *existing != location => {
                        tracing::warn!(
                            uniform = %name,
                            ?existing,
                            ignored = ?location,
                            "uniform declared at two bind points"
                        );
                    }
                    Some(_) => {}
                    None => {
                        locations.insert(name, location);
                    }
                }
            }
        }
        Self { locations }
    }

    /// `None` when no stage declares `name`.
    pub fn location(&self, name: &str) -> Option<UniformLocation> {
        self.locations.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.locations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locations.is_empty()
    }
}

fn uniform_declarations(source: &str) -> Vec<(String, UniformLocation)> {
    strip_comments(source)
        .split(';')
        .filter_map(parse_uniform_declaration)
        .collect()
}

fn parse_uniform_declaration(statement: &str) -> Option<(String, UniformLocation)> {
    const VAR_UNIFORM: &str = "var<uniform>";
    let at = statement.find(VAR_UNIFORM)?;
    let attributes = &statement[..at];
    let group = attribute_value(attributes, "@group")?;
    let binding = attribute_value(attributes, "@binding")?;

    let name = statement[at + VAR_UNIFORM.len()..].split(':').next()?.trim();
    if name.is_empty() {
        return None;
    }
    Some((name.to_string(), UniformLocation { group, binding }))
}

fn attribute_value(attributes: &str, key: &str) -> Option<u32> {
    let start = attributes.rfind(key)? + key.len();
    let rest = attributes[start..].trim_start().strip_prefix('(')?;
    let end = rest.find(')')?;
    rest[..end].trim().parse().ok()
}

/// Blank out WGSL comments. Block comments nest; an unterminated one
/// swallows the rest of the source.
fn strip_comments(source: &str) -> String {
    let bytes = source.as_bytes();
    let mut out = String::with_capacity(source.len());
    let mut depth = 0usize;
    let mut copied = 0;
    let mut i = 0;
    while i < bytes.len() {
        let pair = (bytes[i], bytes.get(i + 1).copied());
        match pair {
            (b'/', Some(b'*')) => {
                if depth == 0 {
                    out.push_str(&source[copied..i]);
                    out.push(' ');
                }
                depth += 1;
                i += 2;
            }
            (b'*', Some(b'/')) if depth > 0 => {
                depth -= 1;
                i += 2;
                if depth == 0 {
                    copied = i;
                }
            }
            (b'/', Some(b'/')) if depth == 0 => {
                out.push_str(&source[copied..i]);
                i = source[i..].find('\n').map_or(bytes.len(), |nl| i + nl);
                copied = i;
            }
            _ => i += 1,
        }
    }
    if depth == 0 {
        out.push_str(&source[copied..]);
    }
    out
}

/// A compiled vertex + fragment program and its uniform lookup.
#[derive(Debug)]
pub struct Shader {
    vertex: wgpu::ShaderModule,
    fragment: wgpu::ShaderModule,
    uniforms: UniformTable,
}

impl Shader {
    pub const VERTEX_ENTRY: &'static str = "vs_main";
    pub const FRAGMENT_ENTRY: &'static str = "fs_main";

    /// Compile both stages. Compiler diagnostics are logged; any error
    /// diagnostic fails creation with the full log.
    pub fn create(
        device: &wgpu::Device,
        vertex_source: &str,
        fragment_source: &str,
    ) -> Result<Self, ShaderError> {
        let vertex = compile(device, ShaderStage::Vertex, vertex_source)?;
        let fragment = compile(device, ShaderStage::Fragment, fragment_source)?;
        let uniforms = UniformTable::from_sources([vertex_source, fragment_source]);
        tracing::info!(uniforms = uniforms.len(), "shader program ready");
        Ok(Self {
            vertex,
            fragment,
            uniforms,
        })
    }

    pub fn uniform_location(&self, name: &str) -> Option<UniformLocation> {
        self.uniforms.location(name)
    }

    pub fn vertex_module(&self) -> &wgpu::ShaderModule {
        &self.vertex
    }

    pub fn fragment_module(&self) -> &wgpu::ShaderModule {
        &self.fragment
    }
}

fn compile(
    device: &wgpu::Device,
    stage: ShaderStage,
    source: &str,
) -> Result<wgpu::ShaderModule, ShaderError> {
    let (module, scope_error) = scoped(device, wgpu::ErrorFilter::Validation, || {
        device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some(stage.label()),
            source: wgpu::ShaderSource::Wgsl(source.into()),
        })
    });
    let info = pollster::block_on(module.get_compilation_info());

    let mut log = String::new();
    let mut failed = false;
    for message in &info.messages {
        let line = match &message.location {
            Some(loc) => format!(
                "{}:{}: {}",
                loc.line_number, loc.line_position, message.message
            ),
            None => message.message.clone(),
        };
        match message.message_type {
            wgpu::CompilationMessageType::Error => {
                failed = true;
                tracing::error!(%stage, "{line}");
            }
            wgpu::CompilationMessageType::Warning => tracing::warn!(%stage, "{line}"),
            _ => tracing::info!(%stage, "{line}"),
        }
        log.push_str(&line);
        log.push('\n');
    }

    if let Some(e) = scope_error {
        failed = true;
        // The validation error repeats the compiler message when one exists.
        if info.messages.is_empty() {
            tracing::error!(%stage, "{e}");
            log.push_str(&e.to_string());
        }
    }

    if failed {
        return Err(ShaderError::Compile { stage, log });
    }
    tracing::debug!(%stage, "shader compiled");
    Ok(module)
}
