use crate::error::{RenderError, scoped};
use crate::mesh::{Mesh, Vertex};
use crate::shader::Shader;
use cubefield_scene::{InstanceField, OrbitCamera};
use glam::Mat4;

/// Name of the per-draw matrix uniform the vertex stage must declare.
pub const MVP_UNIFORM: &str = "mvp";

const MVP_SIZE: u64 = std::mem::size_of::<[[f32; 4]; 4]>() as u64;
const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;

/// Draws every instance of one mesh with a separate bind + draw call.
///
/// Each instance owns a slot in a single uniform buffer, spaced by the
/// device's dynamic offset alignment. A frame writes all slots once and
/// then rebinds the bind group at each slot's offset before drawing.
pub struct CubeRenderer {
    pipeline: wgpu::RenderPipeline,
    mesh: Mesh,
    _shader: Shader,
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    /// Empty groups bound below the MVP group, when it is not group 0.
    filler_bind_groups: Vec<wgpu::BindGroup>,
    mvp_group: u32,
    uniform_stride: u64,
    instance_count: u32,
    staging: Vec<u8>,
    depth_texture: wgpu::TextureView,
    clear_color: wgpu::Color,
}

impl CubeRenderer {
    pub fn new(
        device: &wgpu::Device,
        surface_format: wgpu::TextureFormat,
        width: u32,
        height: u32,
        mesh: Mesh,
        shader: Shader,
        instance_count: usize,
    ) -> Result<Self, RenderError> {
        let location = shader
            .uniform_location(MVP_UNIFORM)
            .ok_or_else(|| RenderError::UnresolvedUniform(MVP_UNIFORM.into()))?;

        let limits = device.limits();
        let uniform_stride =
            MVP_SIZE.next_multiple_of(u64::from(limits.min_uniform_buffer_offset_alignment));
        let max = max_instances(uniform_stride, limits.max_buffer_size);
        if instance_count > max {
            return Err(RenderError::TooManyInstances {
                count: instance_count,
                max,
            });
        }
        let buffer_size = uniform_stride * instance_count.max(1) as u64;

        let (uniform_buffer, error) = scoped(device, wgpu::ErrorFilter::OutOfMemory, || {
            device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("mvp_uniform_buffer"),
                size: buffer_size,
                usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            })
        });
        if let Some(e) = error {
            return Err(RenderError::Allocation {
                what: "per-instance uniform buffer",
                message: e.to_string(),
            });
        }

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("mvp_bind_group_layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: location.binding,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: wgpu::BufferSize::new(MVP_SIZE),
                },
                count: None,
            }],
        });

        let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("mvp_bind_group"),
            layout: &bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: location.binding,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &uniform_buffer,
                    offset: 0,
                    size: wgpu::BufferSize::new(MVP_SIZE),
                }),
            }],
        });

        let empty_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("empty_bind_group_layout"),
            entries: &[],
        });
        let filler_bind_groups = (0..location.group)
            .map(|_| {
                device.create_bind_group(&wgpu::BindGroupDescriptor {
                    label: Some("empty_bind_group"),
                    layout: &empty_layout,
                    entries: &[],
                })
            })
            .collect();
        let mut layouts: Vec<&wgpu::BindGroupLayout> =
            vec![&empty_layout; location.group as usize];
        layouts.push(&bind_group_layout);

        let (pipeline, error) = scoped(device, wgpu::ErrorFilter::Validation, || {
            let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
                label: Some("cube_pipeline_layout"),
                bind_group_layouts: &layouts,
                push_constant_ranges: &[],
            });
            device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("cube_pipeline"),
                layout: Some(&pipeline_layout),
                vertex: wgpu::VertexState {
                    module: shader.vertex_module(),
                    entry_point: Some(Shader::VERTEX_ENTRY),
                    compilation_options: Default::default(),
                    buffers: &[Vertex::layout()],
                },
                fragment: Some(wgpu::FragmentState {
                    module: shader.fragment_module(),
                    entry_point: Some(Shader::FRAGMENT_ENTRY),
                    compilation_options: Default::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: surface_format,
                        blend: Some(wgpu::BlendState::REPLACE),
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                primitive: wgpu::PrimitiveState {
                    topology: wgpu::PrimitiveTopology::TriangleList,
                    cull_mode: Some(wgpu::Face::Back),
                    ..Default::default()
                },
                depth_stencil: Some(wgpu::DepthStencilState {
                    format: DEPTH_FORMAT,
                    depth_write_enabled: true,
                    depth_compare: wgpu::CompareFunction::Less,
                    stencil: Default::default(),
                    bias: Default::default(),
                }),
                multisample: Default::default(),
                multiview: None,
                cache: None,
            })
        });
        if let Some(e) = error {
            return Err(RenderError::Pipeline(e.to_string()));
        }

        let instance_count = instance_count as u32;
        tracing::info!(
            instances = instance_count,
            stride = uniform_stride,
            bytes = buffer_size,
            "per-instance uniform buffer allocated"
        );

        Ok(Self {
            pipeline,
            mesh,
            _shader: shader,
            uniform_buffer,
            uniform_bind_group,
            filler_bind_groups,
            mvp_group: location.group,
            uniform_stride,
            instance_count,
            staging: vec![0; buffer_size as usize],
            depth_texture: Self::create_depth_texture(device, width, height),
            clear_color: wgpu::Color {
                r: 0.1,
                g: 0.1,
                b: 0.15,
                a: 1.0,
            },
        })
    }

    pub fn with_clear_color(mut self, rgba: [f64; 4]) -> Self {
        let [r, g, b, a] = rgba;
        self.clear_color = wgpu::Color { r, g, b, a };
        self
    }

    pub fn resize(&mut self, device: &wgpu::Device, width: u32, height: u32) {
        self.depth_texture = Self::create_depth_texture(device, width, height);
    }

    pub fn instance_count(&self) -> u32 {
        self.instance_count
    }

    /// Render one frame: clear, then one draw per instance. Returns the
    /// number of draw calls issued. The field must hold exactly as many
    /// transforms as the renderer was built for; nothing is drawn otherwise.
    pub fn render(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        view: &wgpu::TextureView,
        camera: &OrbitCamera,
        field: &InstanceField,
    ) -> Result<u32, RenderError> {
        let draws = draw_count(self.instance_count, field.len())?;
        write_mvps(
            &mut self.staging,
            self.uniform_stride as usize,
            &camera.view_projection(),
            &field.transforms()[..draws],
        );
        queue.write_buffer(&self.uniform_buffer, 0, &self.staging);

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("render_encoder"),
        });

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("cube_pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(self.clear_color),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &self.depth_texture,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                ..Default::default()
            });

            pass.set_pipeline(&self.pipeline);
            for (group, filler) in self.filler_bind_groups.iter().enumerate() {
                pass.set_bind_group(group as u32, filler, &[]);
            }
            self.mesh.bind(&mut pass);
            for i in 0..draws {
                let offset = (i as u64 * self.uniform_stride) as u32;
                pass.set_bind_group(self.mvp_group, &self.uniform_bind_group, &[offset]);
                self.mesh.draw(&mut pass);
            }
        }

        queue.submit(std::iter::once(encoder.finish()));
        Ok(draws as u32)
    }

    fn create_depth_texture(
        device: &wgpu::Device,
        width: u32,
        height: u32,
    ) -> wgpu::TextureView {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("depth_texture"),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            view_formats: &[],
        });
        texture.create_view(&Default::default())
    }
}

/// Largest instance count whose uniform slots fit in one buffer and whose
/// last slot offset still fits a 32-bit dynamic offset.
fn max_instances(stride: u64, max_buffer_size: u64) -> usize {
    let by_buffer = max_buffer_size / stride;
    let by_offset = u64::from(u32::MAX) / stride + 1;
    by_buffer.min(by_offset) as usize
}

fn draw_count(expected: u32, actual: usize) -> Result<usize, RenderError> {
    if actual != expected as usize {
        return Err(RenderError::InstanceCountMismatch {
            expected: expected as usize,
            actual,
        });
    }
    Ok(actual)
}

/// Fill one slot per model with `view_proj * model`, column-major.
fn write_mvps(staging: &mut [u8], stride: usize, view_proj: &Mat4, models: &[Mat4]) {
    for (slot, model) in staging.chunks_exact_mut(stride).zip(models) {
        let mvp = (*view_proj * *model).to_cols_array();
        slot[..MVP_SIZE as usize].copy_from_slice(bytemuck::cast_slice(&mvp));
    }
}
