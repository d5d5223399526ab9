use crate::error::{RenderError, scoped};
use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, Pod, Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
}

impl Vertex {
    const ATTRIBUTES: [wgpu::VertexAttribute; 2] = wgpu::vertex_attr_array![
        0 => Float32x3,
        1 => Float32x3,
    ];

    pub fn layout() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<Vertex>() as u64,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBUTES,
        }
    }
}

/// CPU-side geometry waiting to be uploaded.
#[derive(Debug, Clone, Default)]
pub struct MeshData {
    pub vertices: Vec<Vertex>,
    pub indices: Vec<u16>,
}

impl MeshData {
    /// Unit cube centred on the origin, 4 vertices per face so each face
    /// carries its own normal.
    pub fn cube() -> Self {
        let p = 0.5_f32;
        let faces: [([f32; 3], [[f32; 3]; 4]); 6] = [
            ([0.0, 0.0, 1.0], [[-p, -p, p], [p, -p, p], [p, p, p], [-p, p, p]]),
            ([0.0, 0.0, -1.0], [[p, -p, -p], [-p, -p, -p], [-p, p, -p], [p, p, -p]]),
            ([1.0, 0.0, 0.0], [[p, -p, p], [p, -p, -p], [p, p, -p], [p, p, p]]),
            ([-1.0, 0.0, 0.0], [[-p, -p, -p], [-p, -p, p], [-p, p, p], [-p, p, -p]]),
            ([0.0, 1.0, 0.0], [[-p, p, p], [p, p, p], [p, p, -p], [-p, p, -p]]),
            ([0.0, -1.0, 0.0], [[-p, -p, -p], [p, -p, -p], [p, -p, p], [-p, -p, p]]),
        ];

        let mut vertices = Vec::with_capacity(24);
        let mut indices = Vec::with_capacity(36);
        for (normal, corners) in faces {
            let base = vertices.len() as u16;
            vertices.extend(corners.map(|position| Vertex { position, normal }));
            indices.extend([0, 1, 2, 2, 3, 0].map(|i| base + i));
        }
        Self { vertices, indices }
    }

    pub fn index_count(&self) -> u32 {
        self.indices.len() as u32
    }

    fn validate(&self) -> Result<(), RenderError> {
        if self.indices.is_empty() {
            return Err(RenderError::EmptyMesh);
        }
        let vertex_count = self.vertices.len();
        match self.indices.iter().find(|&&i| i as usize >= vertex_count) {
            Some(&index) => Err(RenderError::IndexOutOfRange {
                index,
                vertex_count,
            }),
            None => Ok(()),
        }
    }
}

/// An uploaded vertex + index buffer pair.
///
/// The buffers are destroyed when the mesh is dropped.
#[derive(Debug)]
pub struct Mesh {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    index_count: u32,
}

impl Mesh {
    pub fn create(
        device: &wgpu::Device,
        vertices: &[Vertex],
        indices: &[u16],
    ) -> Result<Self, RenderError> {
        Self::upload(
            device,
            &MeshData {
                vertices: vertices.to_vec(),
                indices: indices.to_vec(),
            },
        )
    }

    pub fn upload(device: &wgpu::Device, data: &MeshData) -> Result<Self, RenderError> {
        data.validate()?;

        let ((vertex_buffer, index_buffer), error) =
            scoped(device, wgpu::ErrorFilter::OutOfMemory, || {
                let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("cube_vertex_buffer"),
                    contents: bytemuck::cast_slice(&data.vertices),
                    usage: wgpu::BufferUsages::VERTEX,
                });
                let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                    label: Some("cube_index_buffer"),
                    contents: bytemuck::cast_slice(&data.indices),
                    usage: wgpu::BufferUsages::INDEX,
                });
                (vertex_buffer, index_buffer)
            });
        if let Some(e) = error {
            return Err(RenderError::Allocation {
                what: "mesh buffers",
                message: e.to_string(),
            });
        }

        tracing::debug!(
            vertices = data.vertices.len(),
            indices = data.indices.len(),
            "mesh uploaded"
        );
        Ok(Self {
            vertex_buffer,
            index_buffer,
            index_count: data.index_count(),
        })
    }

    pub fn index_count(&self) -> u32 {
        self.index_count
    }

    /// Bind this mesh's vertex and index buffers on the pass.
    pub fn bind(&self, pass: &mut wgpu::RenderPass<'_>) {
        pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
        pass.set_index_buffer(self.index_buffer.slice(..), wgpu::IndexFormat::Uint16);
    }

    /// Issue one indexed draw with whatever buffers are currently bound.
    pub fn draw(&self, pass: &mut wgpu::RenderPass<'_>) {
        pass.draw_indexed(0..self.index_count, 0, 0..1);
    }
}

impl Drop for Mesh {
    fn drop(&mut self) {
        self.vertex_buffer.destroy();
        self.index_buffer.destroy();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cube_has_six_quads() {
        let cube = MeshData::cube();
        assert_eq!(cube.vertices.len(), 24);
        assert_eq!(cube.index_count(), 36);
        assert!(cube.validate().is_ok());
    }

    #[test]
    fn cube_faces_wind_outward() {
        let cube = MeshData::cube();
        for tri in cube.indices.chunks(3) {
            let [a, b, c] = [tri[0], tri[1], tri[2]].map(|i| {
                glam::Vec3::from(cube.vertices[i as usize].position)
            });
            let n = glam::Vec3::from(cube.vertices[tri[0] as usize].normal);
            // Counter-clockwise when seen from outside.
            assert!((b - a).cross(c - a).dot(n) > 0.0);
        }
    }

    #[test]
    fn empty_indices_rejected() {
        let data = MeshData {
            vertices: MeshData::cube().vertices,
            indices: Vec::new(),
        };
        assert!(matches!(data.validate(), Err(RenderError::EmptyMesh)));
    }

    #[test]
    fn out_of_range_index_rejected() {
        let data = MeshData {
            vertices: vec![Vertex::zeroed(); 3],
            indices: vec![0, 1, 3],
        };
        assert!(matches!(
            data.validate(),
            Err(RenderError::IndexOutOfRange {
                index: 3,
                vertex_count: 3
            })
        ));
    }

    #[test]
    fn vertex_layout_matches_struct() {
        let layout = Vertex::layout();
        assert_eq!(layout.array_stride, 24);
        assert_eq!(layout.attributes.len(), 2);
        assert_eq!(layout.attributes[1].offset, 12);
    }
}
