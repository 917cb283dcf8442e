//! The textured quad and its GPU buffers.

use std::sync::Arc;

use glam::{Vec2, Vec3};
use tracing::debug;

use texquad_rhi::RhiResult;
use texquad_rhi::buffer::{Buffer, BufferUsage};
use texquad_rhi::command::CommandPool;
use texquad_rhi::device::Device;
use texquad_rhi::vertex::Vertex;
use texquad_rhi::vk;

/// Unit quad in the XY plane, counter-clockwise from the bottom-left corner.
pub const QUAD_VERTICES: [Vertex; 4] = [
    Vertex::new(
        Vec3::new(-0.5, -0.5, 0.0),
        Vec3::new(1.0, 0.0, 0.0),
        Vec2::new(1.0, 0.0),
    ),
    Vertex::new(
        Vec3::new(0.5, -0.5, 0.0),
        Vec3::new(0.0, 1.0, 0.0),
        Vec2::new(0.0, 0.0),
    ),
    Vertex::new(
        Vec3::new(0.5, 0.5, 0.0),
        Vec3::new(0.0, 0.0, 1.0),
        Vec2::new(0.0, 1.0),
    ),
    Vertex::new(
        Vec3::new(-0.5, 0.5, 0.0),
        Vec3::new(1.0, 1.0, 1.0),
        Vec2::new(1.0, 1.0),
    ),
];

pub const QUAD_INDICES: [u32; 6] = [0, 1, 2, 2, 3, 0];

/// Device-local vertex and index buffers for [`QUAD_VERTICES`].
pub struct QuadMesh {
    vertex_buffer: Buffer,
    index_buffer: Buffer,
}

impl QuadMesh {
    /// Uploads the quad through staging buffers.
    ///
    /// # Errors
    ///
    /// Returns an error if buffer creation or the upload fails.
    pub fn upload(device: Arc<Device>, pool: &CommandPool) -> RhiResult<Self> {
        let vertex_buffer = Buffer::device_local_with_data(
            device.clone(),
            pool,
            BufferUsage::Vertex,
            bytemuck::cast_slice(&QUAD_VERTICES),
        )?;
        let index_buffer = Buffer::device_local_with_data(
            device,
            pool,
            BufferUsage::Index,
            bytemuck::cast_slice(&QUAD_INDICES),
        )?;

        debug!(
            "Uploaded quad: {} vertices, {} indices",
            QUAD_VERTICES.len(),
            QUAD_INDICES.len()
        );

        Ok(Self {
            vertex_buffer,
            index_buffer,
        })
    }

    #[inline]
    pub fn vertex_buffer(&self) -> vk::Buffer {
        self.vertex_buffer.handle()
    }

    #[inline]
    pub fn index_buffer(&self) -> vk::Buffer {
        self.index_buffer.handle()
    }

    #[inline]
    pub fn index_count(&self) -> u32 {
        QUAD_INDICES.len() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_indices_reference_existing_vertices() {
        assert!(
            QUAD_INDICES
                .iter()
                .all(|&i| (i as usize) < QUAD_VERTICES.len())
        );
    }

    #[test]
    fn test_triangles_are_counter_clockwise() {
        for tri in QUAD_INDICES.chunks_exact(3) {
            let a = QUAD_VERTICES[tri[0] as usize].position;
            let b = QUAD_VERTICES[tri[1] as usize].position;
            let c = QUAD_VERTICES[tri[2] as usize].position;
            // Positive Z of the cross product means CCW seen from +Z
            assert!((b - a).cross(c - a).z > 0.0);
        }
    }

    #[test]
    fn test_corner_attributes() {
        assert_eq!(QUAD_VERTICES[0].color, Vec3::new(1.0, 0.0, 0.0));
        assert_eq!(QUAD_VERTICES[0].tex_coord, Vec2::new(1.0, 0.0));
        assert_eq!(QUAD_VERTICES[3].color, Vec3::ONE);
        assert_eq!(
            bytemuck::cast_slice::<Vertex, u8>(&QUAD_VERTICES).len(),
            4 * 32
        );
    }
}
