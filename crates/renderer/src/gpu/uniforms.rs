use bytemuck::{Pod, Zeroable};

use crate::driver::BlurDraw;

/// CPU mirror of the `BlurParams` block shared by both shader stages (std140).
#[repr(C)]
#[derive(Clone, Copy, Debug, Pod, Zeroable)]
pub(crate) struct BlurUniforms {
    pub vertex_matrix: [f32; 16],
    pub texture_matrix: [f32; 16],
    pub radius: [f32; 2],
    _padding: [f32; 2],
}

impl BlurUniforms {
    pub(crate) fn from_draw(draw: &BlurDraw) -> Self {
        Self {
            vertex_matrix: draw.vertex_transform,
            texture_matrix: draw.texture_transform,
            radius: draw.radius.as_array(),
            _padding: [0.0; 2],
        }
    }
}
