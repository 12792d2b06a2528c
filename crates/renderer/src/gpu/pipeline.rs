use std::collections::HashMap;

use wgpu::naga::ShaderStage;
use wgpu::util::DeviceExt;
use winit::dpi::PhysicalSize;

use crate::compile::{compile_shader, fragment_source, VERTEX_SHADER};
use crate::driver::BlurDraw;
use crate::error::RenderError;
use crate::types::FrameSampling;

use super::texture::FrameTexture;
use super::uniforms::BlurUniforms;

const QUAD_POSITIONS: [[f32; 3]; 4] = [
    [-1.0, -1.0, 0.0],
    [1.0, -1.0, 0.0],
    [-1.0, 1.0, 0.0],
    [1.0, 1.0, 0.0],
];

const QUAD_TEXCOORDS: [[f32; 2]; 4] = [[0.0, 1.0], [1.0, 1.0], [0.0, 0.0], [1.0, 0.0]];

const QUAD_TEXCOORDS_FLIPPED: [[f32; 2]; 4] = [[0.0, 0.0], [1.0, 0.0], [0.0, 1.0], [1.0, 1.0]];

const POSITION_ATTRIBUTES: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x3];
const TEXCOORD_ATTRIBUTES: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![1 => Float32x2];

/// Compiled blur program with its uniform and vertex buffers.
///
/// Render pipelines are built per target format on first use, since window
/// surfaces may pick a format other than the offscreen one.
pub(crate) struct BlurProgram {
    vertex_module: wgpu::ShaderModule,
    fragment_module: wgpu::ShaderModule,
    pipeline_layout: wgpu::PipelineLayout,
    uniform_buffer: wgpu::Buffer,
    uniform_bind_group: wgpu::BindGroup,
    positions: wgpu::Buffer,
    texcoords: wgpu::Buffer,
    texcoords_flipped: wgpu::Buffer,
    pipelines: HashMap<wgpu::TextureFormat, wgpu::RenderPipeline>,
}

impl BlurProgram {
    pub(crate) fn compile(
        device: &wgpu::Device,
        frame_texture: &FrameTexture,
        sampling: FrameSampling,
        color_format: wgpu::TextureFormat,
    ) -> Result<Self, RenderError> {
        let vertex_module = compile_shader(device, "blur vertex", VERTEX_SHADER, ShaderStage::Vertex)?;
        let fragment_module = compile_shader(
            device,
            "blur fragment",
            fragment_source(sampling),
            ShaderStage::Fragment,
        )?;

        let uniform_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("blur uniform layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: wgpu::BufferSize::new(
                        std::mem::size_of::<BlurUniforms>() as u64,
                    ),
                },
                count: None,
            }],
        });
        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("blur uniforms"),
            size: std::mem::size_of::<BlurUniforms>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let uniform_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("blur uniform bind group"),
            layout: &uniform_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("blur pipeline layout"),
            bind_group_layouts: &[&uniform_layout, frame_texture.layout()],
            push_constant_ranges: &[],
        });

        let vertex_buffer = |label, contents: &[u8]| {
            device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some(label),
                contents,
                usage: wgpu::BufferUsages::VERTEX,
            })
        };
        let positions = vertex_buffer("quad positions", bytemuck::cast_slice(&QUAD_POSITIONS));
        let texcoords = vertex_buffer("quad texcoords", bytemuck::cast_slice(&QUAD_TEXCOORDS));
        let texcoords_flipped = vertex_buffer(
            "quad texcoords flipped",
            bytemuck::cast_slice(&QUAD_TEXCOORDS_FLIPPED),
        );

        let mut program = Self {
            vertex_module,
            fragment_module,
            pipeline_layout,
            uniform_buffer,
            uniform_bind_group,
            positions,
            texcoords,
            texcoords_flipped,
            pipelines: HashMap::new(),
        };
        program.pipeline_for(device, color_format)?;
        Ok(program)
    }

    /// Returns the pipeline targeting `format`, building it on first use.
    pub(crate) fn pipeline_for(
        &mut self,
        device: &wgpu::Device,
        format: wgpu::TextureFormat,
    ) -> Result<wgpu::RenderPipeline, RenderError> {
        if let Some(pipeline) = self.pipelines.get(&format) {
            return Ok(pipeline.clone());
        }

        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("blur pipeline"),
            layout: Some(&self.pipeline_layout),
            vertex: wgpu::VertexState {
                module: &self.vertex_module,
                entry_point: Some("main"),
                buffers: &[
                    wgpu::VertexBufferLayout {
                        array_stride: std::mem::size_of::<[f32; 3]>() as u64,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &POSITION_ATTRIBUTES,
                    },
                    wgpu::VertexBufferLayout {
                        array_stride: std::mem::size_of::<[f32; 2]>() as u64,
                        step_mode: wgpu::VertexStepMode::Vertex,
                        attributes: &TEXCOORD_ATTRIBUTES,
                    },
                ],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            },
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleStrip,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            fragment: Some(wgpu::FragmentState {
                module: &self.fragment_module,
                entry_point: Some("main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: None,
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: wgpu::PipelineCompilationOptions::default(),
            }),
            multiview: None,
            cache: None,
        });
        if let Some(error) = pollster::block_on(device.pop_error_scope()) {
            return Err(RenderError::ShaderCompile {
                stage: "link",
                log: error.to_string(),
            });
        }

        tracing::debug!(?format, "built blur pipeline");
        self.pipelines.insert(format, pipeline.clone());
        Ok(pipeline)
    }

    /// Records one full-screen blur pass into `encoder`.
    ///
    /// Everything is bound inside the pass, so nothing stays bound afterwards.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn draw(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        encoder: &mut wgpu::CommandEncoder,
        target: &wgpu::TextureView,
        format: wgpu::TextureFormat,
        size: PhysicalSize<u32>,
        frame_texture: &FrameTexture,
        draw: &BlurDraw,
    ) -> Result<(), RenderError> {
        let pipeline = self.pipeline_for(device, format)?;
        queue.write_buffer(
            &self.uniform_buffer,
            0,
            bytemuck::bytes_of(&BlurUniforms::from_draw(draw)),
        );
        let texcoords = if draw.flip_vertical {
            &self.texcoords_flipped
        } else {
            &self.texcoords
        };

        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("blur pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
                depth_slice: None,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        pass.set_viewport(0.0, 0.0, size.width as f32, size.height as f32, 0.0, 1.0);
        pass.set_pipeline(&pipeline);
        pass.set_bind_group(0, &self.uniform_bind_group, &[]);
        pass.set_bind_group(1, frame_texture.bind_group(), &[]);
        pass.set_vertex_buffer(0, self.positions.slice(..));
        pass.set_vertex_buffer(1, texcoords.slice(..));
        pass.draw(0..QUAD_POSITIONS.len() as u32, 0..1);
        Ok(())
    }
}
