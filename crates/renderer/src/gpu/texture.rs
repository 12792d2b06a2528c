use wgpu::util::{DeviceExt, TextureDataOrder};

use crate::error::RenderError;
use crate::frames::VideoFrame;
use crate::types::{FrameFormat, FrameSampling};

/// GPU half of the external frame texture: the streaming texture the blur
/// pass samples plus its bind group.
///
/// Starts as a 1×1 transparent texel so draws before the first frame are
/// well-defined. The texture is recreated whenever the frame dimensions change.
pub(crate) struct FrameTexture {
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    sampler: wgpu::Sampler,
    layout: wgpu::BindGroupLayout,
    bind_group: wgpu::BindGroup,
    format: FrameFormat,
    width: u32,
    height: u32,
}

impl FrameTexture {
    pub(crate) fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        format: FrameFormat,
        sampling: FrameSampling,
    ) -> Self {
        let layout = create_layout(device, sampling);
        let filter = match sampling {
            FrameSampling::Filtered => wgpu::FilterMode::Linear,
            FrameSampling::Nearest => wgpu::FilterMode::Nearest,
        };
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("frame sampler"),
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: filter,
            min_filter: filter,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let placeholder = vec![0u8; format.bytes_per_pixel() as usize];
        let texture = device.create_texture_with_data(
            queue,
            &texture_descriptor(format, 1, 1),
            TextureDataOrder::LayerMajor,
            &placeholder,
        );
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        let bind_group = create_bind_group(device, &layout, &view, &sampler);

        Self {
            texture,
            view,
            sampler,
            layout,
            bind_group,
            format,
            width: 1,
            height: 1,
        }
    }

    pub(crate) fn layout(&self) -> &wgpu::BindGroupLayout {
        &self.layout
    }

    pub(crate) fn bind_group(&self) -> &wgpu::BindGroup {
        &self.bind_group
    }

    /// Copies `frame` into the texture, resizing it first if needed.
    pub(crate) fn upload(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        frame: &VideoFrame,
    ) -> Result<(), RenderError> {
        frame.validate(self.format)?;
        let max = device.limits().max_texture_dimension_2d;
        if frame.width > max || frame.height > max {
            return Err(RenderError::FrameTooLarge {
                width: frame.width,
                height: frame.height,
                max,
            });
        }

        if frame.width != self.width || frame.height != self.height {
            tracing::debug!(
                width = frame.width,
                height = frame.height,
                "resizing frame texture"
            );
            self.texture = device.create_texture(&texture_descriptor(
                self.format,
                frame.width,
                frame.height,
            ));
            self.view = self
                .texture
                .create_view(&wgpu::TextureViewDescriptor::default());
            self.bind_group = create_bind_group(device, &self.layout, &self.view, &self.sampler);
            self.width = frame.width;
            self.height = frame.height;
        }

        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            &frame.data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(frame.stride),
                rows_per_image: Some(frame.height),
            },
            wgpu::Extent3d {
                width: frame.width,
                height: frame.height,
                depth_or_array_layers: 1,
            },
        );
        Ok(())
    }
}

fn texture_descriptor(
    format: FrameFormat,
    width: u32,
    height: u32,
) -> wgpu::TextureDescriptor<'static> {
    wgpu::TextureDescriptor {
        label: Some("external frame texture"),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: format.texture_format(),
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        view_formats: &[],
    }
}

fn create_layout(device: &wgpu::Device, sampling: FrameSampling) -> wgpu::BindGroupLayout {
    let filterable = sampling == FrameSampling::Filtered;
    device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
        label: Some("frame texture layout"),
        entries: &[
            wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Texture {
                    sample_type: wgpu::TextureSampleType::Float { filterable },
                    view_dimension: wgpu::TextureViewDimension::D2,
                    multisampled: false,
                },
                count: None,
            },
            wgpu::BindGroupLayoutEntry {
                binding: 1,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Sampler(if filterable {
                    wgpu::SamplerBindingType::Filtering
                } else {
                    wgpu::SamplerBindingType::NonFiltering
                }),
                count: None,
            },
        ],
    })
}

fn create_bind_group(
    device: &wgpu::Device,
    layout: &wgpu::BindGroupLayout,
    view: &wgpu::TextureView,
    sampler: &wgpu::Sampler,
) -> wgpu::BindGroup {
    device.create_bind_group(&wgpu::BindGroupDescriptor {
        label: Some("frame texture bind group"),
        layout,
        entries: &[
            wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::TextureView(view),
            },
            wgpu::BindGroupEntry {
                binding: 1,
                resource: wgpu::BindingResource::Sampler(sampler),
            },
        ],
    })
}
