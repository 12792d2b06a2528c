use winit::dpi::PhysicalSize;

use crate::types::OFFSCREEN_SIZE;

/// Fixed-size drawable used whenever no window surface is bound.
pub(crate) struct OffscreenSurface {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub format: wgpu::TextureFormat,
}

impl OffscreenSurface {
    pub(crate) fn new(device: &wgpu::Device, format: wgpu::TextureFormat) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("offscreen drawable"),
            size: wgpu::Extent3d {
                width: OFFSCREEN_SIZE,
                height: OFFSCREEN_SIZE,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            texture,
            view,
            format,
        }
    }

    pub(crate) fn size(&self) -> PhysicalSize<u32> {
        let extent = self.texture.size();
        PhysicalSize::new(extent.width, extent.height)
    }
}
