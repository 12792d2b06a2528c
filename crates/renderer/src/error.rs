/// Failures surfaced by the frame pipeline.
///
/// `ContextCreation` and `ShaderCompile` are fatal and abort construction.
/// `SurfaceBind` leaves the pipeline without a window surface; frames are
/// dropped until the host reports a new surface. Dropping a frame because no
/// surface is bound is not an error and never produces one of these.
#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("no compatible GPU configuration: {0}")]
    ContextCreation(String),
    #[error("failed to compile {stage} shader:\n{log}")]
    ShaderCompile { stage: &'static str, log: String },
    #[error("failed to bind window surface: {0}")]
    SurfaceBind(String),
    #[error("surface error: {0}")]
    Surface(#[from] wgpu::SurfaceError),
    #[error("frame {width}x{height} carries {actual} bytes, expected at least {expected}")]
    FrameSize {
        width: u32,
        height: u32,
        expected: usize,
        actual: usize,
    },
    #[error("frame {width}x{height} exceeds the device texture limit of {max}")]
    FrameTooLarge { width: u32, height: u32, max: u32 },
    #[error("no frame in progress on the current drawable")]
    FrameNotStarted,
    #[error("GPU context has been released")]
    ContextReleased,
    #[error("frame texture has been released")]
    TextureReleased,
    #[error("render thread is not running")]
    Disconnected,
}

impl RenderError {
    /// Errors after which the pipeline cannot continue.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            RenderError::ContextCreation(_) | RenderError::ShaderCompile { .. }
        )
    }
}
