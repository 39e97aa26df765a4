/// GraphicsDevice trait - the slice of the renderer the scene flow consumes
///
/// The scene flow never creates framebuffers or submits geometry itself.
/// It only asks for the color texture behind a framebuffer, and lets
/// transition effects allocate programs/uniforms and draw full-screen quads.

use glam::{UVec2, Vec4};
use slotmap::new_key_type;
use smallvec::SmallVec;
use crate::error::Result;

// ===== HANDLES =====

new_key_type! {
    /// Opaque framebuffer handle minted by the graphics device
    pub struct FrameBufferHandle;

    /// Opaque texture handle minted by the graphics device
    pub struct TextureHandle;

    /// Opaque GPU program handle
    pub struct ProgramHandle;

    /// Opaque shader uniform handle
    pub struct UniformHandle;
}

/// View index on the renderer (draw cursor).
///
/// Incremented once per drawn scene per frame and threaded through to
/// transition effects so they submit after every scene draw.
pub type ViewId = u16;

/// A framebuffer together with its color texture
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderPair {
    pub frame_buffer: FrameBufferHandle,
    pub texture: TextureHandle,
}

impl RenderPair {
    pub fn new(frame_buffer: FrameBufferHandle, texture: TextureHandle) -> Self {
        Self { frame_buffer, texture }
    }

    /// Whether both handles are bound (the default pair is unbound)
    pub fn is_bound(&self) -> bool {
        use slotmap::Key;
        !self.frame_buffer.is_null() && !self.texture.is_null()
    }
}

// ===== DESCRIPTORS =====

/// Uniform value type
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniformType {
    /// Texture sampler slot
    Sampler,
    /// Four floats
    Vec4,
}

/// Shader program descriptor (WGSL sources)
#[derive(Debug, Clone)]
pub struct ProgramDesc {
    /// Debug label
    pub label: String,
    pub vertex_source: &'static str,
    pub fragment_source: &'static str,
}

/// Blend state for a draw
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendMode {
    /// Write RGBA, no blending
    Opaque,
    /// Standard src-alpha / one-minus-src-alpha blending
    Alpha,
}

/// One full-screen quad submission
#[derive(Debug, Clone)]
pub struct FullscreenQuad {
    pub view_id: ViewId,
    /// Framebuffer to render into
    pub target: FrameBufferHandle,
    /// Viewport size in pixels
    pub viewport: UVec2,
    pub program: ProgramHandle,
    pub blend: BlendMode,
    /// Sampler uniform and the texture bound to it
    pub texture: Option<(UniformHandle, TextureHandle)>,
    /// Vec4 uniform values set before the draw
    pub uniforms: SmallVec<[(UniformHandle, Vec4); 4]>,
}

// ===== DEVICE TRAIT =====

/// Graphics device consumed by the scene flow
///
/// Implemented by the host's render backend. Shared with the scene
/// manager as `Arc<Mutex<dyn GraphicsDevice>>`.
pub trait GraphicsDevice: Send {
    /// Color texture of a framebuffer attachment, if the framebuffer exists
    fn frame_buffer_texture(
        &self,
        frame_buffer: FrameBufferHandle,
        attachment: u32,
    ) -> Option<TextureHandle>;

    /// Compile and link a program
    fn create_program(&mut self, desc: &ProgramDesc) -> Result<ProgramHandle>;

    fn destroy_program(&mut self, program: ProgramHandle);

    /// Create a named uniform
    fn create_uniform(&mut self, name: &str, uniform_type: UniformType) -> Result<UniformHandle>;

    fn destroy_uniform(&mut self, uniform: UniformHandle);

    /// Submit a full-screen quad
    fn draw_fullscreen_quad(&mut self, quad: &FullscreenQuad);
}
