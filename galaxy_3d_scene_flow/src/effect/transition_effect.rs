/// TransitionEffect trait - a visual effect played during a scene link
///
/// Lifecycle: `create` once when registered, then any number of
/// `begin` / `render`* / `end` runs, and `destroy` when the owning manager
/// goes away (or its graphics are torn down).

use glam::UVec2;
use crate::graphics_device::{GraphicsDevice, FrameBufferHandle, TextureHandle, ViewId};

/// Largest parameter block an effect may declare, in bytes
pub const MAX_EFFECT_PARAM_SIZE: usize = 128;

/// Inputs of one effect render call
#[derive(Debug, Clone, Copy)]
pub struct EffectPass {
    /// Frame delta time in seconds
    pub dt: f32,
    /// View to submit on (after every scene draw of the frame)
    pub view_id: ViewId,
    /// Framebuffer to render into
    pub target: FrameBufferHandle,
    /// Texture holding what the scenes drew
    pub source: TextureHandle,
    pub render_size: UVec2,
}

pub trait TransitionEffect {
    /// Allocate device resources. Returning false rejects the registration.
    fn create(&mut self, device: &mut dyn GraphicsDevice) -> bool;

    /// Release device resources
    fn destroy(&mut self, device: &mut dyn GraphicsDevice);

    /// Start a run
    ///
    /// `params` holds the bytes given to the link, truncated to the
    /// declared parameter size. It is empty for effects without parameters
    /// and implementations must accept that.
    fn begin(&mut self, params: &[u8], view_id: ViewId);

    /// Advance and draw one frame of the effect
    fn render(&mut self, device: &mut dyn GraphicsDevice, pass: &EffectPass);

    /// Finish a run
    fn end(&mut self);

    fn is_done(&self) -> bool;
}
