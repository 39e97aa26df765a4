/// Mock GraphicsDevice for unit tests (no GPU required)
///
/// Hands out real slotmap handles, remembers every program/uniform it
/// created and records each full-screen quad submission.

use slotmap::SlotMap;
use crate::error::Result;
use crate::engine_bail;
use crate::graphics_device::{
    GraphicsDevice, FrameBufferHandle, TextureHandle, ProgramHandle, UniformHandle,
    ProgramDesc, UniformType, FullscreenQuad, RenderPair,
};

// ============================================================================
// Mock Graphics Device
// ============================================================================

pub struct MockGraphicsDevice {
    pub frame_buffers: SlotMap<FrameBufferHandle, TextureHandle>,
    pub textures: SlotMap<TextureHandle, (u32, u32)>,
    pub programs: SlotMap<ProgramHandle, String>,
    pub uniforms: SlotMap<UniformHandle, (String, UniformType)>,
    pub draws: Vec<FullscreenQuad>,
    /// When set, create_program fails
    pub fail_programs: bool,
}

impl MockGraphicsDevice {
    pub fn new() -> Self {
        Self {
            frame_buffers: SlotMap::with_key(),
            textures: SlotMap::with_key(),
            programs: SlotMap::with_key(),
            uniforms: SlotMap::with_key(),
            draws: Vec::new(),
            fail_programs: false,
        }
    }

    /// Create a framebuffer with a single color texture
    pub fn create_frame_buffer(&mut self, width: u32, height: u32) -> RenderPair {
        let texture = self.textures.insert((width, height));
        let frame_buffer = self.frame_buffers.insert(texture);
        RenderPair::new(frame_buffer, texture)
    }

    pub fn live_program_count(&self) -> usize {
        self.programs.len()
    }

    pub fn live_uniform_count(&self) -> usize {
        self.uniforms.len()
    }
}

impl GraphicsDevice for MockGraphicsDevice {
    fn frame_buffer_texture(
        &self,
        frame_buffer: FrameBufferHandle,
        attachment: u32,
    ) -> Option<TextureHandle> {
        if attachment != 0 {
            return None;
        }
        self.frame_buffers.get(frame_buffer).copied()
    }

    fn create_program(&mut self, desc: &ProgramDesc) -> Result<ProgramHandle> {
        if self.fail_programs {
            engine_bail!("galaxy3d::MockGraphicsDevice", "Program '{}' failed to link", desc.label);
        }
        Ok(self.programs.insert(desc.label.clone()))
    }

    fn destroy_program(&mut self, program: ProgramHandle) {
        self.programs.remove(program);
    }

    fn create_uniform(&mut self, name: &str, uniform_type: UniformType) -> Result<UniformHandle> {
        Ok(self.uniforms.insert((name.to_string(), uniform_type)))
    }

    fn destroy_uniform(&mut self, uniform: UniformHandle) {
        self.uniforms.remove(uniform);
    }

    fn draw_fullscreen_quad(&mut self, quad: &FullscreenQuad) {
        self.draws.push(quad.clone());
    }
}

#[cfg(test)]
#[path = "mock_graphics_device_tests.rs"]
mod tests;
