/// Built-in fade transition effects
///
/// Four variants share one implementation: fade to/from a color, and fade
/// to/from transparency (alpha blended). Each render draws one full-screen
/// quad that samples the source texture and mixes it by a biased
/// normalized time.

use bytemuck::{Pod, Zeroable};
use glam::Vec4;
use smallvec::smallvec;
use crate::error::Result;
use crate::{engine_warn, engine_trace};
use crate::graphics_device::{
    GraphicsDevice, ProgramHandle, UniformHandle, ProgramDesc, UniformType,
    FullscreenQuad, BlendMode, ViewId,
};
use super::transition_effect::{TransitionEffect, EffectPass};

// ===== PARAMETERS =====

/// Parameter block shared by every fade variant
///
/// Passed to a scene link as raw bytes (`bytemuck::bytes_of`).
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
pub struct FadeEffectParams {
    /// Color faded to (or from)
    pub fade_color: Vec4,
    /// Seconds
    pub duration: f32,
    /// Bias curve factor in (0, 1); 0.5 is linear
    pub bias_factor: f32,
    pub _padding: [f32; 2],
}

impl FadeEffectParams {
    pub fn new(fade_color: Vec4, duration: f32, bias_factor: f32) -> Self {
        Self {
            fade_color,
            duration,
            bias_factor,
            _padding: [0.0; 2],
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

impl Default for FadeEffectParams {
    /// Black, half a second, bias 0.2
    fn default() -> Self {
        Self::new(Vec4::new(0.0, 0.0, 0.0, 1.0), 0.5, 0.2)
    }
}

/// Bias curve: `t / ((1/b - 2) * (1 - t) + 1)`
///
/// Maps [0, 1] onto [0, 1]; `b < 0.5` eases in slowly, `b > 0.5` eases in fast.
pub fn bias(t: f32, b: f32) -> f32 {
    if t <= 0.0 {
        return 0.0;
    }
    if t >= 1.0 {
        return 1.0;
    }
    let b = b.clamp(1.0e-4, 1.0 - 1.0e-4);
    t / ((1.0 / b - 2.0) * (1.0 - t) + 1.0)
}

// ===== MODES =====

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FadeMode {
    /// From the fade color to the scene
    FadeIn,
    /// From the scene to the fade color
    FadeOut,
    /// From transparent to the scene (alpha blended)
    FadeInAlpha,
    /// From the scene to transparent (alpha blended)
    FadeOutAlpha,
}

impl FadeMode {
    pub const ALL: [FadeMode; 4] = [
        FadeMode::FadeIn,
        FadeMode::FadeOut,
        FadeMode::FadeInAlpha,
        FadeMode::FadeOutAlpha,
    ];

    /// Registry name of the built-in effect
    pub fn name(self) -> &'static str {
        match self {
            FadeMode::FadeIn => "FadeIn",
            FadeMode::FadeOut => "FadeOut",
            FadeMode::FadeInAlpha => "FadeInAlpha",
            FadeMode::FadeOutAlpha => "FadeOutAlpha",
        }
    }

    pub fn blend_mode(self) -> BlendMode {
        match self {
            FadeMode::FadeIn | FadeMode::FadeOut => BlendMode::Opaque,
            FadeMode::FadeInAlpha | FadeMode::FadeOutAlpha => BlendMode::Alpha,
        }
    }

    fn fragment_source(self) -> &'static str {
        match self {
            FadeMode::FadeIn => FADE_IN_COLOR_FS,
            FadeMode::FadeOut => FADE_OUT_COLOR_FS,
            FadeMode::FadeInAlpha => FADE_IN_ALPHA_FS,
            FadeMode::FadeOutAlpha => FADE_OUT_ALPHA_FS,
        }
    }
}

// ===== EFFECT =====

struct FadeResources {
    program: ProgramHandle,
    u_texture: UniformHandle,
    u_fade_color: UniformHandle,
    u_mix_value: UniformHandle,
}

pub struct FadeEffect {
    mode: FadeMode,
    params: FadeEffectParams,
    resources: Option<FadeResources>,
    elapsed: f32,
    finished: bool,
}

impl FadeEffect {
    /// Size of the parameter block every fade variant expects
    pub const PARAM_SIZE: usize = std::mem::size_of::<FadeEffectParams>();

    pub fn new(mode: FadeMode) -> Self {
        Self {
            mode,
            params: FadeEffectParams::default(),
            resources: None,
            elapsed: 0.0,
            finished: false,
        }
    }

    pub fn mode(&self) -> FadeMode {
        self.mode
    }

    /// Parameters of the current run
    pub fn params(&self) -> &FadeEffectParams {
        &self.params
    }

    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }

    /// Normalized time of the current run, in [0, 1]
    pub fn normalized_time(&self) -> f32 {
        if self.params.duration <= 0.0 {
            return 1.0;
        }
        (self.elapsed / self.params.duration).min(1.0)
    }

    fn create_resources(&self, device: &mut dyn GraphicsDevice) -> Result<FadeResources> {
        let u_texture = device.create_uniform("u_texture", UniformType::Sampler)?;
        let u_fade_color = match device.create_uniform("u_fadeColor", UniformType::Vec4) {
            Ok(u) => u,
            Err(e) => {
                device.destroy_uniform(u_texture);
                return Err(e);
            }
        };
        let u_mix_value = match device.create_uniform("u_mixValue", UniformType::Vec4) {
            Ok(u) => u,
            Err(e) => {
                device.destroy_uniform(u_texture);
                device.destroy_uniform(u_fade_color);
                return Err(e);
            }
        };
        let desc = ProgramDesc {
            label: format!("{} program", self.mode.name()),
            vertex_source: FADE_VS,
            fragment_source: self.mode.fragment_source(),
        };
        let program = match device.create_program(&desc) {
            Ok(p) => p,
            Err(e) => {
                device.destroy_uniform(u_texture);
                device.destroy_uniform(u_fade_color);
                device.destroy_uniform(u_mix_value);
                return Err(e);
            }
        };

        Ok(FadeResources { program, u_texture, u_fade_color, u_mix_value })
    }
}

impl TransitionEffect for FadeEffect {
    fn create(&mut self, device: &mut dyn GraphicsDevice) -> bool {
        if self.resources.is_some() {
            return true;
        }
        match self.create_resources(device) {
            Ok(resources) => {
                self.resources = Some(resources);
                true
            }
            Err(e) => {
                engine_warn!("galaxy3d::FadeEffect", "{}: {}", self.mode.name(), e);
                false
            }
        }
    }

    fn destroy(&mut self, device: &mut dyn GraphicsDevice) {
        if let Some(resources) = self.resources.take() {
            device.destroy_program(resources.program);
            device.destroy_uniform(resources.u_texture);
            device.destroy_uniform(resources.u_fade_color);
            device.destroy_uniform(resources.u_mix_value);
        }
    }

    fn begin(&mut self, params: &[u8], _view_id: ViewId) {
        self.params = match bytemuck::try_pod_read_unaligned::<FadeEffectParams>(params) {
            Ok(params) => params,
            Err(_) => {
                if !params.is_empty() {
                    engine_warn!("galaxy3d::FadeEffect",
                        "{}: expected {} parameter bytes, got {}; using defaults",
                        self.mode.name(), Self::PARAM_SIZE, params.len());
                }
                FadeEffectParams::default()
            }
        };
        self.elapsed = 0.0;
        self.finished = false;
        engine_trace!("galaxy3d::FadeEffect", "{} begin ({}s)", self.mode.name(), self.params.duration);
    }

    fn render(&mut self, device: &mut dyn GraphicsDevice, pass: &EffectPass) {
        self.elapsed += pass.dt;
        let t = self.normalized_time();
        let mix_value = bias(t, self.params.bias_factor);

        if let Some(resources) = &self.resources {
            device.draw_fullscreen_quad(&FullscreenQuad {
                view_id: pass.view_id,
                target: pass.target,
                viewport: pass.render_size,
                program: resources.program,
                blend: self.mode.blend_mode(),
                texture: Some((resources.u_texture, pass.source)),
                uniforms: smallvec![
                    (resources.u_fade_color, self.params.fade_color),
                    (resources.u_mix_value, Vec4::new(mix_value, 0.0, 0.0, 0.0)),
                ],
            });
        }

        self.finished = (t - 1.0).abs() < 1.0e-5;
    }

    fn end(&mut self) {}

    fn is_done(&self) -> bool {
        self.finished
    }
}

// ===== SHADERS (WGSL) =====

const FADE_VS: &str = r#"
struct VsOut {
    @builtin(position) position: vec4f,
    @location(0) uv: vec2f,
}

@vertex
fn vs(@builtin(vertex_index) vi: u32) -> VsOut {
    // Fullscreen triangle
    let uv = vec2f(f32((vi << 1u) & 2u), f32(vi & 2u));
    var out: VsOut;
    out.position = vec4f(uv * vec2f(2.0, -2.0) + vec2f(-1.0, 1.0), 0.0, 1.0);
    out.uv = uv;
    return out;
}
"#;

const FADE_OUT_COLOR_FS: &str = r#"
struct FadeUniforms {
    u_fadeColor: vec4f,
    u_mixValue: vec4f,
}

@group(0) @binding(0) var<uniform> u: FadeUniforms;
@group(0) @binding(1) var u_texture: texture_2d<f32>;
@group(0) @binding(2) var u_sampler: sampler;

@fragment
fn fs(@location(0) uv: vec2f) -> @location(0) vec4f {
    let scene = textureSample(u_texture, u_sampler, uv);
    return mix(scene, u.u_fadeColor, u.u_mixValue.x);
}
"#;

const FADE_IN_COLOR_FS: &str = r#"
struct FadeUniforms {
    u_fadeColor: vec4f,
    u_mixValue: vec4f,
}

@group(0) @binding(0) var<uniform> u: FadeUniforms;
@group(0) @binding(1) var u_texture: texture_2d<f32>;
@group(0) @binding(2) var u_sampler: sampler;

@fragment
fn fs(@location(0) uv: vec2f) -> @location(0) vec4f {
    let scene = textureSample(u_texture, u_sampler, uv);
    return mix(u.u_fadeColor, scene, u.u_mixValue.x);
}
"#;

const FADE_OUT_ALPHA_FS: &str = r#"
struct FadeUniforms {
    u_fadeColor: vec4f,
    u_mixValue: vec4f,
}

@group(0) @binding(0) var<uniform> u: FadeUniforms;
@group(0) @binding(1) var u_texture: texture_2d<f32>;
@group(0) @binding(2) var u_sampler: sampler;

@fragment
fn fs(@location(0) uv: vec2f) -> @location(0) vec4f {
    let scene = textureSample(u_texture, u_sampler, uv);
    return vec4f(scene.rgb, scene.a * (1.0 - u.u_mixValue.x));
}
"#;

const FADE_IN_ALPHA_FS: &str = r#"
struct FadeUniforms {
    u_fadeColor: vec4f,
    u_mixValue: vec4f,
}

@group(0) @binding(0) var<uniform> u: FadeUniforms;
@group(0) @binding(1) var u_texture: texture_2d<f32>;
@group(0) @binding(2) var u_sampler: sampler;

@fragment
fn fs(@location(0) uv: vec2f) -> @location(0) vec4f {
    let scene = textureSample(u_texture, u_sampler, uv);
    return vec4f(scene.rgb, scene.a * u.u_mixValue.x);
}
"#;

#[cfg(test)]
#[path = "fade_effect_tests.rs"]
mod tests;
