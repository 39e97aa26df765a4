//! Transition effects
//!
//! Pluggable full-screen effects rendered while a scene link leaves its
//! source scene or enters its destination scene, plus the built-in fades.

mod transition_effect;
mod effect_registry;
mod fade_effect;

pub use transition_effect::{TransitionEffect, EffectPass, MAX_EFFECT_PARAM_SIZE};
pub use effect_registry::{EffectRegistry, EffectId};
pub use fade_effect::{FadeEffect, FadeMode, FadeEffectParams, bias};
