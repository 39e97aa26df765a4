/// Registry of named transition effects
///
/// Effects are looked up by a 64-bit hash of their name with a linear scan.
/// The list only grows; effects live until the registry is torn down, so
/// an `EffectId` stays valid for the registry's whole lifetime.

use std::hash::{Hash, Hasher};
use rustc_hash::FxHasher;
use crate::error::Result;
use crate::{engine_bail, engine_bail_warn, engine_debug, engine_warn};
use crate::graphics_device::GraphicsDevice;
use super::transition_effect::{TransitionEffect, MAX_EFFECT_PARAM_SIZE};

/// Index of a registered effect
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EffectId(usize);

impl EffectId {
    pub fn index(self) -> usize {
        self.0
    }
}

struct EffectEntry {
    name_hash: u64,
    name: String,
    effect: Box<dyn TransitionEffect>,
    param_size: usize,
    /// Device resources are alive (create succeeded, not destroyed since)
    initialized: bool,
}

pub struct EffectRegistry {
    entries: Vec<EffectEntry>,
}

fn hash_name(name: &str) -> u64 {
    let mut hasher = FxHasher::default();
    name.hash(&mut hasher);
    hasher.finish()
}

impl EffectRegistry {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Register an effect and create its device resources
    ///
    /// # Errors
    ///
    /// - `AlreadyExists` if the name is taken
    /// - `InvalidResource` if `param_size` exceeds [`MAX_EFFECT_PARAM_SIZE`]
    /// - `InitializationFailed` if the effect's `create` fails
    ///
    /// The registry is left untouched on error.
    pub fn register(
        &mut self,
        device: &mut dyn GraphicsDevice,
        name: &str,
        mut effect: Box<dyn TransitionEffect>,
        param_size: usize,
    ) -> Result<EffectId> {
        if self.find(name).is_some() {
            engine_bail_warn!("galaxy3d::SceneManager",
                AlreadyExists: "Transition effect '{}' already registered", name);
        }
        if param_size > MAX_EFFECT_PARAM_SIZE {
            engine_bail_warn!("galaxy3d::SceneManager",
                InvalidResource: "Transition effect '{}' declares {} parameter bytes (max {})",
                name, param_size, MAX_EFFECT_PARAM_SIZE);
        }
        if !effect.create(device) {
            engine_bail!("galaxy3d::SceneManager",
                InitializationFailed: "Transition effect '{}' failed to create", name);
        }

        self.entries.push(EffectEntry {
            name_hash: hash_name(name),
            name: name.to_string(),
            effect,
            param_size,
            initialized: true,
        });
        engine_debug!("galaxy3d::SceneManager", "Transition effect '{}' registered", name);
        Ok(EffectId(self.entries.len() - 1))
    }

    /// Find an effect by name
    pub fn find(&self, name: &str) -> Option<EffectId> {
        let hash = hash_name(name);
        self.entries.iter().position(|e| e.name_hash == hash).map(EffectId)
    }

    pub fn name(&self, id: EffectId) -> Option<&str> {
        self.entries.get(id.0).map(|e| e.name.as_str())
    }

    pub fn param_size(&self, id: EffectId) -> Option<usize> {
        self.entries.get(id.0).map(|e| e.param_size)
    }

    pub fn is_initialized(&self, id: EffectId) -> bool {
        self.entries.get(id.0).is_some_and(|e| e.initialized)
    }

    pub fn effect_mut(&mut self, id: EffectId) -> Option<&mut (dyn TransitionEffect + 'static)> {
        self.entries.get_mut(id.0).map(|e| e.effect.as_mut())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Registered names, in registration order
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    /// Destroy device resources of every initialized effect
    pub fn destroy_all(&mut self, device: &mut dyn GraphicsDevice) {
        for entry in self.entries.iter_mut().filter(|e| e.initialized) {
            entry.effect.destroy(device);
            entry.initialized = false;
        }
    }

    /// Re-create device resources of effects that are not initialized
    ///
    /// Returns the number of effects that failed to re-create. Those stay
    /// registered but are skipped by links until a later successful call.
    pub fn recreate_all(&mut self, device: &mut dyn GraphicsDevice) -> usize {
        let mut failed = 0;
        for entry in self.entries.iter_mut().filter(|e| !e.initialized) {
            entry.initialized = entry.effect.create(device);
            if !entry.initialized {
                engine_warn!("galaxy3d::SceneManager",
                    "Transition effect '{}' failed to re-create", entry.name);
                failed += 1;
            }
        }
        failed
    }
}

impl Default for EffectRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "effect_registry_tests.rs"]
mod tests;
