/// SceneLink - a reusable, directed transition between two scenes
///
/// A link optionally shows a loading scene while its destination loads and
/// optionally plays one effect when leaving the source and one when
/// entering the destination. Its state returns to `InA` after every run.

use slotmap::new_key_type;
use crate::effect::{EffectId, MAX_EFFECT_PARAM_SIZE};
use super::scene::SceneKey;

new_key_type! {
    /// Stable key to a SceneLink in the SceneManager
    pub struct SceneLinkKey;
}

/// Transition progress of a link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkState {
    /// Leaving the source scene (exit effect)
    InA,
    /// Waiting for the destination scene to load and the source to clear
    InLoad,
    /// Entering the destination scene (enter effect)
    InB,
}

/// Link definition for `SceneManager::link_scene`
///
/// Effects are referenced by registry name; their parameter block is copied
/// into the link.
#[derive(Debug, Clone)]
pub struct SceneLinkDef {
    pub scene_a: SceneKey,
    pub scene_b: SceneKey,
    pub load_scene: Option<SceneKey>,
    pub exit_effect: Option<(String, Vec<u8>)>,
    pub enter_effect: Option<(String, Vec<u8>)>,
}

impl SceneLinkDef {
    pub fn new(scene_a: SceneKey, scene_b: SceneKey) -> Self {
        Self {
            scene_a,
            scene_b,
            load_scene: None,
            exit_effect: None,
            enter_effect: None,
        }
    }

    /// Show `scene` while the destination loads
    pub fn with_loading_scene(mut self, scene: SceneKey) -> Self {
        self.load_scene = Some(scene);
        self
    }

    /// Play `effect` when leaving the source scene
    pub fn with_exit_effect(mut self, effect: &str, params: &[u8]) -> Self {
        self.exit_effect = Some((effect.to_string(), params.to_vec()));
        self
    }

    /// Play `effect` when entering the destination scene
    pub fn with_enter_effect(mut self, effect: &str, params: &[u8]) -> Self {
        self.enter_effect = Some((effect.to_string(), params.to_vec()));
        self
    }
}

/// Effect bound to one side of a link, with its copied parameter block
#[derive(Debug, Clone)]
pub(crate) struct LinkEffect {
    pub id: EffectId,
    params: [u8; MAX_EFFECT_PARAM_SIZE],
    param_len: usize,
}

impl LinkEffect {
    /// Copies at most `MAX_EFFECT_PARAM_SIZE` bytes
    pub fn new(id: EffectId, params: &[u8]) -> Self {
        let param_len = params.len().min(MAX_EFFECT_PARAM_SIZE);
        let mut block = [0u8; MAX_EFFECT_PARAM_SIZE];
        block[..param_len].copy_from_slice(&params[..param_len]);
        Self { id, params: block, param_len }
    }

    pub fn params(&self) -> &[u8] {
        &self.params[..self.param_len]
    }
}

#[derive(Debug, Clone)]
pub struct SceneLink {
    pub(crate) state: LinkState,
    pub(crate) scene_a: SceneKey,
    pub(crate) scene_b: SceneKey,
    pub(crate) load_scene: Option<SceneKey>,
    pub(crate) exit_effect: Option<LinkEffect>,
    pub(crate) enter_effect: Option<LinkEffect>,
    pub(crate) exit_begun: bool,
    pub(crate) enter_begun: bool,
    /// on_exit of the source scene has been asked during this run
    pub(crate) exit_resolved: bool,
    /// The source scene was released and must reach Dead before hand-over
    pub(crate) destroy_a: bool,
}

impl SceneLink {
    pub(crate) fn new(
        scene_a: SceneKey,
        scene_b: SceneKey,
        load_scene: Option<SceneKey>,
        exit_effect: Option<LinkEffect>,
        enter_effect: Option<LinkEffect>,
    ) -> Self {
        Self {
            state: LinkState::InA,
            scene_a,
            scene_b,
            load_scene,
            exit_effect,
            enter_effect,
            exit_begun: false,
            enter_begun: false,
            exit_resolved: false,
            destroy_a: false,
        }
    }

    /// Back to InA with every per-run flag cleared
    pub(crate) fn reset(&mut self) {
        self.state = LinkState::InA;
        self.exit_begun = false;
        self.enter_begun = false;
        self.exit_resolved = false;
        self.destroy_a = false;
    }

    pub fn state(&self) -> LinkState {
        self.state
    }

    pub fn scene_a(&self) -> SceneKey {
        self.scene_a
    }

    pub fn scene_b(&self) -> SceneKey {
        self.scene_b
    }

    pub fn load_scene(&self) -> Option<SceneKey> {
        self.load_scene
    }

    pub fn exit_effect(&self) -> Option<EffectId> {
        self.exit_effect.as_ref().map(|e| e.id)
    }

    pub fn enter_effect(&self) -> Option<EffectId> {
        self.enter_effect.as_ref().map(|e| e.id)
    }

    /// Whether the link involves `scene` as source or destination
    pub fn uses_scene(&self, scene: SceneKey) -> bool {
        self.scene_a == scene || self.scene_b == scene
    }
}

#[cfg(test)]
#[path = "scene_link_tests.rs"]
mod tests;
