//! Scene management module
//!
//! Provides scenes and their lifecycle, scene links (transitions between
//! scenes) and the scene manager that drives both every frame.

mod scene;
mod scene_link;
mod active_set;
mod scene_manager;

pub use scene::{
    Scene, SceneKey, SceneFlags, SceneState, SceneInfo, SceneDesc, SceneFrame,
    SceneCallbacks, CallbackResult,
};
pub use scene_link::{SceneLink, SceneLinkKey, SceneLinkDef, LinkState};
pub use active_set::{MAX_ACTIVE_SCENES, MAX_ACTIVE_LINKS};
pub use scene_manager::{
    SceneManager, SceneManagerConfig, SceneManagerStats, FindSceneMode, FrameOutput,
};
