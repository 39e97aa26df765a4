/// Scene - a unit of content with a load/create/run/destroy/unload lifecycle
///
/// A scene never drives itself: the SceneManager steps its state machine
/// and invokes the host-supplied `SceneCallbacks` at each stage.

use std::any::Any;
use bitflags::bitflags;
use slotmap::new_key_type;
use crate::graphics_device::{FrameBufferHandle, ViewId};
use crate::loader::{LoadingScheme, LoaderGroupKey, ProgressiveLoader};

new_key_type! {
    /// Stable key to a Scene in the SceneManager
    pub struct SceneKey;
}

bitflags! {
    /// Scene behavior flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct SceneFlags: u16 {
        /// Driven to Ready synchronously by create_scene
        const PRELOAD = 0x0001;
        /// Cache hint (no behavior attached)
        const CACHE_LEVEL1 = 0x0002;
        /// Cache hint (no behavior attached)
        const CACHE_LEVEL2 = 0x0004;
        /// Never destroyed when a link leaves it
        const CACHE_ALWAYS = 0x0008;
        /// Composites on top of other scenes instead of replacing them
        const OVERLAY = 0x0010;
    }
}

/// Lifecycle state
///
/// Always flows `Dead -> LoadResource -> Create -> Ready -> Destroy ->
/// UnloadResource -> Dead`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SceneState {
    Dead,
    LoadResource,
    Create,
    Ready,
    Destroy,
    UnloadResource,
}

/// Result of `create_objects` / `destroy_objects`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackResult {
    /// Not finished, call again next frame
    Repeat,
    /// Gave up; the lifecycle still advances and a warning is logged
    Failed,
    Finished,
}

/// Identity and attributes of a scene, handed to every callback
#[derive(Debug, Clone, PartialEq)]
pub struct SceneInfo {
    pub key: SceneKey,
    pub name: String,
    /// Opaque grouping key
    pub tag: u32,
    pub flags: SceneFlags,
    /// Draw order in the active set (ascending)
    pub order: u8,
}

impl SceneInfo {
    pub fn is_overlay(&self) -> bool {
        self.flags.contains(SceneFlags::OVERLAY)
    }

    pub fn is_cache_always(&self) -> bool {
        self.flags.contains(SceneFlags::CACHE_ALWAYS)
    }
}

/// Per-frame draw context passed to `SceneCallbacks::update`
#[derive(Debug, Clone, Copy)]
pub struct SceneFrame {
    pub dt: f32,
    /// View to submit on; the manager advances it after each scene
    pub view_id: ViewId,
    /// Framebuffer to draw into
    pub target: FrameBufferHandle,
    /// Set when drawing into the effect framebuffer, which must be cleared first
    pub must_clear: bool,
}

/// Host-supplied behavior of a scene
///
/// Only `update` is mandatory. Defaults: no resources, create/destroy
/// finish immediately, `on_exit` releases the scene and the next scene is
/// never delayed.
pub trait SceneCallbacks {
    /// Queue load jobs; called once per LoadResource visit inside an open loader group
    fn load_resources(&mut self, _scene: &SceneInfo, _loader: &mut dyn ProgressiveLoader) {}

    fn create_objects(&mut self, _scene: &SceneInfo) -> CallbackResult {
        CallbackResult::Finished
    }

    /// The scene became the visible destination of a link (or the entry scene)
    fn on_enter(&mut self, _scene: &SceneInfo, _prev: Option<&SceneInfo>) {}

    /// The scene is being left for `next`
    ///
    /// Return false to keep the scene active and alive.
    fn on_exit(&mut self, _scene: &SceneInfo, _next: &SceneInfo) -> bool {
        true
    }

    fn destroy_objects(&mut self, _scene: &SceneInfo) -> CallbackResult {
        CallbackResult::Finished
    }

    /// Queue unload jobs; called once per UnloadResource visit
    fn unload_resources(&mut self, _scene: &SceneInfo, _loader: &mut dyn ProgressiveLoader) {}

    /// Run and draw one frame (Ready state only)
    fn update(&mut self, scene: &SceneInfo, frame: &SceneFrame);

    /// Asked on a link's loading scene; true holds the hand-over to the destination
    fn delay_next_scene(&mut self, _scene: &SceneInfo) -> bool {
        false
    }
}

/// Scene descriptor for `SceneManager::create_scene`
pub struct SceneDesc {
    pub name: String,
    pub tag: u32,
    pub flags: SceneFlags,
    pub loading_scheme: LoadingScheme,
    pub order: u8,
    pub user_data: Option<Box<dyn Any>>,
}

impl SceneDesc {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            tag: 0,
            flags: SceneFlags::empty(),
            loading_scheme: LoadingScheme::default(),
            order: 0,
            user_data: None,
        }
    }

    pub fn with_tag(mut self, tag: u32) -> Self {
        self.tag = tag;
        self
    }

    pub fn with_flags(mut self, flags: SceneFlags) -> Self {
        self.flags = flags;
        self
    }

    pub fn with_order(mut self, order: u8) -> Self {
        self.order = order;
        self
    }

    pub fn with_loading_scheme(mut self, scheme: LoadingScheme) -> Self {
        self.loading_scheme = scheme;
        self
    }

    pub fn with_user_data<T: Any>(mut self, data: T) -> Self {
        self.user_data = Some(Box::new(data));
        self
    }
}

pub struct Scene {
    pub(crate) info: SceneInfo,
    pub(crate) state: SceneState,
    pub(crate) loading_scheme: LoadingScheme,
    pub(crate) callbacks: Box<dyn SceneCallbacks>,
    pub(crate) user_data: Option<Box<dyn Any>>,
    /// Outstanding loader group of the current LoadResource/UnloadResource visit
    pub(crate) load_group: Option<LoaderGroupKey>,
    /// Draw into the effect framebuffer (overlay scene under an effect)
    pub(crate) draw_on_effect_fb: bool,
}

impl Scene {
    pub(crate) fn new(key: SceneKey, desc: SceneDesc, callbacks: Box<dyn SceneCallbacks>) -> Self {
        Self {
            info: SceneInfo {
                key,
                name: desc.name,
                tag: desc.tag,
                flags: desc.flags,
                order: desc.order,
            },
            state: SceneState::Dead,
            loading_scheme: desc.loading_scheme,
            callbacks,
            user_data: desc.user_data,
            load_group: None,
            draw_on_effect_fb: false,
        }
    }

    pub fn key(&self) -> SceneKey {
        self.info.key
    }

    pub fn name(&self) -> &str {
        &self.info.name
    }

    pub fn tag(&self) -> u32 {
        self.info.tag
    }

    pub fn flags(&self) -> SceneFlags {
        self.info.flags
    }

    pub fn order(&self) -> u8 {
        self.info.order
    }

    pub fn info(&self) -> &SceneInfo {
        &self.info
    }

    pub fn state(&self) -> SceneState {
        self.state
    }

    pub fn loading_scheme(&self) -> LoadingScheme {
        self.loading_scheme
    }

    pub fn draw_on_effect_frame_buffer(&self) -> bool {
        self.draw_on_effect_fb
    }

    /// Whether the loader still owes this scene a group
    pub fn is_loading(&self) -> bool {
        self.load_group.is_some()
    }

    /// User data, if present and of type `T`
    pub fn user_data<T: Any>(&self) -> Option<&T> {
        self.user_data.as_ref().and_then(|data| data.downcast_ref::<T>())
    }

    pub fn user_data_mut<T: Any>(&mut self) -> Option<&mut T> {
        self.user_data.as_mut().and_then(|data| data.downcast_mut::<T>())
    }
}

#[cfg(test)]
#[path = "scene_tests.rs"]
mod tests;
