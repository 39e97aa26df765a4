//! Scene manager - sequences scenes and the transitions between them.
//!
//! Owns the scene registry, the bounded set of active scenes, the queue of
//! triggered links, the transition effect registry and the progressive
//! loader. `update` is called once per frame: it steps the loader, runs
//! every active scene in draw order, then advances the head link by one
//! step and reports which framebuffer holds the final image.
//!
//! Only `create_scene` (with `SceneFlags::PRELOAD`), `start` and
//! `destroy_scene` block, polling the loader until the scene reaches its
//! target state.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use glam::UVec2;
use slotmap::SlotMap;
use crate::error::Result;
use crate::{engine_bail, engine_bail_warn, engine_debug, engine_trace, engine_warn};
use crate::graphics_device::{GraphicsDevice, FrameBufferHandle, TextureHandle, RenderPair, ViewId};
use crate::loader::{ProgressiveLoader, DefaultProgressiveLoader};
use crate::effect::{EffectRegistry, EffectId, EffectPass, TransitionEffect, FadeEffect, FadeMode};
use super::scene::{
    Scene, SceneKey, SceneDesc, SceneState, SceneFlags, SceneFrame, SceneCallbacks,
    CallbackResult,
};
use super::scene_link::{SceneLink, SceneLinkKey, SceneLinkDef, LinkState, LinkEffect};
use super::active_set::{ActiveScenes, ActiveLinks};

// ===== CONFIGURATION =====

/// SceneManager configuration
#[derive(Debug, Clone)]
pub struct SceneManagerConfig {
    /// Scene pool capacity
    pub max_scenes: usize,
    /// Link pool capacity
    pub max_links: usize,
    /// dt fed to the loader and the scene state machine by blocking drains
    pub drain_step_dt: f32,
    /// Iterations after which a blocking drain gives up with `Error::Timeout`
    /// (None = spin until done)
    pub drain_iteration_limit: Option<u32>,
}

impl Default for SceneManagerConfig {
    fn default() -> Self {
        Self {
            max_scenes: 32,
            max_links: 64,
            drain_step_dt: 1.0,
            drain_iteration_limit: None,
        }
    }
}

/// Scope of a scene lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FindSceneMode {
    /// Every registered scene, in creation order
    All,
    /// Active scenes only, in draw order
    Active,
}

/// What the host should present after `update`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameOutput {
    /// Next free view (one past the last view used this frame)
    pub view_id: ViewId,
    pub frame_buffer: FrameBufferHandle,
    pub texture: TextureHandle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SceneManagerStats {
    pub scenes: usize,
    pub links: usize,
    pub effects: usize,
    pub active_scenes: usize,
    pub active_links: usize,
}

fn lock_device(device: &Arc<Mutex<dyn GraphicsDevice>>) -> MutexGuard<'_, dyn GraphicsDevice + 'static> {
    device.lock().unwrap_or_else(PoisonError::into_inner)
}

// ===== SCENE MANAGER =====

pub struct SceneManager {
    config: SceneManagerConfig,
    device: Arc<Mutex<dyn GraphicsDevice>>,
    loader: Box<dyn ProgressiveLoader>,
    scenes: SlotMap<SceneKey, Scene>,
    /// Scene keys in creation order
    registry: Vec<SceneKey>,
    links: SlotMap<SceneLinkKey, SceneLink>,
    effects: EffectRegistry,
    active_scenes: ActiveScenes,
    active_links: ActiveLinks,
    main: RenderPair,
    effect: RenderPair,
    /// Pair holding the final image of the current frame
    final_pair: RenderPair,
    /// Draw cursor of the current frame
    view_id: ViewId,
}

impl SceneManager {
    /// Create a scene manager with the default progressive loader
    ///
    /// Registers the built-in `FadeIn`, `FadeOut`, `FadeInAlpha` and
    /// `FadeOutAlpha` effects.
    ///
    /// # Errors
    ///
    /// Returns an error if a built-in effect fails to create its device
    /// resources.
    pub fn new(device: Arc<Mutex<dyn GraphicsDevice>>, config: SceneManagerConfig) -> Result<Self> {
        Self::with_loader(device, config, Box::new(DefaultProgressiveLoader::new()))
    }

    /// Create a scene manager driving a caller-supplied loader
    pub fn with_loader(
        device: Arc<Mutex<dyn GraphicsDevice>>,
        config: SceneManagerConfig,
        loader: Box<dyn ProgressiveLoader>,
    ) -> Result<Self> {
        let mut manager = Self {
            config,
            device,
            loader,
            scenes: SlotMap::with_key(),
            registry: Vec::new(),
            links: SlotMap::with_key(),
            effects: EffectRegistry::new(),
            active_scenes: ActiveScenes::new(),
            active_links: ActiveLinks::new(),
            main: RenderPair::default(),
            effect: RenderPair::default(),
            final_pair: RenderPair::default(),
            view_id: 0,
        };

        for mode in FadeMode::ALL {
            manager.register_effect(mode.name(), Box::new(FadeEffect::new(mode)), FadeEffect::PARAM_SIZE)?;
        }

        engine_debug!("galaxy3d::SceneManager", "SceneManager created ({} effects)", manager.effects.len());
        Ok(manager)
    }

    pub fn config(&self) -> &SceneManagerConfig {
        &self.config
    }

    // ===== EFFECTS =====

    /// Register a transition effect under a unique name
    ///
    /// The effect's `create` runs immediately.
    ///
    /// # Errors
    ///
    /// Duplicate name, `param_size` above `MAX_EFFECT_PARAM_SIZE`, or a
    /// failing `create`. Nothing is registered on error.
    pub fn register_effect(
        &mut self,
        name: &str,
        effect: Box<dyn TransitionEffect>,
        param_size: usize,
    ) -> Result<EffectId> {
        let mut device = lock_device(&self.device);
        self.effects.register(&mut *device, name, effect, param_size)
    }

    pub fn find_effect(&self, name: &str) -> Option<EffectId> {
        self.effects.find(name)
    }

    pub fn effect_count(&self) -> usize {
        self.effects.len()
    }

    pub fn effect_names(&self) -> Vec<&str> {
        self.effects.names()
    }

    // ===== SCENES =====

    /// Create a scene
    ///
    /// The scene starts `Dead`. With `SceneFlags::PRELOAD` it is driven to
    /// `Ready` before this returns.
    ///
    /// # Errors
    ///
    /// - `AlreadyExists` if a scene with the same name (case-insensitive) exists
    /// - `CapacityExceeded` if the scene pool is full
    /// - `Timeout` if the preload exceeds `drain_iteration_limit` (the scene
    ///   stays registered)
    pub fn create_scene(&mut self, desc: SceneDesc, callbacks: Box<dyn SceneCallbacks>) -> Result<SceneKey> {
        if self.find_scene(&desc.name, FindSceneMode::All).is_some() {
            engine_bail_warn!("galaxy3d::SceneManager",
                AlreadyExists: "Scene '{}' already exists", desc.name);
        }
        if self.scenes.len() >= self.config.max_scenes {
            engine_bail_warn!("galaxy3d::SceneManager",
                CapacityExceeded: "Scene pool is full ({}), cannot create '{}'",
                self.config.max_scenes, desc.name);
        }

        let preload = desc.flags.contains(SceneFlags::PRELOAD);
        let key = self.scenes.insert_with_key(|key| Scene::new(key, desc, callbacks));
        self.registry.push(key);
        engine_debug!("galaxy3d::SceneManager", "Scene '{}' created", self.scene_name(key));

        if preload {
            self.preload_scene(key)?;
        }
        Ok(key)
    }

    /// Destroy a scene
    ///
    /// Blocks until the scene is `Dead` (a scene still loading is first
    /// brought to `Ready`), then removes it from the active set and the
    /// registry. Links using it as source or destination are removed too,
    /// and it is cleared as loading scene from the others.
    ///
    /// # Errors
    ///
    /// `NotFound` for a stale key, `Timeout` if the drain exceeds
    /// `drain_iteration_limit` (nothing is removed then).
    pub fn destroy_scene(&mut self, key: SceneKey) -> Result<()> {
        if !self.scenes.contains_key(key) {
            engine_bail_warn!("galaxy3d::SceneManager",
                NotFound: "destroy_scene: unknown or stale scene key");
        }

        self.drain_scene(key)?;
        self.active_scenes.remove(key);
        self.purge_links(key);
        self.registry.retain(|k| *k != key);
        if let Some(scene) = self.scenes.remove(key) {
            engine_debug!("galaxy3d::SceneManager", "Scene '{}' destroyed", scene.name());
        }
        Ok(())
    }

    pub fn scene(&self, key: SceneKey) -> Option<&Scene> {
        self.scenes.get(key)
    }

    pub fn scene_mut(&mut self, key: SceneKey) -> Option<&mut Scene> {
        self.scenes.get_mut(key)
    }

    pub fn scene_state(&self, key: SceneKey) -> Option<SceneState> {
        self.scenes.get(key).map(|s| s.state)
    }

    pub fn scene_count(&self) -> usize {
        self.scenes.len()
    }

    /// Scene names in creation order
    pub fn scene_names(&self) -> Vec<&str> {
        self.registry
            .iter()
            .filter_map(|key| self.scenes.get(*key))
            .map(|s| s.name())
            .collect()
    }

    /// Find a scene by name (case-insensitive)
    pub fn find_scene(&self, name: &str, mode: FindSceneMode) -> Option<SceneKey> {
        let matches = |key: &SceneKey| {
            self.scenes.get(*key).is_some_and(|s| s.info.name.eq_ignore_ascii_case(name))
        };
        match mode {
            FindSceneMode::All => self.registry.iter().copied().find(matches),
            FindSceneMode::Active => self.active_scenes.keys().into_iter().find(matches),
        }
    }

    /// Every scene carrying `tag`
    pub fn find_scenes_by_tag(&self, tag: u32, mode: FindSceneMode) -> Vec<SceneKey> {
        let matches = |key: &SceneKey| self.scenes.get(*key).is_some_and(|s| s.info.tag == tag);
        match mode {
            FindSceneMode::All => self.registry.iter().copied().filter(matches).collect(),
            FindSceneMode::Active => self.active_scenes.keys().into_iter().filter(matches).collect(),
        }
    }

    // ===== ACTIVE SET =====

    /// Add a `Ready` scene to the active set
    ///
    /// Returns true only if the scene was added by this call. Adding a scene
    /// that is already active, not `Ready`, or past capacity is a no-op.
    pub fn add_active_scene(&mut self, key: SceneKey) -> bool {
        match self.scenes.get(key) {
            Some(scene) if scene.state == SceneState::Ready => {
                self.active_scenes.insert(key, scene.info.order)
            }
            _ => false,
        }
    }

    /// Remove a scene from the active set; returns true if it was active
    pub fn remove_active_scene(&mut self, key: SceneKey) -> bool {
        self.active_scenes.remove(key)
    }

    pub fn is_scene_active(&self, key: SceneKey) -> bool {
        self.active_scenes.contains(key)
    }

    /// Active scenes in draw order
    pub fn active_scenes(&self) -> Vec<SceneKey> {
        self.active_scenes.keys().to_vec()
    }

    pub fn active_scene_count(&self) -> usize {
        self.active_scenes.len()
    }

    // ===== LINKS =====

    /// Create a link between two scenes
    ///
    /// Neither scene needs to be active or loaded.
    ///
    /// # Errors
    ///
    /// - `NotFound` for stale scene keys or unregistered effect names
    /// - `InvalidOperation` if source and destination are the same scene, or
    ///   the loading scene is one of them
    /// - `InvalidResource` if an effect parameter block is larger than the
    ///   effect declares
    /// - `CapacityExceeded` if the link pool is full
    pub fn link_scene(&mut self, def: SceneLinkDef) -> Result<SceneLinkKey> {
        for (role, key) in [("source", Some(def.scene_a)), ("destination", Some(def.scene_b)), ("loading", def.load_scene)] {
            if let Some(key) = key {
                if !self.scenes.contains_key(key) {
                    engine_bail_warn!("galaxy3d::SceneManager",
                        NotFound: "link_scene: {} scene key is unknown or stale", role);
                }
            }
        }
        if def.scene_a == def.scene_b {
            engine_bail_warn!("galaxy3d::SceneManager",
                InvalidOperation: "link_scene: scene '{}' cannot link to itself", self.scene_name(def.scene_a));
        }
        if def.load_scene.is_some_and(|load| load == def.scene_a || load == def.scene_b) {
            engine_bail_warn!("galaxy3d::SceneManager",
                InvalidOperation: "link_scene: loading scene must differ from both linked scenes");
        }

        let exit_effect = self.resolve_link_effect(def.exit_effect.as_ref())?;
        let enter_effect = self.resolve_link_effect(def.enter_effect.as_ref())?;

        if self.links.len() >= self.config.max_links {
            engine_bail_warn!("galaxy3d::SceneManager",
                CapacityExceeded: "Link pool is full ({})", self.config.max_links);
        }

        let key = self.links.insert(SceneLink::new(
            def.scene_a,
            def.scene_b,
            def.load_scene,
            exit_effect,
            enter_effect,
        ));
        engine_debug!("galaxy3d::SceneManager", "Scene link '{}' -> '{}' created",
            self.scene_name(def.scene_a), self.scene_name(def.scene_b));
        Ok(key)
    }

    fn resolve_link_effect(&self, effect: Option<&(String, Vec<u8>)>) -> Result<Option<LinkEffect>> {
        let Some((name, params)) = effect else {
            return Ok(None);
        };
        let id = match self.effects.find(name) {
            Some(id) => id,
            None => engine_bail_warn!("galaxy3d::SceneManager",
                NotFound: "Transition effect '{}' is not registered", name),
        };
        let max = self.effects.param_size(id).unwrap_or(0);
        if params.len() > max {
            engine_bail_warn!("galaxy3d::SceneManager",
                InvalidResource: "Transition effect '{}' takes {} parameter bytes, got {}",
                name, max, params.len());
        }
        Ok(Some(LinkEffect::new(id, params)))
    }

    /// Remove an idle link
    ///
    /// # Errors
    ///
    /// `NotFound` for a stale key, `InvalidOperation` if the link is queued.
    pub fn remove_scene_link(&mut self, key: SceneLinkKey) -> Result<()> {
        if !self.links.contains_key(key) {
            engine_bail_warn!("galaxy3d::SceneManager",
                NotFound: "remove_scene_link: unknown or stale link key");
        }
        if self.active_links.contains(key) {
            engine_bail_warn!("galaxy3d::SceneManager",
                InvalidOperation: "Scene link is in flight and cannot be removed");
        }
        self.links.remove(key);
        Ok(())
    }

    /// Point an idle link at a new destination scene
    ///
    /// # Errors
    ///
    /// `NotFound` for stale keys, `InvalidOperation` if the link is queued or
    /// the new destination is its source or loading scene.
    pub fn change_scene_link(&mut self, key: SceneLinkKey, scene_b: SceneKey) -> Result<()> {
        if !self.scenes.contains_key(scene_b) {
            engine_bail_warn!("galaxy3d::SceneManager",
                NotFound: "change_scene_link: unknown or stale scene key");
        }
        if self.active_links.contains(key) {
            engine_bail_warn!("galaxy3d::SceneManager",
                InvalidOperation: "Scene link is in flight and cannot be changed");
        }
        let link = match self.links.get_mut(key) {
            Some(link) => link,
            None => engine_bail_warn!("galaxy3d::SceneManager",
                NotFound: "change_scene_link: unknown or stale link key"),
        };
        if link.scene_a == scene_b || link.load_scene == Some(scene_b) {
            engine_bail_warn!("galaxy3d::SceneManager",
                InvalidOperation: "change_scene_link: destination must differ from source and loading scene");
        }
        link.scene_b = scene_b;
        Ok(())
    }

    /// Queue a link for transition
    ///
    /// Ignored (returns false) when the link's source scene is not active,
    /// or the queue is full. Returns true when the link is queued after the
    /// call, including when it already was.
    ///
    /// The source is checked again when the link reaches the head of the
    /// queue: a link whose source was taken off screen by an earlier link
    /// is dropped without running.
    pub fn trigger_scene_link(&mut self, key: SceneLinkKey) -> bool {
        let Some(link) = self.links.get(key) else {
            engine_warn!("galaxy3d::SceneManager", "trigger_scene_link: unknown or stale link key");
            return false;
        };
        if !self.active_scenes.contains(link.scene_a) {
            engine_trace!("galaxy3d::SceneManager",
                "Link trigger dropped: source scene '{}' is not active", self.scene_name(link.scene_a));
            return false;
        }
        if self.active_links.contains(key) {
            return true;
        }
        self.active_links.push(key)
    }

    pub fn scene_link(&self, key: SceneLinkKey) -> Option<&SceneLink> {
        self.links.get(key)
    }

    pub fn link_count(&self) -> usize {
        self.links.len()
    }

    /// Queued links, head first
    pub fn active_links(&self) -> Vec<SceneLinkKey> {
        self.active_links.keys().to_vec()
    }

    pub fn active_link_count(&self) -> usize {
        self.active_links.len()
    }

    /// Whether a queued link is waiting for its destination to load
    pub fn is_in_load_state(&self) -> bool {
        self.active_links
            .keys()
            .iter()
            .any(|key| self.links.get(*key).is_some_and(|l| l.state == LinkState::InLoad))
    }

    // ===== FRAME =====

    /// Bind the framebuffers and make `entry` the only active scene
    ///
    /// The entry scene is preloaded if needed and receives
    /// `on_enter(entry, None)`. Queued links are dropped.
    ///
    /// # Errors
    ///
    /// `NotFound` for a stale key, `InvalidResource` if a framebuffer has no
    /// color texture, `Timeout` if the preload exceeds the drain limit.
    pub fn start(
        &mut self,
        entry: SceneKey,
        main_frame_buffer: FrameBufferHandle,
        effect_frame_buffer: FrameBufferHandle,
    ) -> Result<()> {
        if !self.scenes.contains_key(entry) {
            engine_bail_warn!("galaxy3d::SceneManager",
                NotFound: "start: unknown or stale entry scene key");
        }
        self.bind_frame_buffers(main_frame_buffer, effect_frame_buffer)?;

        self.active_scenes.clear();
        self.active_links.clear();
        for link in self.links.values_mut() {
            link.reset();
        }

        self.preload_scene(entry)?;
        if let Some(order) = self.scenes.get(entry).map(|s| s.info.order) {
            self.active_scenes.insert(entry, order);
        }
        self.notify_enter(entry, None);
        engine_debug!("galaxy3d::SceneManager", "Started with scene '{}'", self.scene_name(entry));
        Ok(())
    }

    /// Run one frame
    ///
    /// Steps the loader, updates every active scene in draw order (a `Dead`
    /// active scene starts loading), then advances the head link by one step.
    /// Each drawn scene consumes one view, starting at `view_id`.
    pub fn update(&mut self, dt: f32, view_id: ViewId, render_size: UVec2) -> FrameOutput {
        self.view_id = view_id;
        self.final_pair = self.main;

        self.loader.step(dt);

        for key in self.active_scenes.keys() {
            self.update_scene(key, dt, true);
        }

        if let Some(head) = self.active_links.head() {
            self.update_link(head, dt, render_size);
        }

        FrameOutput {
            view_id: self.view_id,
            frame_buffer: self.final_pair.frame_buffer,
            texture: self.final_pair.texture,
        }
    }

    pub fn main_pair(&self) -> RenderPair {
        self.main
    }

    pub fn effect_pair(&self) -> RenderPair {
        self.effect
    }

    // ===== GRAPHICS RESET =====

    /// Destroy every effect's device resources and unbind the framebuffers
    ///
    /// Links skip effects until `reset_graphics` re-creates them.
    pub fn destroy_graphics(&mut self) {
        let mut device = lock_device(&self.device);
        self.effects.destroy_all(&mut *device);
        drop(device);

        self.main = RenderPair::default();
        self.effect = RenderPair::default();
        self.final_pair = RenderPair::default();
    }

    /// Rebind the framebuffers and re-create effects that are not initialized
    ///
    /// # Errors
    ///
    /// `InvalidResource` if a framebuffer has no color texture,
    /// `InitializationFailed` if some effects failed to re-create (the
    /// framebuffers are bound regardless).
    pub fn reset_graphics(
        &mut self,
        main_frame_buffer: FrameBufferHandle,
        effect_frame_buffer: FrameBufferHandle,
    ) -> Result<()> {
        self.bind_frame_buffers(main_frame_buffer, effect_frame_buffer)?;

        let failed = {
            let mut device = lock_device(&self.device);
            self.effects.recreate_all(&mut *device)
        };
        if failed > 0 {
            engine_bail!("galaxy3d::SceneManager",
                InitializationFailed: "{} transition effect(s) failed to re-create", failed);
        }
        Ok(())
    }

    fn bind_frame_buffers(&mut self, main_fb: FrameBufferHandle, effect_fb: FrameBufferHandle) -> Result<()> {
        let (main_tex, effect_tex) = {
            let device = lock_device(&self.device);
            (device.frame_buffer_texture(main_fb, 0), device.frame_buffer_texture(effect_fb, 0))
        };
        match (main_tex, effect_tex) {
            (Some(main_tex), Some(effect_tex)) => {
                self.main = RenderPair::new(main_fb, main_tex);
                self.effect = RenderPair::new(effect_fb, effect_tex);
                self.final_pair = self.main;
                Ok(())
            }
            (None, _) => engine_bail_warn!("galaxy3d::SceneManager",
                InvalidResource: "Main framebuffer has no color texture"),
            (_, None) => engine_bail_warn!("galaxy3d::SceneManager",
                InvalidResource: "Effect framebuffer has no color texture"),
        }
    }

    // ===== DIAGNOSTICS =====

    pub fn stats(&self) -> SceneManagerStats {
        SceneManagerStats {
            scenes: self.scenes.len(),
            links: self.links.len(),
            effects: self.effects.len(),
            active_scenes: self.active_scenes.len(),
            active_links: self.active_links.len(),
        }
    }

    /// Log the active scenes and the head link at Debug severity
    pub fn debug_dump(&self) {
        let stats = self.stats();
        engine_debug!("galaxy3d::SceneManager",
            "{} scene(s), {} link(s), {} effect(s), {} active scene(s), {} queued link(s)",
            stats.scenes, stats.links, stats.effects, stats.active_scenes, stats.active_links);

        for key in self.active_scenes.keys() {
            if let Some(scene) = self.scenes.get(key) {
                engine_debug!("galaxy3d::SceneManager", "  active '{}' order={} state={:?} flags={:?}",
                    scene.name(), scene.order(), scene.state, scene.flags());
            }
        }
        if let Some(link) = self.active_links.head().and_then(|key| self.links.get(key)) {
            engine_debug!("galaxy3d::SceneManager", "  link '{}' -> '{}' state={:?}",
                self.scene_name(link.scene_a), self.scene_name(link.scene_b), link.state);
        }
    }

    fn scene_name(&self, key: SceneKey) -> &str {
        self.scenes.get(key).map_or("<destroyed>", |s| s.name())
    }

    // ===== SCENE STATE MACHINE =====

    fn set_scene_state(scene: &mut Scene, state: SceneState) {
        engine_trace!("galaxy3d::SceneManager", "Scene '{}': {:?} -> {:?}",
            scene.info.name, scene.state, state);
        scene.state = state;
    }

    /// Advance a scene's lifecycle by one frame
    ///
    /// Completed loader groups and finished destroys fall through to the
    /// next state within the same call.
    fn update_scene(&mut self, key: SceneKey, dt: f32, load_if_dead: bool) {
        let Some(scene) = self.scenes.get_mut(key) else {
            return;
        };
        if load_if_dead && scene.state == SceneState::Dead {
            Self::set_scene_state(scene, SceneState::LoadResource);
        }

        loop {
            match scene.state {
                SceneState::Dead => return,

                SceneState::Ready => {
                    let frame = SceneFrame {
                        dt,
                        view_id: self.view_id,
                        target: if scene.draw_on_effect_fb {
                            self.effect.frame_buffer
                        } else {
                            self.main.frame_buffer
                        },
                        must_clear: scene.draw_on_effect_fb,
                    };
                    scene.callbacks.update(&scene.info, &frame);
                    self.view_id = self.view_id.wrapping_add(1);
                    return;
                }

                SceneState::LoadResource | SceneState::UnloadResource => {
                    let loading = scene.state == SceneState::LoadResource;
                    if scene.load_group.is_none() {
                        self.loader.begin_group(scene.loading_scheme);
                        if loading {
                            scene.callbacks.load_resources(&scene.info, self.loader.as_mut());
                        } else {
                            scene.callbacks.unload_resources(&scene.info, self.loader.as_mut());
                        }
                        scene.load_group = match self.loader.end_group() {
                            Ok(group) => Some(group),
                            Err(err) => {
                                engine_warn!("galaxy3d::SceneManager",
                                    "Scene '{}': loader group not closed ({}), treating it as done",
                                    scene.info.name, err);
                                None
                            }
                        };
                    }

                    let done = match scene.load_group {
                        Some(group) => self.loader.check_group_done(group),
                        None => true,
                    };
                    if !done {
                        return;
                    }
                    scene.load_group = None;

                    if loading {
                        Self::set_scene_state(scene, SceneState::Create);
                    } else {
                        Self::set_scene_state(scene, SceneState::Dead);
                        return;
                    }
                }

                SceneState::Create => {
                    match scene.callbacks.create_objects(&scene.info) {
                        CallbackResult::Repeat => {}
                        CallbackResult::Finished => Self::set_scene_state(scene, SceneState::Ready),
                        CallbackResult::Failed => {
                            engine_warn!("galaxy3d::SceneManager", "Creating scene '{}' failed", scene.info.name);
                            Self::set_scene_state(scene, SceneState::Ready);
                        }
                    }
                    return;
                }

                SceneState::Destroy => {
                    match scene.callbacks.destroy_objects(&scene.info) {
                        CallbackResult::Repeat => return,
                        CallbackResult::Finished => {}
                        CallbackResult::Failed => {
                            engine_warn!("galaxy3d::SceneManager", "Destroying scene '{}' failed", scene.info.name);
                        }
                    }
                    Self::set_scene_state(scene, SceneState::UnloadResource);
                }
            }
        }
    }

    fn check_drain_limit(&self, key: SceneKey, iterations: u32, what: &str) -> Result<()> {
        if let Some(limit) = self.config.drain_iteration_limit {
            if iterations >= limit {
                engine_bail!("galaxy3d::SceneManager",
                    Timeout: "Scene '{}' {} did not finish within {} iterations",
                    self.scene_name(key), what, limit);
            }
        }
        Ok(())
    }

    /// Block until the scene is Ready
    fn preload_scene(&mut self, key: SceneKey) -> Result<()> {
        let dt = self.config.drain_step_dt;
        let mut iterations = 0;
        while self.scene_state(key).is_some_and(|s| s != SceneState::Ready) {
            self.check_drain_limit(key, iterations, "preload")?;
            self.loader.step(dt);
            self.update_scene(key, dt, true);
            iterations += 1;
            std::thread::yield_now();
        }
        Ok(())
    }

    /// Block until the scene is Dead, finishing any load in progress first
    fn drain_scene(&mut self, key: SceneKey) -> Result<()> {
        let dt = self.config.drain_step_dt;
        let mut iterations = 0;
        loop {
            match self.scenes.get_mut(key) {
                None => return Ok(()),
                Some(scene) => match scene.state {
                    SceneState::Dead => return Ok(()),
                    SceneState::Ready => Self::set_scene_state(scene, SceneState::Destroy),
                    _ => {}
                },
            }
            self.check_drain_limit(key, iterations, "destroy")?;
            self.loader.step(dt);
            self.update_scene(key, dt, false);
            iterations += 1;
            std::thread::yield_now();
        }
    }

    fn notify_enter(&mut self, key: SceneKey, prev: Option<SceneKey>) {
        let prev_info = prev.and_then(|p| self.scenes.get(p)).map(|s| s.info.clone());
        if let Some(scene) = self.scenes.get_mut(key) {
            scene.callbacks.on_enter(&scene.info, prev_info.as_ref());
        }
    }

    fn notify_exit(&mut self, key: SceneKey, next: SceneKey) -> bool {
        let Some(next_info) = self.scenes.get(next).map(|s| s.info.clone()) else {
            return true;
        };
        match self.scenes.get_mut(key) {
            Some(scene) => scene.callbacks.on_exit(&scene.info, &next_info),
            None => true,
        }
    }

    fn delay_next_scene(&mut self, key: SceneKey) -> bool {
        self.scenes
            .get_mut(key)
            .is_some_and(|scene| scene.callbacks.delay_next_scene(&scene.info))
    }

    // ===== LINK STATE MACHINE =====

    /// Advance the head link; state changes fall through within the frame
    fn update_link(&mut self, key: SceneLinkKey, dt: f32, render_size: UVec2) {
        let Some(mut link) = self.links.get(key).cloned() else {
            self.active_links.remove(key);
            return;
        };

        if link.state == LinkState::InA && !link.exit_begun && !self.active_scenes.contains(link.scene_a) {
            engine_trace!("galaxy3d::SceneManager",
                "Queued link dropped: source scene '{}' is no longer active", self.scene_name(link.scene_a));
            self.active_links.remove(key);
            return;
        }

        loop {
            let advanced = match link.state {
                LinkState::InA => self.step_link_exit(&mut link, dt, render_size),
                LinkState::InLoad => self.step_link_load(&mut link, dt),
                LinkState::InB => self.step_link_enter(key, &mut link, dt, render_size),
            };
            if !advanced {
                break;
            }
        }

        if let Some(slot) = self.links.get_mut(key) {
            *slot = link;
        }
    }

    fn step_link_exit(&mut self, link: &mut SceneLink, dt: f32, render_size: UVec2) -> bool {
        if !self.play_link_effect(link.exit_effect.as_ref(), &mut link.exit_begun, link.scene_a, dt, render_size) {
            return false;
        }
        link.state = LinkState::InLoad;
        true
    }

    fn step_link_load(&mut self, link: &mut SceneLink, dt: f32) -> bool {
        let (scene_a, scene_b) = (link.scene_a, link.scene_b);

        // Loading scene may be added before it is Ready; the frame loop loads it
        if let Some(load) = link.load_scene {
            if let Some(order) = self.scenes.get(load).map(|s| s.info.order) {
                if self.active_scenes.insert(load, order) {
                    self.notify_enter(load, Some(scene_a));
                }
            }
        }

        if self.scene_state(scene_b) != Some(SceneState::Ready) {
            self.update_scene(scene_b, dt, true);
            if self.scene_state(scene_b) != Some(SceneState::Ready) {
                return false;
            }
        }

        let b_overlay = self.scenes.get(scene_b).is_some_and(|s| s.info.is_overlay());
        if !b_overlay {
            if !link.exit_resolved {
                link.exit_resolved = true;
                if self.notify_exit(scene_a, scene_b) {
                    self.active_scenes.remove(scene_a);
                    link.destroy_a = self.scenes.get(scene_a).is_some_and(|s| !s.info.is_cache_always());
                }
            }

            if link.destroy_a {
                if let Some(scene) = self.scenes.get_mut(scene_a) {
                    if scene.state == SceneState::Ready {
                        Self::set_scene_state(scene, SceneState::Destroy);
                    }
                }
                if self.scene_state(scene_a).is_some_and(|s| s != SceneState::Dead) {
                    self.update_scene(scene_a, dt, false);
                }
            }
        }

        let a_clear = b_overlay
            || !link.destroy_a
            || self.scene_state(scene_a).map_or(true, |s| s == SceneState::Dead);
        if !a_clear {
            return false;
        }
        if let Some(load) = link.load_scene {
            if self.delay_next_scene(load) {
                return false;
            }
            if self.active_scenes.remove(load) {
                self.notify_exit(load, scene_b);
            }
        }

        if let Some(order) = self.scenes.get(scene_b).map(|s| s.info.order) {
            self.active_scenes.insert(scene_b, order);
        }
        self.notify_enter(scene_b, Some(scene_a));
        link.state = LinkState::InB;
        true
    }

    fn step_link_enter(&mut self, key: SceneLinkKey, link: &mut SceneLink, dt: f32, render_size: UVec2) -> bool {
        if !self.play_link_effect(link.enter_effect.as_ref(), &mut link.enter_begun, link.scene_b, dt, render_size) {
            return false;
        }
        self.active_links.remove(key);
        link.reset();
        engine_debug!("galaxy3d::SceneManager", "Scene link '{}' -> '{}' finished",
            self.scene_name(link.scene_a), self.scene_name(link.scene_b));
        false
    }

    /// Render one frame of a link side's effect
    ///
    /// Returns true once the side is finished: the effect reported done, or
    /// there is no usable effect.
    fn play_link_effect(
        &mut self,
        effect: Option<&LinkEffect>,
        begun: &mut bool,
        scene: SceneKey,
        dt: f32,
        render_size: UVec2,
    ) -> bool {
        let Some(effect) = effect else {
            return true;
        };
        if !self.effects.is_initialized(effect.id) {
            // Resources lost mid-run: close the run as if it had finished
            if *begun {
                if let Some(fx) = self.effects.effect_mut(effect.id) {
                    fx.end();
                }
                *begun = false;
                if let Some(scene) = self.scenes.get_mut(scene) {
                    scene.draw_on_effect_fb = false;
                }
            }
            return true;
        }
        let overlay = self.scenes.get(scene).is_some_and(|s| s.info.is_overlay());
        let Some(fx) = self.effects.effect_mut(effect.id) else {
            return true;
        };

        if !*begun {
            fx.begin(effect.params(), self.view_id);
            *begun = true;
            if let Some(scene) = self.scenes.get_mut(scene) {
                scene.draw_on_effect_fb = overlay;
            }
        }

        // Overlay scenes draw into the effect buffer, composited onto main
        let pass = if overlay {
            EffectPass {
                dt,
                view_id: self.view_id,
                target: self.main.frame_buffer,
                source: self.effect.texture,
                render_size,
            }
        } else {
            self.final_pair = self.effect;
            EffectPass {
                dt,
                view_id: self.view_id,
                target: self.effect.frame_buffer,
                source: self.main.texture,
                render_size,
            }
        };
        {
            let mut device = lock_device(&self.device);
            fx.render(&mut *device, &pass);
        }

        if !fx.is_done() {
            return false;
        }
        fx.end();
        *begun = false;
        if let Some(scene) = self.scenes.get_mut(scene) {
            scene.draw_on_effect_fb = false;
        }
        true
    }

    /// Drop every link using `scene` as source or destination
    fn purge_links(&mut self, scene: SceneKey) {
        let doomed: Vec<SceneLinkKey> = self.links
            .iter()
            .filter(|(_, link)| link.uses_scene(scene))
            .map(|(key, _)| key)
            .collect();

        for key in doomed {
            if self.active_links.remove(key) {
                if let Some(link) = self.links.get(key).cloned() {
                    self.abort_link(&link, scene);
                }
            }
            self.links.remove(key);
        }

        for link in self.links.values_mut() {
            if link.load_scene == Some(scene) {
                link.load_scene = None;
            }
        }
    }

    /// Unwind an in-flight link whose endpoint `destroyed` is going away
    fn abort_link(&mut self, link: &SceneLink, destroyed: SceneKey) {
        engine_debug!("galaxy3d::SceneManager", "Aborting in-flight link '{}' -> '{}'",
            self.scene_name(link.scene_a), self.scene_name(link.scene_b));

        for (effect, begun) in [(&link.exit_effect, link.exit_begun), (&link.enter_effect, link.enter_begun)] {
            if let (Some(effect), true) = (effect, begun) {
                if let Some(fx) = self.effects.effect_mut(effect.id) {
                    fx.end();
                }
            }
        }
        for key in [link.scene_a, link.scene_b] {
            if let Some(scene) = self.scenes.get_mut(key) {
                scene.draw_on_effect_fb = false;
            }
        }
        if let Some(load) = link.load_scene {
            self.active_scenes.remove(load);
        }

        // A released source left mid-destroy is finished here
        if link.destroy_a && link.scene_a != destroyed {
            if let Err(err) = self.drain_scene(link.scene_a) {
                engine_warn!("galaxy3d::SceneManager", "Source scene drain failed: {}", err);
            }
        }
        // Fall back to a source that is still alive
        if link.exit_resolved && link.scene_a != destroyed && link.state != LinkState::InB {
            self.add_active_scene(link.scene_a);
        }
    }
}

impl Drop for SceneManager {
    /// Drains every active scene to Dead and destroys the effects
    fn drop(&mut self) {
        for key in self.active_scenes.keys() {
            if let Err(err) = self.destroy_scene(key) {
                engine_warn!("galaxy3d::SceneManager", "Scene shutdown failed: {}", err);
            }
        }
        let mut device = lock_device(&self.device);
        self.effects.destroy_all(&mut *device);
    }
}

#[cfg(test)]
#[path = "scene_manager_tests.rs"]
mod tests;
