//! Integration tests for the scene flow
//!
//! Drive a SceneManager through the public API only, backed by a recording
//! graphics device. No GPU required.
//!
//! Run with: cargo test --test scene_flow_integration_tests


use galaxy_3d_scene_flow::galaxy3d::Error;
use galaxy_3d_scene_flow::galaxy3d::effect::{
    EffectPass, FadeEffect, FadeEffectParams, FadeMode, TransitionEffect,
};
use galaxy_3d_scene_flow::galaxy3d::loader::LoadingScheme;
use galaxy_3d_scene_flow::galaxy3d::render::{GraphicsDevice, ViewId};
use galaxy_3d_scene_flow::galaxy3d::scene::{
    FindSceneMode, LinkState, SceneDesc, SceneFlags, SceneKey, SceneLinkDef, SceneState,
};
use galaxy_3d_scene_flow::glam::{UVec2, Vec4};
use std::collections::HashMap;
use test_utils::{Harness, RecordingDevice};

const SIZE: UVec2 = UVec2::new(640, 360);

fn create(h: &mut Harness, name: &str, flags: SceneFlags) -> SceneKey {
    let callbacks = h.scripted();
    h.manager
        .create_scene(SceneDesc::new(name).with_flags(flags), Box::new(callbacks))
        .unwrap()
}

fn start(h: &mut Harness, entry: SceneKey) {
    h.manager.start(entry, h.main.frame_buffer, h.effect.frame_buffer).unwrap();
}

fn run_frames(h: &mut Harness, frames: usize, dt: f32) {
    for _ in 0..frames {
        h.manager.update(dt, 0, SIZE);
    }
}

/// Checks every scene's callback order against the lifecycle
///
/// load -> create+ -> (enter | update | exit)* -> destroy+ -> unload, repeated.
fn assert_lifecycle_order(events: &[String]) {
    #[derive(Clone, Copy, PartialEq, Debug)]
    enum Phase { Dead, Loading, Creating, Ready, Destroying }

    let mut phases: HashMap<&str, Phase> = HashMap::new();
    for event in events {
        let (scene, call) = event.split_once(':').unwrap();
        let call = call.split('(').next().unwrap();
        let phase = phases.entry(scene).or_insert(Phase::Dead);
        let next = match (*phase, call) {
            (Phase::Dead, "load") => Phase::Loading,
            (Phase::Loading | Phase::Creating, "create") => Phase::Creating,
            (Phase::Creating | Phase::Ready, "enter" | "update" | "exit") => Phase::Ready,
            (Phase::Creating | Phase::Ready | Phase::Destroying, "destroy") => Phase::Destroying,
            (Phase::Destroying, "unload") => Phase::Dead,
            (from, call) => panic!("'{}' called '{}' while {:?}", scene, call, from),
        };
        *phase = next;
    }
}

// ============================================================================
// PROPERTY TESTS
// ============================================================================

#[test]
fn test_integration_lifecycle_order_over_round_trips() {
    let mut h = Harness::new();
    let menu = create(&mut h, "menu", SceneFlags::PRELOAD);
    let level = {
        let callbacks = h.scripted().with_load_polls(&[2, 3]).with_create_repeats(2);
        h.manager.create_scene(SceneDesc::new("level"), Box::new(callbacks)).unwrap()
    };
    let hud = create(&mut h, "hud", SceneFlags::OVERLAY);
    let play = h.manager.link_scene(SceneLinkDef::new(menu, level)).unwrap();
    let show_hud = h.manager.link_scene(SceneLinkDef::new(level, hud)).unwrap();
    let back = h.manager.link_scene(SceneLinkDef::new(level, menu)).unwrap();
    start(&mut h, menu);

    for _ in 0..3 {
        assert!(h.manager.trigger_scene_link(play));
        run_frames(&mut h, 10, 0.016);
        assert!(h.manager.is_scene_active(level));

        assert!(h.manager.trigger_scene_link(show_hud));
        run_frames(&mut h, 2, 0.016);
        assert!(h.manager.is_scene_active(hud));

        h.manager.remove_active_scene(hud);
        assert!(h.manager.trigger_scene_link(back));
        run_frames(&mut h, 2, 0.016);
        assert_eq!(h.manager.active_scenes(), vec![menu]);
    }

    assert_lifecycle_order(&h.events());
}

#[test]
fn test_integration_add_active_scene_idempotent() {
    let mut h = Harness::new();
    let a = create(&mut h, "a", SceneFlags::PRELOAD);

    h.manager.add_active_scene(a);
    let count = h.manager.active_scene_count();
    h.manager.add_active_scene(a);
    assert_eq!(h.manager.active_scene_count(), count);
}

#[test]
fn test_integration_link_state_round_trip() {
    let mut h = Harness::new();
    let a = create(&mut h, "a", SceneFlags::PRELOAD);
    let b = create(&mut h, "b", SceneFlags::empty());
    let params = FadeEffectParams::new(Vec4::ONE, 0.1, 0.5);
    let link = h.manager
        .link_scene(
            SceneLinkDef::new(a, b)
                .with_exit_effect("FadeOut", params.as_bytes())
                .with_enter_effect("FadeIn", params.as_bytes()),
        )
        .unwrap();
    start(&mut h, a);

    assert_eq!(h.manager.scene_link(link).unwrap().state(), LinkState::InA);
    h.manager.trigger_scene_link(link);

    let mut seen = Vec::new();
    while h.manager.active_link_count() > 0 {
        h.manager.update(0.05, 0, SIZE);
        seen.push(h.manager.scene_link(link).unwrap().state());
        assert!(seen.len() < 20, "link never finished");
    }

    assert!(seen.contains(&LinkState::InB));
    assert_eq!(h.manager.scene_link(link).unwrap().state(), LinkState::InA);
}

#[test]
fn test_integration_trigger_requires_active_source() {
    let mut h = Harness::new();
    let a = create(&mut h, "a", SceneFlags::PRELOAD);
    let b = create(&mut h, "b", SceneFlags::PRELOAD);
    let c = create(&mut h, "c", SceneFlags::empty());
    let from_b = h.manager.link_scene(SceneLinkDef::new(b, c)).unwrap();
    start(&mut h, a);

    let before = h.manager.active_link_count();
    assert!(!h.manager.trigger_scene_link(from_b));
    assert_eq!(h.manager.active_link_count(), before);
}

// ============================================================================
// SCENARIO TESTS
// ============================================================================

#[test]
fn test_integration_preload_is_blocking() {
    let mut h = Harness::new();
    let callbacks = h.scripted().with_load_polls(&[5, 1, 3]).with_create_repeats(4);
    let a = h.manager
        .create_scene(SceneDesc::new("a").with_flags(SceneFlags::PRELOAD), Box::new(callbacks))
        .unwrap();

    assert_eq!(h.manager.scene_state(a), Some(SceneState::Ready));
}

#[test]
fn test_integration_link_destroys_source() {
    let mut h = Harness::new();
    let a = create(&mut h, "a", SceneFlags::PRELOAD);
    let b = {
        let callbacks = h.scripted().with_load_polls(&[3]);
        h.manager.create_scene(SceneDesc::new("b"), Box::new(callbacks)).unwrap()
    };
    let link = h.manager.link_scene(SceneLinkDef::new(a, b)).unwrap();
    start(&mut h, a);
    assert_eq!(h.manager.scene_state(b), Some(SceneState::Dead));

    h.manager.trigger_scene_link(link);
    run_frames(&mut h, 6, 0.016);

    assert!(h.manager.is_scene_active(b));
    assert!(!h.manager.is_scene_active(a));
    assert_eq!(h.manager.scene_state(a), Some(SceneState::Dead));
}

#[test]
fn test_integration_cache_always_source_survives() {
    let mut h = Harness::new();
    let a = create(&mut h, "a", SceneFlags::PRELOAD | SceneFlags::CACHE_ALWAYS);
    let b = create(&mut h, "b", SceneFlags::empty());
    let link = h.manager.link_scene(SceneLinkDef::new(a, b)).unwrap();
    start(&mut h, a);

    h.manager.trigger_scene_link(link);
    run_frames(&mut h, 3, 0.016);

    assert!(h.manager.is_scene_active(b));
    assert!(!h.manager.is_scene_active(a));
    assert_eq!(h.manager.scene_state(a), Some(SceneState::Ready));
    assert!(!h.events().contains(&"a:destroy".to_string()));
}

#[test]
fn test_integration_overlay_keeps_source() {
    let mut h = Harness::new();
    let a = create(&mut h, "a", SceneFlags::PRELOAD);
    let b = create(&mut h, "b", SceneFlags::OVERLAY);
    let link = h.manager.link_scene(SceneLinkDef::new(a, b)).unwrap();
    start(&mut h, a);

    h.manager.trigger_scene_link(link);
    run_frames(&mut h, 3, 0.016);

    assert!(h.manager.is_scene_active(a));
    assert!(h.manager.is_scene_active(b));
}

#[test]
fn test_integration_refused_exit_keeps_source() {
    let mut h = Harness::new();
    let a = {
        let callbacks = h.scripted().refusing_exit();
        h.manager
            .create_scene(SceneDesc::new("a").with_flags(SceneFlags::PRELOAD), Box::new(callbacks))
            .unwrap()
    };
    let b = create(&mut h, "b", SceneFlags::empty());
    let link = h.manager.link_scene(SceneLinkDef::new(a, b)).unwrap();
    start(&mut h, a);

    h.manager.trigger_scene_link(link);
    run_frames(&mut h, 2, 0.016);

    assert!(h.manager.is_scene_active(a));
    assert!(h.manager.is_scene_active(b));
    assert!(h.events().contains(&"a:exit(b)".to_string()));
    assert!(h.events().contains(&"b:enter(a)".to_string()));
}

#[test]
fn test_integration_duplicate_effect_registration() {
    let mut h = Harness::new();
    let count = h.manager.effect_count();

    let result = h.manager.register_effect(
        "FadeIn",
        Box::new(FadeEffect::new(FadeMode::FadeIn)),
        FadeEffect::PARAM_SIZE,
    );
    assert!(matches!(result, Err(Error::AlreadyExists(_))));
    assert_eq!(h.manager.effect_count(), count);
}

#[test]
fn test_integration_fade_done_after_duration() {
    let mut device = RecordingDevice::default();
    let target = device.create_frame_buffer();
    let source = device.create_frame_buffer();
    let mut fade = FadeEffect::new(FadeMode::FadeOut);
    assert!(fade.create(&mut device));

    let params = FadeEffectParams::new(Vec4::new(0.0, 0.0, 0.0, 1.0), 0.5, 0.2);
    fade.begin(params.as_bytes(), 0);
    let pass = EffectPass {
        dt: 0.1,
        view_id: 0,
        target: target.frame_buffer,
        source: source.texture,
        render_size: SIZE,
    };

    let mut total = 0.0f32;
    while total < 0.5 - 1.0e-4 {
        assert!(!fade.is_done());
        fade.render(&mut device, &pass);
        total += pass.dt;
    }
    assert!(fade.is_done());
    fade.end();
    fade.destroy(&mut device);
    assert!(device.program_labels().is_empty());
}

// ============================================================================
// EFFECTS AND COMPOSITING
// ============================================================================

/// Effect finishing after a fixed number of renders, without any draw
struct CountdownEffect {
    frames: u32,
    remaining: u32,
}

impl TransitionEffect for CountdownEffect {
    fn create(&mut self, _device: &mut dyn GraphicsDevice) -> bool {
        true
    }
    fn destroy(&mut self, _device: &mut dyn GraphicsDevice) {}
    fn begin(&mut self, params: &[u8], _view_id: ViewId) {
        self.remaining = params.first().map_or(self.frames, |n| u32::from(*n));
    }
    fn render(&mut self, _device: &mut dyn GraphicsDevice, _pass: &EffectPass) {
        self.remaining = self.remaining.saturating_sub(1);
    }
    fn end(&mut self) {}
    fn is_done(&self) -> bool {
        self.remaining == 0
    }
}

#[test]
fn test_integration_custom_effect_paces_link() {
    let mut h = Harness::new();
    h.manager
        .register_effect("Countdown", Box::new(CountdownEffect { frames: 1, remaining: 0 }), 1)
        .unwrap();
    assert_eq!(h.manager.effect_count(), 5);

    let a = create(&mut h, "a", SceneFlags::PRELOAD);
    let b = create(&mut h, "b", SceneFlags::empty());
    let link = h.manager
        .link_scene(SceneLinkDef::new(a, b).with_exit_effect("Countdown", &[3]))
        .unwrap();
    start(&mut h, a);
    h.manager.trigger_scene_link(link);

    run_frames(&mut h, 2, 0.016);
    assert!(h.manager.is_scene_active(a));
    assert_eq!(h.manager.scene_link(link).unwrap().state(), LinkState::InA);

    run_frames(&mut h, 1, 0.016);
    assert_eq!(h.manager.active_scenes(), vec![b]);
}

#[test]
fn test_integration_oversized_effect_params_rejected() {
    let mut h = Harness::new();
    h.manager
        .register_effect("Countdown", Box::new(CountdownEffect { frames: 1, remaining: 0 }), 1)
        .unwrap();
    let a = create(&mut h, "a", SceneFlags::PRELOAD);
    let b = create(&mut h, "b", SceneFlags::empty());

    let result = h.manager.link_scene(SceneLinkDef::new(a, b).with_exit_effect("Countdown", &[1, 2]));
    assert!(matches!(result, Err(Error::InvalidResource(_))));
    assert_eq!(h.manager.link_count(), 0);
}

#[test]
fn test_integration_fade_out_then_fade_in_output() {
    let mut h = Harness::new();
    let a = create(&mut h, "a", SceneFlags::PRELOAD);
    let b = create(&mut h, "b", SceneFlags::empty());
    let params = FadeEffectParams::new(Vec4::new(0.0, 0.0, 0.0, 1.0), 0.5, 0.5);
    let link = h.manager
        .link_scene(
            SceneLinkDef::new(a, b)
                .with_exit_effect("FadeOut", params.as_bytes())
                .with_enter_effect("FadeIn", params.as_bytes()),
        )
        .unwrap();
    start(&mut h, a);
    h.manager.trigger_scene_link(link);

    // The fade in starts on the frame the fade out ends
    let outputs: Vec<_> = (0..4).map(|_| h.manager.update(0.25, 10, SIZE)).collect();
    for out in &outputs[..3] {
        assert_eq!(out.frame_buffer, h.effect.frame_buffer);
        assert_eq!(out.texture, h.effect.texture);
        assert_eq!(out.view_id, 11);
    }
    assert_eq!(outputs[3].frame_buffer, h.main.frame_buffer);
    assert_eq!(h.manager.active_scenes(), vec![b]);

    let device = h.device.lock().unwrap();
    assert_eq!(device.draws.len(), 4);
    for quad in &device.draws {
        assert_eq!(quad.target, h.effect.frame_buffer);
        assert_eq!(quad.view_id, 11);
        assert_eq!(quad.viewport, SIZE);
        assert_eq!(quad.texture.map(|(_, tex)| tex), Some(h.main.texture));
    }
}

#[test]
fn test_integration_missing_effect_resources_skip_effect() {
    let mut h = Harness::new();
    let a = create(&mut h, "a", SceneFlags::PRELOAD);
    let b = create(&mut h, "b", SceneFlags::empty());
    let link = h.manager
        .link_scene(SceneLinkDef::new(a, b).with_exit_effect("FadeOut", &[]))
        .unwrap();
    start(&mut h, a);

    h.manager.destroy_graphics();
    h.manager.trigger_scene_link(link);
    h.manager.update(0.016, 0, SIZE);
    assert_eq!(h.manager.active_scenes(), vec![b]);
    assert_eq!(h.draw_count(), 0);

    h.manager.reset_graphics(h.main.frame_buffer, h.effect.frame_buffer).unwrap();
    assert_eq!(h.device.lock().unwrap().program_labels().len(), 4);
}

// ============================================================================
// LOADING
// ============================================================================

#[test]
fn test_integration_delta_frame_scheme_paces_loading() {
    let mut h = Harness::new();
    let a = create(&mut h, "a", SceneFlags::PRELOAD);
    let b = {
        let callbacks = h.scripted().with_load_polls(&[1]);
        let desc = SceneDesc::new("b").with_loading_scheme(LoadingScheme::DeltaFrame(3));
        h.manager.create_scene(desc, Box::new(callbacks)).unwrap()
    };
    let link = h.manager.link_scene(SceneLinkDef::new(a, b)).unwrap();
    start(&mut h, a);
    h.manager.trigger_scene_link(link);

    run_frames(&mut h, 3, 0.016);
    assert!(h.manager.is_in_load_state());
    assert_eq!(h.manager.scene_state(b), Some(SceneState::LoadResource));

    run_frames(&mut h, 1, 0.016);
    assert!(!h.manager.is_in_load_state());
    assert_eq!(h.manager.active_scenes(), vec![b]);
}

#[test]
fn test_integration_loading_scene_shown_while_loading() {
    let mut h = Harness::new();
    let a = create(&mut h, "a", SceneFlags::PRELOAD);
    let loading = create(&mut h, "loading", SceneFlags::PRELOAD);
    let b = {
        let callbacks = h.scripted().with_load_polls(&[4]);
        h.manager.create_scene(SceneDesc::new("b"), Box::new(callbacks)).unwrap()
    };
    let link = h.manager
        .link_scene(SceneLinkDef::new(a, b).with_loading_scene(loading))
        .unwrap();
    start(&mut h, a);
    h.manager.trigger_scene_link(link);

    run_frames(&mut h, 2, 0.016);
    assert!(h.manager.is_scene_active(loading));
    assert!(!h.manager.is_scene_active(b));

    run_frames(&mut h, 4, 0.016);
    assert_eq!(h.manager.active_scenes(), vec![b]);

    let events = h.events();
    let enter = events.iter().position(|e| e == "loading:enter(a)").unwrap();
    let exit = events.iter().position(|e| e == "loading:exit(b)").unwrap();
    let b_enter = events.iter().position(|e| e == "b:enter(a)").unwrap();
    assert!(enter < exit && exit < b_enter);
    assert!(events[enter..exit].contains(&"loading:update".to_string()));
}

// ============================================================================
// REGISTRY AND KEYS
// ============================================================================

#[test]
fn test_integration_stale_keys_are_detected() {
    let mut h = Harness::new();
    let old = create(&mut h, "old", SceneFlags::empty());
    let other = create(&mut h, "other", SceneFlags::empty());
    h.manager.destroy_scene(old).unwrap();
    let new = create(&mut h, "new", SceneFlags::empty());

    assert_ne!(old, new);
    assert!(h.manager.scene(old).is_none());
    assert!(matches!(h.manager.destroy_scene(old), Err(Error::NotFound(_))));
    assert!(matches!(h.manager.link_scene(SceneLinkDef::new(old, other)), Err(Error::NotFound(_))));
    assert!(matches!(
        h.manager.start(old, h.main.frame_buffer, h.effect.frame_buffer),
        Err(Error::NotFound(_))
    ));
}

#[test]
fn test_integration_find_and_tags() {
    let mut h = Harness::new();
    let world = {
        let desc = SceneDesc::new("World").with_tag(7).with_flags(SceneFlags::PRELOAD);
        let callbacks = h.scripted();
        h.manager.create_scene(desc, Box::new(callbacks)).unwrap()
    };
    let pause = {
        let desc = SceneDesc::new("Pause").with_tag(7).with_order(3);
        let callbacks = h.scripted();
        h.manager.create_scene(desc, Box::new(callbacks)).unwrap()
    };
    start(&mut h, world);

    assert_eq!(h.manager.find_scene("world", FindSceneMode::Active), Some(world));
    assert_eq!(h.manager.find_scene("pause", FindSceneMode::Active), None);
    assert_eq!(h.manager.find_scenes_by_tag(7, FindSceneMode::All), vec![world, pause]);
    assert_eq!(h.manager.scene(pause).unwrap().order(), 3);
    assert_eq!(h.manager.scene_names(), vec!["World", "Pause"]);
}

#[test]
fn test_integration_drop_destroys_effect_resources() {
    let h = Harness::new();
    let device = h.device.clone();
    assert_eq!(device.lock().unwrap().program_labels().len(), 4);

    drop(h);
    let device = device.lock().unwrap();
    assert!(device.program_labels().is_empty());
    assert_eq!(device.live_uniform_count(), 0);
}
