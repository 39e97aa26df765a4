/// Tests for Scene, SceneDesc and SceneFlags
///
/// These tests validate flag bit values, descriptor building, the initial
/// state of a new scene and typed user data access.

use super::*;
use slotmap::SlotMap;

struct NullCallbacks;

impl SceneCallbacks for NullCallbacks {
    fn update(&mut self, _scene: &SceneInfo, _frame: &SceneFrame) {}
}

fn make_scene(desc: SceneDesc) -> Scene {
    let mut keys: SlotMap<SceneKey, ()> = SlotMap::with_key();
    let key = keys.insert(());
    Scene::new(key, desc, Box::new(NullCallbacks))
}

// ============================================================================
// Tests: Flags
// ============================================================================

#[test]
fn test_flag_bits_are_distinct_powers_of_two() {
    let all = [
        SceneFlags::PRELOAD,
        SceneFlags::CACHE_LEVEL1,
        SceneFlags::CACHE_LEVEL2,
        SceneFlags::CACHE_ALWAYS,
        SceneFlags::OVERLAY,
    ];
    for flag in all {
        assert!(flag.bits().is_power_of_two());
    }
    assert_eq!(SceneFlags::OVERLAY.bits(), 0x0010);
    assert_eq!(SceneFlags::all().bits(), 0x001F);
}

#[test]
fn test_info_flag_helpers() {
    let scene = make_scene(SceneDesc::new("hud").with_flags(SceneFlags::OVERLAY));
    assert!(scene.info().is_overlay());
    assert!(!scene.info().is_cache_always());

    let scene = make_scene(SceneDesc::new("menu").with_flags(SceneFlags::CACHE_ALWAYS | SceneFlags::PRELOAD));
    assert!(scene.info().is_cache_always());
    assert!(!scene.info().is_overlay());
}

// ============================================================================
// Tests: Descriptor / construction
// ============================================================================

#[test]
fn test_desc_defaults() {
    let desc = SceneDesc::new("level");
    assert_eq!(desc.name, "level");
    assert_eq!(desc.tag, 0);
    assert_eq!(desc.flags, SceneFlags::empty());
    assert_eq!(desc.order, 0);
    assert_eq!(desc.loading_scheme, LoadingScheme::Sequential);
    assert!(desc.user_data.is_none());
}

#[test]
fn test_new_scene_is_dead() {
    let scene = make_scene(
        SceneDesc::new("level")
            .with_tag(7)
            .with_order(3)
            .with_loading_scheme(LoadingScheme::DeltaFrame(2)),
    );

    assert_eq!(scene.name(), "level");
    assert_eq!(scene.tag(), 7);
    assert_eq!(scene.order(), 3);
    assert_eq!(scene.state(), SceneState::Dead);
    assert_eq!(scene.loading_scheme(), LoadingScheme::DeltaFrame(2));
    assert!(!scene.is_loading());
    assert!(!scene.draw_on_effect_frame_buffer());
    assert_eq!(scene.info().key, scene.key());
}

// ============================================================================
// Tests: User data
// ============================================================================

#[test]
fn test_user_data_typed_access() {
    let mut scene = make_scene(SceneDesc::new("level").with_user_data(42u32));

    assert_eq!(scene.user_data::<u32>(), Some(&42));
    assert!(scene.user_data::<String>().is_none());

    *scene.user_data_mut::<u32>().unwrap() = 43;
    assert_eq!(scene.user_data::<u32>(), Some(&43));
}

#[test]
fn test_no_user_data() {
    let scene = make_scene(SceneDesc::new("empty"));
    assert!(scene.user_data::<u32>().is_none());
}

// ============================================================================
// Tests: Callback defaults
// ============================================================================

#[test]
fn test_callback_defaults() {
    let scene = make_scene(SceneDesc::new("a"));
    let other = make_scene(SceneDesc::new("b"));
    let mut callbacks = NullCallbacks;

    assert_eq!(callbacks.create_objects(scene.info()), CallbackResult::Finished);
    assert_eq!(callbacks.destroy_objects(scene.info()), CallbackResult::Finished);
    assert!(callbacks.on_exit(scene.info(), other.info()));
    assert!(!callbacks.delay_next_scene(scene.info()));
}
