/// Bounded active sets of the scene manager
///
/// Both containers live inline (no heap growth). Adding past capacity is a
/// no-op that only warns in debug builds.

use smallvec::SmallVec;
use crate::engine_warn;
use super::scene::SceneKey;
use super::scene_link::SceneLinkKey;

/// Max scenes updated per frame
pub const MAX_ACTIVE_SCENES: usize = 4;

/// Max queued scene links
pub const MAX_ACTIVE_LINKS: usize = 4;

// ============================================================================
// ActiveScenes
// ============================================================================

/// Scenes updated each frame, kept sorted by ascending draw order
#[derive(Debug, Default)]
pub(crate) struct ActiveScenes {
    entries: SmallVec<[(u8, SceneKey); MAX_ACTIVE_SCENES]>,
}

impl ActiveScenes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a scene; returns true only if it was not present before
    pub fn insert(&mut self, key: SceneKey, order: u8) -> bool {
        if self.contains(key) {
            return false;
        }
        if self.entries.len() >= MAX_ACTIVE_SCENES {
            if cfg!(debug_assertions) {
                engine_warn!("galaxy3d::SceneManager",
                    "Active scene array is full ({}), scene not added", MAX_ACTIVE_SCENES);
            }
            return false;
        }
        self.entries.push((order, key));
        self.entries.sort_by_key(|(order, _)| *order);
        true
    }

    /// Remove a scene; returns true only if it was present
    pub fn remove(&mut self, key: SceneKey) -> bool {
        match self.entries.iter().position(|(_, k)| *k == key) {
            Some(index) => {
                self.entries.swap_remove(index);
                self.entries.sort_by_key(|(order, _)| *order);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, key: SceneKey) -> bool {
        self.entries.iter().any(|(_, k)| *k == key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Snapshot of the keys in draw order
    pub fn keys(&self) -> SmallVec<[SceneKey; MAX_ACTIVE_SCENES]> {
        self.entries.iter().map(|(_, k)| *k).collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

// ============================================================================
// ActiveLinks
// ============================================================================

/// FIFO of triggered links; only the head is serviced
#[derive(Debug, Default)]
pub(crate) struct ActiveLinks {
    queue: SmallVec<[SceneLinkKey; MAX_ACTIVE_LINKS]>,
}

impl ActiveLinks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a link; returns true only if it was not queued before
    pub fn push(&mut self, key: SceneLinkKey) -> bool {
        if self.contains(key) {
            return false;
        }
        if self.queue.len() >= MAX_ACTIVE_LINKS {
            if cfg!(debug_assertions) {
                engine_warn!("galaxy3d::SceneManager",
                    "Active link queue is full ({}), link not queued", MAX_ACTIVE_LINKS);
            }
            return false;
        }
        self.queue.push(key);
        true
    }

    pub fn head(&self) -> Option<SceneLinkKey> {
        self.queue.first().copied()
    }

    /// Remove a link wherever it sits in the queue
    pub fn remove(&mut self, key: SceneLinkKey) -> bool {
        match self.queue.iter().position(|k| *k == key) {
            Some(index) => {
                self.queue.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, key: SceneLinkKey) -> bool {
        self.queue.contains(&key)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn keys(&self) -> SmallVec<[SceneLinkKey; MAX_ACTIVE_LINKS]> {
        self.queue.clone()
    }

    pub fn clear(&mut self) {
        self.queue.clear();
    }
}

#[cfg(test)]
#[path = "active_set_tests.rs"]
mod tests;
