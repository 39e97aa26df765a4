/// Progressive loader - poll-based resource loading in groups
///
/// A group is opened with `begin_group`, filled with jobs, and closed with
/// `end_group`, which hands back a key. Closed groups are advanced by `step`
/// according to their `LoadingScheme`; `check_group_done` is a
/// non-blocking poll.

use std::collections::VecDeque;
use slotmap::{new_key_type, SlotMap};
use crate::error::Result;
use crate::{engine_bail_warn, engine_warn, engine_trace};
use super::loading_scheme::{LoadingScheme, LoadStatus};

new_key_type! {
    /// Key of a closed loader group
    pub struct LoaderGroupKey;
}

/// A unit of load or unload work, polled until it stops reporting Pending
pub type LoadJob = Box<dyn FnMut() -> LoadStatus>;

/// Contract consumed by the scene manager
///
/// Implementations may run the actual I/O anywhere (worker threads, another
/// subsystem). The manager only opens and closes groups, steps the loader
/// once per frame and polls groups for completion.
pub trait ProgressiveLoader {
    /// Open a new group; subsequent `load`/`unload` calls go into it
    fn begin_group(&mut self, scheme: LoadingScheme);

    /// Close the open group
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` if no group is open.
    fn end_group(&mut self) -> Result<LoaderGroupKey>;

    /// Queue a load job into the open group
    fn load(&mut self, job: LoadJob) -> Result<()>;

    /// Queue an unload job into the open group
    fn unload(&mut self, job: LoadJob) -> Result<()>;

    /// Whether every job of the group has finished
    ///
    /// A finished group is released by this call; unknown or released keys
    /// report `true`.
    fn check_group_done(&mut self, group: LoaderGroupKey) -> bool;

    /// Advance pending work by one frame
    fn step(&mut self, dt: f32);
}

// ============================================================================
// Default implementation
// ============================================================================

struct LoadGroup {
    scheme: LoadingScheme,
    jobs: VecDeque<LoadJob>,
    closed: bool,
    frame_counter: u32,
    time_accum: f32,
}

impl LoadGroup {
    fn new(scheme: LoadingScheme) -> Self {
        Self {
            scheme,
            jobs: VecDeque::new(),
            closed: false,
            frame_counter: 0,
            time_accum: 0.0,
        }
    }

    /// Whether the scheme lets the head job advance on this step
    fn tick(&mut self, dt: f32) -> bool {
        match self.scheme {
            LoadingScheme::Sequential => true,
            LoadingScheme::DeltaFrame(frames) => {
                self.frame_counter += 1;
                if self.frame_counter >= frames.max(1) {
                    self.frame_counter = 0;
                    true
                } else {
                    false
                }
            }
            LoadingScheme::DeltaTime(secs) => {
                self.time_accum += dt;
                if self.time_accum >= secs {
                    self.time_accum = 0.0;
                    true
                } else {
                    false
                }
            }
        }
    }
}

/// Single-threaded progressive loader
///
/// Each closed group advances its head job at the pace of its own scheme.
/// Jobs that report `Failed` are dropped with a warning.
pub struct DefaultProgressiveLoader {
    groups: SlotMap<LoaderGroupKey, LoadGroup>,
    /// Closed groups in the order they were closed
    queue: Vec<LoaderGroupKey>,
    open: Option<LoaderGroupKey>,
}

impl DefaultProgressiveLoader {
    pub fn new() -> Self {
        Self {
            groups: SlotMap::with_key(),
            queue: Vec::new(),
            open: None,
        }
    }

    /// Number of groups that have not been released yet (open one included)
    pub fn group_count(&self) -> usize {
        self.groups.len()
    }

    /// Number of jobs still queued across all groups
    pub fn pending_job_count(&self) -> usize {
        self.groups.values().map(|g| g.jobs.len()).sum()
    }

    fn push_job(&mut self, job: LoadJob, what: &str) -> Result<()> {
        let group = match self.open.and_then(|key| self.groups.get_mut(key)) {
            Some(group) => group,
            None => engine_bail_warn!("galaxy3d::Loader",
                InvalidOperation: "Cannot queue {} job: no group is open", what),
        };
        group.jobs.push_back(job);
        Ok(())
    }
}

impl Default for DefaultProgressiveLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ProgressiveLoader for DefaultProgressiveLoader {
    fn begin_group(&mut self, scheme: LoadingScheme) {
        // A group left open is closed implicitly so its jobs still run
        if let Some(previous) = self.open.take() {
            engine_warn!("galaxy3d::Loader", "begin_group called with a group still open, closing it");
            if let Some(group) = self.groups.get_mut(previous) {
                group.closed = true;
                self.queue.push(previous);
            }
        }
        self.open = Some(self.groups.insert(LoadGroup::new(scheme)));
    }

    fn end_group(&mut self) -> Result<LoaderGroupKey> {
        let key = match self.open.take() {
            Some(key) => key,
            None => engine_bail_warn!("galaxy3d::Loader",
                InvalidOperation: "end_group called without an open group"),
        };
        if let Some(group) = self.groups.get_mut(key) {
            group.closed = true;
            engine_trace!("galaxy3d::Loader", "Group closed with {} job(s)", group.jobs.len());
        }
        self.queue.push(key);
        Ok(key)
    }

    fn load(&mut self, job: LoadJob) -> Result<()> {
        self.push_job(job, "load")
    }

    fn unload(&mut self, job: LoadJob) -> Result<()> {
        self.push_job(job, "unload")
    }

    fn check_group_done(&mut self, group: LoaderGroupKey) -> bool {
        let done = match self.groups.get(group) {
            Some(g) => g.closed && g.jobs.is_empty(),
            None => return true,
        };
        if done {
            self.groups.remove(group);
            self.queue.retain(|key| *key != group);
        }
        done
    }

    fn step(&mut self, dt: f32) {
        for key in &self.queue {
            let Some(group) = self.groups.get_mut(*key) else {
                continue;
            };
            if group.jobs.is_empty() || !group.tick(dt) {
                continue;
            }
            let Some(job) = group.jobs.front_mut() else {
                continue;
            };
            match job() {
                LoadStatus::Pending => {}
                LoadStatus::Done => {
                    group.jobs.pop_front();
                }
                LoadStatus::Failed => {
                    engine_warn!("galaxy3d::Loader", "Load job failed, dropping it");
                    group.jobs.pop_front();
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "progressive_loader_tests.rs"]
mod tests;
