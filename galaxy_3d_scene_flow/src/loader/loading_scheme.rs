/// Pacing of a loader group, forwarded verbatim from the scene that opens it
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LoadingScheme {
    /// Advance the head job on every step
    Sequential,
    /// Advance the head job every n-th step (0 behaves like 1)
    DeltaFrame(u32),
    /// Advance the head job each time the accumulated dt reaches the given seconds
    DeltaTime(f32),
}

impl Default for LoadingScheme {
    fn default() -> Self {
        LoadingScheme::Sequential
    }
}

/// Result of polling a single load or unload job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStatus {
    /// Still in flight, poll again later
    Pending,
    Done,
    /// Gave up; the job is dropped so its group can still complete
    Failed,
}
