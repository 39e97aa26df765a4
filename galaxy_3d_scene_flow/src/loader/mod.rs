//! Progressive resource loading
//!
//! Scenes never block on I/O. Their load/unload work is queued into loader
//! groups which the scene manager polls once per frame.

mod loading_scheme;
mod progressive_loader;

pub use loading_scheme::{LoadingScheme, LoadStatus};
pub use progressive_loader::{
    ProgressiveLoader, DefaultProgressiveLoader, LoaderGroupKey, LoadJob,
};
