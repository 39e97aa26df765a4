/*!
# Galaxy 3D Scene Flow

Scene lifecycle and transition orchestration for the Galaxy 3D engine.

A host application registers scenes (self-contained chunks of content that
load, create, run, destroy and unload), links them with reusable
transitions, and calls `SceneManager::update` once per frame. The manager
drives asynchronous loading through a progressive loader, runs the active
scenes in draw order and composites transition effects across a "main" and
an "effect" framebuffer.

## Architecture

- **SceneManager**: Scene registry, active sets, link queue, frame update
- **Scene / SceneCallbacks**: Six-state lifecycle and host callbacks
- **SceneLink**: Directed transition with optional loading scene and effects
- **TransitionEffect**: Pluggable full-screen effect (built-in fades)
- **ProgressiveLoader**: Poll-based grouped resource loading
- **GraphicsDevice**: The slice of the renderer the scene flow consumes
*/

// Internal modules
mod error;
mod engine;
pub mod log;
pub mod graphics_device;
pub mod loader;
pub mod effect;
pub mod scene;

// Main galaxy3d namespace module
pub mod galaxy3d {
    // Error types
    pub use crate::error::{Error, Result};

    // Logging hub
    pub use crate::engine::Engine;

    // Logging sub-module (types only, NOT macros)
    pub mod log {
        pub use crate::log::{Logger, LogEntry, LogSeverity, DefaultLogger};
    }

    // Graphics device contract
    pub mod render {
        pub use crate::graphics_device::*;
    }

    // Progressive loader
    pub mod loader {
        pub use crate::loader::*;
    }

    // Transition effects
    pub mod effect {
        pub use crate::effect::*;
    }

    // Scenes, links and the scene manager
    pub mod scene {
        pub use crate::scene::*;
    }
}

// Re-export math library at crate root
pub use glam;
