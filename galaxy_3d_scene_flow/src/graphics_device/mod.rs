/// Graphics device module - renderer contract consumed by the scene flow

pub mod graphics_device;

pub use graphics_device::*;

// Mock graphics device for tests (no GPU required)
#[cfg(test)]
pub mod mock_graphics_device;
