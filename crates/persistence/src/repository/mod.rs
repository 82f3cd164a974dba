//! Repository layer

mod presets;

pub use presets::{Preset, PresetRepository};
