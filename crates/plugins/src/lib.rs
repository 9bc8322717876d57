//! Plugins shipped with the huddle runtime.

pub mod bundled;

pub use bundled::{ActionItemsPlugin, TranscriptRecapPlugin, install_bundled};
