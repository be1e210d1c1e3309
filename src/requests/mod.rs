//! Progress tracking for multi-item media requests (playlists, bulk searches).

pub mod bundle;
pub mod registry;

pub use bundle::{MediaRequest, MediaRequestLifecycleStage, MultiMediaRequestBundle};
pub use registry::{RequestBundleRegistry, SharedRequestBundle};
