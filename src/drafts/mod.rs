mod overlay;
mod store;

pub use overlay::{Layer, PendingOverlay};
pub use store::DraftStore;
