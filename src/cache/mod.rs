pub(crate) mod page_snapshot;

pub use page_snapshot::CanonicalSnapshot;
