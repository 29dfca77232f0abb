//! Abstract storage and its backends.

pub mod memory;
mod store;
mod traits;

pub use self::{
    store::Store,
    traits::{
        ArtifactStorage,
        ProjectStorage,
        Storage,
        StorageError,
        StorageResult,
        SubmissionAdd,
        SubmissionAddError,
    },
};

use self::memory::{ArtifactStore, ProjectStore};

/// The store the coordinator binary runs with.
pub type MemoryStore = Store<ProjectStore, ArtifactStore>;

/// Creates an in-memory [`Store`].
pub fn memory_store() -> MemoryStore {
    Store::new(ProjectStore::new(), ArtifactStore::new())
}
