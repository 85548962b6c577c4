//! Two independent initialization lifecycles of a synchronizer.
//!
//! Domain readiness (`Uninitialized -> Loading -> Ready`) and storage linkage
//! (`Unlinked <-> Linked`) advance separately, since the storage medium may
//! come up before or after the catalog has answered.

/// Progress of loading the basket from the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DomainPhase {
    #[default]
    Uninitialized,
    Loading,
    Ready,
}

/// Whether the synchronizer is bound to local storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoragePhase {
    #[default]
    Unlinked,
    Linked,
}

/// Guarded state of both lifecycles.
///
/// Each transition returns whether it happened, so callers can make their
/// initialization idempotent without separate flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Lifecycle {
    domain: DomainPhase,
    storage: StoragePhase,
}

impl Lifecycle {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            domain: DomainPhase::Uninitialized,
            storage: StoragePhase::Unlinked,
        }
    }

    #[must_use]
    pub const fn domain(&self) -> DomainPhase {
        self.domain
    }

    #[must_use]
    pub const fn storage(&self) -> StoragePhase {
        self.storage
    }

    #[must_use]
    pub fn is_domain_ready(&self) -> bool {
        self.domain == DomainPhase::Ready
    }

    #[must_use]
    pub fn is_storage_linked(&self) -> bool {
        self.storage == StoragePhase::Linked
    }

    /// `Uninitialized -> Loading`.
    pub fn begin_domain(&mut self) -> bool {
        if self.domain != DomainPhase::Uninitialized {
            return false;
        }
        self.domain = DomainPhase::Loading;
        true
    }

    /// `Loading -> Ready`.
    pub fn complete_domain(&mut self) -> bool {
        if self.domain != DomainPhase::Loading {
            return false;
        }
        self.domain = DomainPhase::Ready;
        true
    }

    /// `Unlinked -> Linked`.
    pub fn link_storage(&mut self) -> bool {
        if self.storage == StoragePhase::Linked {
            return false;
        }
        self.storage = StoragePhase::Linked;
        true
    }

    /// `Linked -> Unlinked`.
    pub fn unlink_storage(&mut self) -> bool {
        if self.storage == StoragePhase::Unlinked {
            return false;
        }
        self.storage = StoragePhase::Unlinked;
        true
    }
}
