//! Staleness tracking against the repository

use crate::descriptor::EntityDescriptor;
use crate::repository::VersionToken;
use docmodel_types::DocumentId;
use tracing::{debug, warn};

/// Remembers the version a document was loaded (or saved) with and flips to
/// staled once the repository reports a different one.
///
/// Staled is sticky: only [`DocumentRepositoryStatus::mark_not_staled`]
/// clears it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentRepositoryStatus {
    staled: bool,
    version: Option<VersionToken>,
}

impl DocumentRepositoryStatus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_staled(&self) -> bool {
        self.staled
    }

    pub fn version(&self) -> Option<&VersionToken> {
        self.version.as_ref()
    }

    /// Compare the remembered version with the repository's current one.
    ///
    /// Never fails: documents that were never persisted are not staled, and
    /// a failing version lookup counts as staled.
    pub fn check_staled(&mut self, entity: &EntityDescriptor, id: DocumentId) -> bool {
        if self.staled {
            return true;
        }
        if !id.is_persisted() {
            return false;
        }

        let current = match entity.repository().retrieve_version(entity, id) {
            Ok(current) => current,
            Err(e) => {
                warn!(
                    table = entity.table_name(),
                    id = %id,
                    error = %e,
                    "version lookup failed; treating as stale"
                );
                self.staled = true;
                return true;
            }
        };

        if current != self.version {
            debug!(
                table = entity.table_name(),
                id = %id,
                known = ?self.version,
                current = ?current,
                "document staled"
            );
            self.staled = true;
        }
        self.staled
    }

    pub fn mark_staled(&mut self) {
        self.staled = true;
    }

    /// Clear staled and remember `version` as the new baseline.
    pub fn mark_not_staled(&mut self, version: Option<VersionToken>) {
        self.staled = false;
        self.version = version;
    }

    pub fn copy(&self) -> Self {
        self.clone()
    }
}
