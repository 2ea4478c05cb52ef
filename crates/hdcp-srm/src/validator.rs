//! Revocation checks against a loaded SRM.

use std::collections::HashSet;
use std::sync::Arc;

use hdcp_core::{Ksv, ProtocolError, RevocationResult};

use crate::SrmList;

/// Pure revocation checks over a shared, read-only [`SrmList`].
#[derive(Debug, Clone)]
pub struct RevocationValidator {
    srm: Arc<SrmList>,
}

impl RevocationValidator {
    pub fn new(srm: Arc<SrmList>) -> Self {
        Self { srm }
    }

    /// Validator with no list loaded.
    pub fn disabled() -> Self {
        Self::new(Arc::new(SrmList::empty()))
    }

    pub fn srm(&self) -> &SrmList {
        &self.srm
    }

    pub fn is_revoked(&self, ksv: &Ksv) -> bool {
        self.srm.contains(ksv)
    }

    /// First revoked KSV in `ksvs`, if any.
    pub fn first_revoked(&self, ksvs: &[Ksv]) -> Option<Ksv> {
        ksvs.iter().copied().find(|ksv| self.is_revoked(ksv))
    }

    /// Check a downstream topology.
    ///
    /// Returns `Err(DuplicateKsv)` when an ID appears twice, whether or not
    /// a list is loaded. Otherwise reports `NotChecked` without a list and
    /// `Revoked` or `Clean` with one.
    pub fn validate_topology(&self, ksvs: &[Ksv]) -> Result<RevocationResult, ProtocolError> {
        let mut seen = HashSet::with_capacity(ksvs.len());
        for ksv in ksvs {
            if !seen.insert(*ksv) {
                return Err(ProtocolError::DuplicateKsv(*ksv));
            }
        }

        if !self.srm.is_loaded() {
            return Ok(RevocationResult::NotChecked);
        }
        if self.first_revoked(ksvs).is_some() {
            return Ok(RevocationResult::Revoked);
        }
        Ok(RevocationResult::Clean)
    }
}

impl Default for RevocationValidator {
    fn default() -> Self {
        Self::disabled()
    }
}
