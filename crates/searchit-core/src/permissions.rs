//! Radio permission gate.
//!
//! Mobile platforms put scanning and connecting behind runtime prompts. The
//! scan controller asks a [`PermissionGate`] before touching the radio and
//! treats any refused capability as a refusal of all of them.

use std::future::Future;
use std::sync::Arc;

use serde::Serialize;

use crate::types::Capability;

/// Per-capability answer from the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PermissionReport {
    statuses: Vec<(Capability, bool)>,
}

impl PermissionReport {
    /// A report with every listed capability granted.
    #[must_use]
    pub fn all_granted(capabilities: &[Capability]) -> Self {
        capabilities.iter().map(|&cap| (cap, true)).collect()
    }

    /// Returns `true` only if every capability in [`Capability::REQUIRED`]
    /// was reported and granted.
    #[must_use]
    pub fn is_granted(&self) -> bool {
        self.denied().is_empty()
    }

    /// The required capabilities that were refused or left unanswered.
    #[must_use]
    pub fn denied(&self) -> Vec<Capability> {
        Capability::REQUIRED
            .into_iter()
            .filter(|&cap| !self.granted(cap))
            .collect()
    }

    fn granted(&self, capability: Capability) -> bool {
        let mut answers = self.statuses.iter().filter(|&&(cap, _)| cap == capability);
        answers.clone().next().is_some() && answers.all(|&(_, granted)| granted)
    }
}

impl FromIterator<(Capability, bool)> for PermissionReport {
    fn from_iter<I: IntoIterator<Item = (Capability, bool)>>(iter: I) -> Self {
        Self {
            statuses: iter.into_iter().collect(),
        }
    }
}

/// Platform collaborator that prompts for radio permissions.
pub trait PermissionGate: Send + Sync + 'static {
    /// Ask for `capabilities`, prompting the user where the platform requires it.
    fn request(
        &self,
        capabilities: &[Capability],
    ) -> impl Future<Output = PermissionReport> + Send;
}

/// Gate for platforms without runtime prompts, such as Linux with BlueZ.
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysGranted;

impl PermissionGate for AlwaysGranted {
    async fn request(&self, capabilities: &[Capability]) -> PermissionReport {
        PermissionReport::all_granted(capabilities)
    }
}

impl<P: PermissionGate> PermissionGate for Arc<P> {
    fn request(
        &self,
        capabilities: &[Capability],
    ) -> impl Future<Output = PermissionReport> + Send {
        (**self).request(capabilities)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_denial_is_denial() {
        let report: PermissionReport = [
            (Capability::Location, true),
            (Capability::Scan, false),
            (Capability::Connect, true),
        ]
        .into_iter()
        .collect();

        assert!(!report.is_granted());
        assert_eq!(report.denied(), vec![Capability::Scan]);
    }

    #[test]
    fn test_missing_capability_is_denial() {
        let empty: PermissionReport = std::iter::empty().collect();
        assert!(!empty.is_granted());
        assert_eq!(empty.denied(), Capability::REQUIRED.to_vec());

        let partial: PermissionReport = [(Capability::Scan, true), (Capability::Connect, true)]
            .into_iter()
            .collect();
        assert!(!partial.is_granted());
        assert_eq!(partial.denied(), vec![Capability::Location]);
    }

    #[tokio::test]
    async fn test_always_granted() {
        let report = AlwaysGranted.request(&Capability::REQUIRED).await;
        assert!(report.is_granted());
        assert!(report.denied().is_empty());
    }
}
