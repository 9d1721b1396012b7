//! Reconciliation of an item's persisted codes with its desired codes, and
//! batch issuance for newly created items.
//!
//! The reconciler is stateless; it reads the persisted set through the
//! registry, diffs it against the desired set and applies the delta. It is
//! not atomic as a whole: the delete batch and each issuance commit
//! separately, and a retry after a partial failure converges because
//! codes already present are left alone.

use std::collections::BTreeSet;

use serde::Serialize;
use tracing::{info, warn};

use crate::code::{CodeGenerator, IdentityCode};
use crate::registry::{CodeRegistry, IssueError, IssuedCode, RegistryError};
use crate::store::{CodeStore, ItemId};

/// The delta between an item's persisted and desired code sets.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcilePlan {
    /// Persisted codes that are no longer desired.
    pub to_delete: BTreeSet<IdentityCode>,

    /// Desired codes that are not persisted yet.
    pub to_add: BTreeSet<IdentityCode>,

    /// Codes present in both sets; left untouched.
    pub retained: BTreeSet<IdentityCode>,
}

impl ReconcilePlan {
    /// Computes the delta between `existing` and `desired`.
    #[must_use]
    pub fn diff(existing: &BTreeSet<IdentityCode>, desired: &BTreeSet<IdentityCode>) -> Self {
        Self {
            to_delete: existing.difference(desired).cloned().collect(),
            to_add: desired.difference(existing).cloned().collect(),
            retained: existing.intersection(desired).cloned().collect(),
        }
    }

    /// Returns true if applying the plan would change nothing.
    #[must_use]
    pub fn is_noop(&self) -> bool {
        self.to_delete.is_empty() && self.to_add.is_empty()
    }
}

/// A desired code that was already owned by another item and was replaced
/// with a freshly generated one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Substitution {
    /// The code that was asked for.
    pub requested: IdentityCode,

    /// The code that was issued instead.
    pub issued: IssuedCode,
}

/// Outcome of [`Reconciler::reconcile`].
#[derive(Debug, Default, Serialize)]
pub struct ReconcileReport {
    /// Codes removed from the item.
    pub deleted: BTreeSet<IdentityCode>,

    /// Codes kept as they were.
    pub retained: BTreeSet<IdentityCode>,

    /// Desired codes issued verbatim.
    pub added: Vec<IssuedCode>,

    /// Desired codes replaced by generated ones.
    pub substituted: Vec<Substitution>,

    /// Desired codes that could not be issued.
    #[serde(serialize_with = "serialize_failures")]
    pub failed: Vec<(IdentityCode, IssueError)>,
}

impl ReconcileReport {
    /// Returns true if every desired code was issued verbatim.
    #[must_use]
    pub fn is_exact(&self) -> bool {
        self.substituted.is_empty() && self.failed.is_empty()
    }
}

/// Outcome of [`Reconciler::issue_batch`].
#[derive(Debug, Default, Serialize)]
pub struct BatchReport {
    /// Number of codes that were requested.
    pub requested: usize,

    /// Codes issued, in issuance order.
    pub issued: Vec<IssuedCode>,

    /// Issuance attempts that failed.
    #[serde(serialize_with = "serialize_errors")]
    pub failures: Vec<IssueError>,
}

impl BatchReport {
    /// Returns true if every requested code was issued.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.issued.len() == self.requested
    }
}

fn serialize_failures<S: serde::Serializer>(
    failures: &[(IdentityCode, IssueError)],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(
        failures
            .iter()
            .map(|(code, err)| (code.as_str(), err.to_string())),
    )
}

fn serialize_errors<S: serde::Serializer>(
    errors: &[IssueError],
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_seq(errors.iter().map(ToString::to_string))
}

/// Drives a [`CodeRegistry`] to bring items to their desired code sets.
pub struct Reconciler<'r, S, G> {
    registry: &'r CodeRegistry<S, G>,
}

impl<'r, S: CodeStore, G: CodeGenerator> Reconciler<'r, S, G> {
    /// Creates a reconciler over `registry`.
    #[must_use]
    pub const fn new(registry: &'r CodeRegistry<S, G>) -> Self {
        Self { registry }
    }

    /// Makes `item_id` own exactly `desired`.
    ///
    /// Codes no longer desired are deleted first; each newly desired code is
    /// then issued as a preferred code. A desired code already owned by a
    /// different item is replaced by a generated one and reported in
    /// [`ReconcileReport::substituted`]. Codes in both sets are not touched
    /// and keep their verification counts.
    ///
    /// # Errors
    ///
    /// Returns an error if the persisted set cannot be read or the delete
    /// batch cannot be committed; nothing is issued in that case.
    /// Individual issuance failures are reported in
    /// [`ReconcileReport::failed`] instead.
    pub fn reconcile(
        &self,
        item_id: ItemId,
        desired: &BTreeSet<IdentityCode>,
    ) -> Result<ReconcileReport, RegistryError> {
        let existing = self.registry.codes_for_item(item_id)?;
        let plan = ReconcilePlan::diff(&existing, desired);

        self.registry.delete_codes(&plan.to_delete)?;

        let mut report = ReconcileReport {
            deleted: plan.to_delete,
            retained: plan.retained,
            ..ReconcileReport::default()
        };

        for code in plan.to_add {
            match self.registry.issue(item_id, Some(&code)) {
                Ok(issued) if issued.code == code => report.added.push(issued),
                Ok(issued) => {
                    warn!(
                        %item_id,
                        requested = %code,
                        issued = %issued.code,
                        "desired code belongs to another item, issued a fresh one"
                    );
                    report.substituted.push(Substitution {
                        requested: code,
                        issued,
                    });
                },
                Err(err) => {
                    warn!(%item_id, requested = %code, error = %err, "failed to add desired code");
                    report.failed.push((code, err));
                },
            }
        }

        info!(
            %item_id,
            deleted = report.deleted.len(),
            retained = report.retained.len(),
            added = report.added.len(),
            substituted = report.substituted.len(),
            failed = report.failed.len(),
            "reconciled identity codes"
        );
        Ok(report)
    }

    /// Issues `quantity` generated codes to `item_id`.
    ///
    /// Exactly `quantity` issuance attempts are made. A failed attempt is
    /// logged and recorded and the batch carries on; check
    /// [`BatchReport::is_complete`] to see whether every code was issued.
    pub fn issue_batch(&self, item_id: ItemId, quantity: usize) -> BatchReport {
        let mut report = BatchReport {
            requested: quantity,
            issued: Vec::with_capacity(quantity),
            failures: Vec::new(),
        };

        for _ in 0..quantity {
            match self.registry.issue(item_id, None) {
                Ok(issued) => report.issued.push(issued),
                Err(err) => {
                    warn!(%item_id, error = %err, "batch issuance attempt failed");
                    report.failures.push(err);
                },
            }
        }

        info!(
            %item_id,
            requested = quantity,
            issued = report.issued.len(),
            "issued identity codes"
        );
        report
    }
}
