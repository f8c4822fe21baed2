//! Optimistic inline edits as a two-phase transaction.
//!
//! `begin` applies the edit tentatively and yields the delta to submit;
//! exactly one of `commit` or `revert` then settles it. Only fields on the
//! editable whitelist ever reach a delta or the tentative row.

use crate::error::TableError;
use crate::model::{EditDelta, Notice, Pk, Row};
use std::collections::{BTreeMap, HashMap};

/// Diff of `edited` against `snapshot`, restricted to `editable`.
pub fn compute_delta(snapshot: &Row, edited: &Row, editable: &[String]) -> EditDelta {
    let mut delta = BTreeMap::new();
    for field in editable {
        if field == "pk" {
            continue;
        }
        let Some(new_value) = edited.fields.get(field) else {
            continue;
        };
        if snapshot.fields.get(field) != Some(new_value) {
            delta.insert(field.clone(), new_value.clone());
        }
    }
    EditDelta(delta)
}

#[derive(Debug, Clone, PartialEq)]
pub struct PendingEdit {
    pub snapshot: Row,
    pub tentative: Row,
    pub delta: EditDelta,
}

#[derive(Debug, Default)]
pub struct EditReconciler {
    editable: Vec<String>,
    in_flight: HashMap<Pk, PendingEdit>,
}

impl EditReconciler {
    pub fn new(editable: Vec<String>) -> Self {
        Self {
            editable,
            in_flight: HashMap::new(),
        }
    }

    /// Starts an edit. `Ok(None)` means there is nothing to send.
    pub fn begin(&mut self, snapshot: Row, edited: Row) -> Result<Option<PendingEdit>, TableError> {
        if snapshot.pk != edited.pk {
            return Err(TableError::InvariantViolation(format!(
                "edit changed row identifier from {} to {}",
                snapshot.pk, edited.pk
            )));
        }
        let pk = snapshot.pk;
        if self.in_flight.contains_key(&pk) {
            return Err(TableError::Busy(pk));
        }
        let delta = compute_delta(&snapshot, &edited, &self.editable);
        if delta.is_empty() {
            return Ok(None);
        }
        let mut tentative = snapshot.clone();
        delta.apply_to(&mut tentative);
        let pending = PendingEdit {
            snapshot,
            tentative,
            delta,
        };
        self.in_flight.insert(pk, pending.clone());
        Ok(Some(pending))
    }

    pub fn is_pending(&self, pk: Pk) -> bool {
        self.in_flight.contains_key(&pk)
    }

    pub fn tentative(&self, pk: Pk) -> Option<&Row> {
        self.in_flight.get(&pk).map(|p| &p.tentative)
    }

    /// Settles a confirmed edit and returns the canonical row. Whitelisted
    /// fields echoed by the server take precedence over the tentative ones.
    pub fn commit(&mut self, pk: Pk, server_row: Option<Row>) -> Option<Row> {
        let pending = self.in_flight.remove(&pk)?;
        let mut row = pending.tentative;
        if let Some(server_row) = server_row.filter(|r| r.pk == pk) {
            for field in &self.editable {
                if let Some(v) = server_row.fields.get(field) {
                    row.set(field, v.clone());
                }
            }
        }
        Some(row)
    }

    /// Abandons an edit and returns the untouched pre-edit snapshot.
    pub fn revert(&mut self, pk: Pk) -> Option<Row> {
        self.in_flight.remove(&pk).map(|p| p.snapshot)
    }
}

pub fn saved_notice(pk: Pk) -> Notice {
    Notice::success(format!("Saved PK {pk}"))
}

pub fn failed_notice(err: &TableError) -> Notice {
    match err.server_detail() {
        Some(detail) => Notice::error(format!("Save failed – {detail}")),
        None => Notice::error("Save failed"),
    }
}
