//! Two-phase cascading delete: dry-run preview, then confirmed deletion.
//!
//! ```text
//! Idle -> PreviewPending -> PreviewReady -> Confirmed -> Idle
//!                 |               |
//!                 +-> Idle        +-> (cancelled) -> Idle
//! ```

use crate::error::TableError;
use crate::model::{DeleteOutcome, DeletionPreview, Pk};

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum DeletionState {
    #[default]
    Idle,
    PreviewPending {
        target: Pk,
    },
    PreviewReady(DeletionPreview),
    Confirmed {
        target: Pk,
    },
}

impl DeletionState {
    /// Record the workflow is busy with, if any.
    pub fn target(&self) -> Option<Pk> {
        match self {
            DeletionState::Idle => None,
            DeletionState::PreviewPending { target } | DeletionState::Confirmed { target } => {
                Some(*target)
            }
            DeletionState::PreviewReady(preview) => Some(preview.target),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PreviewOutcome {
    Ready(DeletionPreview),
    Failed(TableError),
    /// Response for a target the workflow is no longer waiting on.
    Ignored,
}

#[derive(Debug, Default)]
pub struct DeletionWorkflow {
    state: DeletionState,
}

impl DeletionWorkflow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> &DeletionState {
        &self.state
    }

    #[cfg(test)]
    pub(crate) fn is_idle(&self) -> bool {
        self.state.target().is_none()
    }

    /// Begins a deletion. Only one deletion may be in progress at a time.
    pub fn request(&mut self, target: Pk) -> Result<(), TableError> {
        if let Some(active) = self.state.target() {
            return Err(TableError::Busy(active));
        }
        self.state = DeletionState::PreviewPending { target };
        Ok(())
    }

    pub fn preview_received(
        &mut self,
        target: Pk,
        result: Result<Vec<Pk>, TableError>,
    ) -> PreviewOutcome {
        if self.state != (DeletionState::PreviewPending { target }) {
            return PreviewOutcome::Ignored;
        }
        match result.and_then(|nodes| DeletionPreview::from_dry_run(target, &nodes)) {
            Ok(preview) => {
                self.state = DeletionState::PreviewReady(preview.clone());
                PreviewOutcome::Ready(preview)
            }
            Err(e) => {
                self.state = DeletionState::Idle;
                PreviewOutcome::Failed(e)
            }
        }
    }

    pub fn confirm(&mut self) -> Result<Pk, TableError> {
        match &self.state {
            DeletionState::PreviewReady(preview) => {
                let target = preview.target;
                self.state = DeletionState::Confirmed { target };
                Ok(target)
            }
            _ => Err(TableError::NoPendingPreview),
        }
    }

    /// Discards the preview. Returns it when one was awaiting confirmation.
    pub fn cancel(&mut self) -> Option<DeletionPreview> {
        match std::mem::take(&mut self.state) {
            DeletionState::PreviewReady(preview) => Some(preview),
            other => {
                self.state = other;
                None
            }
        }
    }

    /// Settles the real deletion. A response the backend marks as not
    /// deleted counts as a rejection.
    pub fn delete_finished(
        &mut self,
        target: Pk,
        result: Result<DeleteOutcome, TableError>,
    ) -> Option<Result<DeleteOutcome, TableError>> {
        if self.state != (DeletionState::Confirmed { target }) {
            return None;
        }
        self.state = DeletionState::Idle;
        Some(result.and_then(|outcome| {
            if outcome.deleted {
                Ok(outcome)
            } else {
                Err(TableError::ServerRejection {
                    status: 200,
                    detail: Some(if outcome.message.is_empty() {
                        format!("PK {target} was not deleted")
                    } else {
                        outcome.message
                    }),
                })
            }
        }))
    }
}
