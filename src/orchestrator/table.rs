//! Table controller state machine.
//!
//! Commands and network completions go in; events for presentation layers
//! and network effects to perform come out. Nothing here awaits, so every
//! transition can be driven and checked without a runtime.

use crate::actions;
use crate::config::TableConfig;
use crate::deletion::{DeletionState, DeletionWorkflow, PreviewOutcome};
use crate::edit::{self, EditReconciler};
use crate::error::TableError;
use crate::model::{
    ActionCommand, DeleteOutcome, EditDelta, FilterModel, Notice, Pk, Row, RowSet, SortOrder,
    TableEvent,
};
use crate::query::{QueryExecutor, QueryOutcome, QueryTicket};
use crate::view_state::{QuickFilter, ViewStateStore};
use std::num::NonZeroU64;
use std::time::Duration;
use tokio::time::Instant;

/// Commands emitted by UI layers.
#[derive(Debug, Clone, PartialEq)]
pub enum TableCommand {
    SetPage(u64),
    SetPageSize(NonZeroU64),
    SetSort { field: String, order: SortOrder },
    SetFilter(FilterModel),
    /// Raw quick-filter text; committed after the debounce window.
    QuickFilter(String),
    Refresh,
    Edit { snapshot: Row, edited: Row },
    RequestDelete(Pk),
    ConfirmDelete,
    CancelDelete,
    Action { command: ActionCommand, pk: Pk },
    Quit,
}

/// Network work requested by the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Query(QueryTicket),
    Update { pk: Pk, delta: EditDelta },
    DeletePreview(Pk),
    Delete(Pk),
    Lifecycle { command: ActionCommand, pk: Pk },
}

/// Result of an `Effect`, fed back into the controller.
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    Query {
        token: u64,
        result: Result<RowSet, TableError>,
    },
    Update {
        pk: Pk,
        result: Result<Option<Row>, TableError>,
    },
    Preview {
        pk: Pk,
        result: Result<Vec<Pk>, TableError>,
    },
    Delete {
        pk: Pk,
        result: Result<DeleteOutcome, TableError>,
    },
    Lifecycle {
        command: ActionCommand,
        pk: Pk,
        result: Result<(), TableError>,
    },
}

#[derive(Debug, Default, PartialEq)]
pub struct Step {
    pub effects: Vec<Effect>,
    pub events: Vec<TableEvent>,
}

impl Step {
    fn notice(&mut self, notice: Notice) {
        self.events.push(TableEvent::Notice(notice));
    }
}

pub struct TableController {
    table: TableConfig,
    view: ViewStateStore,
    quick: QuickFilter,
    executor: QueryExecutor,
    edits: EditReconciler,
    deletion: DeletionWorkflow,
}

impl TableController {
    pub fn new(table: TableConfig, view: ViewStateStore, debounce: Duration) -> Self {
        let edits = EditReconciler::new(table.editable_fields.clone());
        Self {
            table,
            view,
            quick: QuickFilter::new(debounce),
            executor: QueryExecutor::new(),
            edits,
            deletion: DeletionWorkflow::new(),
        }
    }

    pub fn table(&self) -> &TableConfig {
        &self.table
    }

    pub fn view(&self) -> &ViewStateStore {
        &self.view
    }

    pub fn row_set(&self) -> &RowSet {
        self.executor.row_set()
    }

    pub fn deletion_state(&self) -> &DeletionState {
        self.deletion.state()
    }

    pub fn quick_filter_deadline(&self) -> Option<Instant> {
        self.quick.deadline()
    }

    /// Rows as displayed: the published page with in-flight edits overlaid.
    pub fn displayed_rows(&self) -> Vec<Row> {
        self.executor
            .rows()
            .iter()
            .map(|r| self.edits.tentative(r.pk).unwrap_or(r).clone())
            .collect()
    }

    /// Initial fetch with the default view.
    pub fn mount(&mut self) -> Step {
        let mut step = Step::default();
        self.fetch(&mut step);
        step
    }

    fn fetch(&mut self, step: &mut Step) {
        let ticket = self.executor.issue(self.view.query());
        tracing::debug!(token = ticket.token, skip = ticket.query.skip, limit = ticket.query.limit, "issuing query");
        step.events.push(TableEvent::QueryIssued {
            token: ticket.token,
            query: ticket.query.clone(),
        });
        step.effects.push(Effect::Query(ticket));
    }

    fn fetch_if(&mut self, changed: bool, step: &mut Step) {
        if changed {
            self.fetch(step);
        }
    }

    pub fn handle(&mut self, command: TableCommand, now: Instant) -> Step {
        let mut step = Step::default();
        match command {
            TableCommand::SetPage(page) => {
                let changed = self.view.set_page(page);
                self.fetch_if(changed, &mut step);
            }
            TableCommand::SetPageSize(size) => {
                let changed = self.view.set_page_size(size);
                self.fetch_if(changed, &mut step);
            }
            TableCommand::SetSort { field, order } => {
                if self.table.is_sortable(&field) {
                    let changed = self.view.set_sort(field, order);
                    self.fetch_if(changed, &mut step);
                } else {
                    step.notice(Notice::error(format!("Column {field} is not sortable")));
                }
            }
            TableCommand::SetFilter(filter) => {
                self.quick.clear();
                let changed = self.view.set_filter(filter);
                self.fetch_if(changed, &mut step);
            }
            TableCommand::QuickFilter(text) => self.quick.input(text, now),
            TableCommand::Refresh => self.fetch(&mut step),
            TableCommand::Edit { snapshot, edited } => self.begin_edit(snapshot, edited, &mut step),
            TableCommand::RequestDelete(pk)
            | TableCommand::Action {
                command: ActionCommand::Delete,
                pk,
            } => match self.deletion.request(pk) {
                Ok(()) => {
                    tracing::debug!(pk = %pk, "requesting deletion preview");
                    step.effects.push(Effect::DeletePreview(pk));
                }
                Err(e) => step.notice(Notice::error(e.to_string())),
            },
            TableCommand::ConfirmDelete => match self.deletion.confirm() {
                Ok(pk) => {
                    tracing::debug!(pk = %pk, "deletion confirmed");
                    step.effects.push(Effect::Delete(pk));
                }
                Err(e) => step.notice(Notice::error(e.to_string())),
            },
            TableCommand::CancelDelete => {
                if let Some(preview) = self.deletion.cancel() {
                    tracing::debug!(pk = %preview.target, "deletion cancelled");
                    step.events.push(TableEvent::PreviewClosed);
                }
            }
            TableCommand::Action { command, pk } => {
                step.effects.push(Effect::Lifecycle { command, pk });
            }
            TableCommand::Quit => {}
        }
        step
    }

    fn begin_edit(&mut self, snapshot: Row, edited: Row, step: &mut Step) {
        match self.edits.begin(snapshot, edited) {
            Ok(None) => {}
            Ok(Some(pending)) => {
                let pk = pending.tentative.pk;
                step.events.push(TableEvent::RowPending(pending.tentative));
                step.effects.push(Effect::Update {
                    pk,
                    delta: pending.delta,
                });
            }
            Err(e) => step.notice(Notice::error(e.to_string())),
        }
    }

    /// Commits a debounced quick filter once its window has passed.
    pub fn tick(&mut self, now: Instant) -> Step {
        let mut step = Step::default();
        if let Some(filter) = self.quick.take_due(now) {
            let changed = self.view.set_filter(filter);
            self.fetch_if(changed, &mut step);
        }
        step
    }

    pub fn complete(&mut self, completion: Completion) -> Step {
        let mut step = Step::default();
        match completion {
            Completion::Query { token, result } => match self.executor.complete(token, result) {
                QueryOutcome::Applied => {
                    step.events
                        .push(TableEvent::RowsReplaced(self.executor.row_set().clone()));
                }
                QueryOutcome::Stale => {}
                QueryOutcome::Failed(e) => {
                    tracing::warn!(token, error = %e, "query failed, keeping previous rows");
                    step.events.push(TableEvent::QueryFailed(e));
                }
            },
            Completion::Update { pk, result } => match result {
                Ok(server_row) => {
                    if let Some(row) = self.edits.commit(pk, server_row) {
                        self.executor.patch_row(row.clone());
                        step.events.push(TableEvent::RowPatched(row));
                        step.notice(edit::saved_notice(pk));
                    }
                }
                Err(e) => {
                    tracing::warn!(pk = %pk, error = %e, "edit rejected, reverting");
                    if let Some(snapshot) = self.edits.revert(pk) {
                        step.events.push(TableEvent::RowReverted(snapshot));
                        step.notice(edit::failed_notice(&e));
                    }
                }
            },
            Completion::Preview { pk, result } => match self.deletion.preview_received(pk, result) {
                PreviewOutcome::Ready(preview) => {
                    step.events.push(TableEvent::PreviewReady(preview));
                }
                PreviewOutcome::Failed(e) => {
                    tracing::warn!(pk = %pk, error = %e, "deletion preview failed");
                    step.notice(Notice::error(format!("Error deleting item: {e}")));
                    step.events.push(TableEvent::PreviewClosed);
                }
                PreviewOutcome::Ignored => {}
            },
            Completion::Delete { pk, result } => match self.deletion.delete_finished(pk, result) {
                Some(Ok(outcome)) => {
                    let message = if outcome.message.is_empty() {
                        format!("Deleted PK {pk}")
                    } else {
                        outcome.message
                    };
                    step.notice(Notice::success(message));
                    step.events.push(TableEvent::PreviewClosed);
                    // Positions and counts shift after a cascade.
                    self.fetch(&mut step);
                }
                Some(Err(e)) => {
                    tracing::warn!(pk = %pk, error = %e, "deletion failed");
                    step.notice(Notice::error(format!("Error deleting PK {pk}: {e}")));
                    step.events.push(TableEvent::PreviewClosed);
                }
                None => {}
            },
            Completion::Lifecycle {
                command,
                pk,
                result,
            } => {
                if let Err(e) = &result {
                    tracing::warn!(pk = %pk, error = %e, "lifecycle command failed");
                }
                step.notice(actions::outcome_notice(command, pk, &result));
                self.fetch(&mut step);
            }
        }
        step
    }
}
