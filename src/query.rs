//! Query sequencing and the published row set.
//!
//! Each issued query gets a monotonically increasing token. Only the
//! response carrying the most recently issued token may touch the row set;
//! anything older is dropped, no matter when it completes.

use crate::error::TableError;
use crate::model::{Row, RowSet, ViewQuery};

#[derive(Debug, Clone, PartialEq)]
pub struct QueryTicket {
    pub token: u64,
    pub query: ViewQuery,
}

#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutcome {
    Applied,
    /// Superseded by a newer query; the result was discarded.
    Stale,
    /// Latest query failed; the previous row set is still published.
    Failed(TableError),
}

#[derive(Debug, Default)]
pub struct QueryExecutor {
    next_token: u64,
    latest: Option<QueryTicket>,
    row_set: RowSet,
}

impl QueryExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn issue(&mut self, query: ViewQuery) -> QueryTicket {
        self.next_token += 1;
        let ticket = QueryTicket {
            token: self.next_token,
            query,
        };
        self.latest = Some(ticket.clone());
        ticket
    }

    pub fn complete(&mut self, token: u64, result: Result<RowSet, TableError>) -> QueryOutcome {
        let Some(latest) = self.latest.as_ref() else {
            return QueryOutcome::Stale;
        };
        if latest.token != token {
            tracing::debug!(token, latest = latest.token, "discarding stale query response");
            return QueryOutcome::Stale;
        }
        match result {
            Ok(set) if set.rows.len() as u64 > latest.query.limit => {
                QueryOutcome::Failed(TableError::InvariantViolation(format!(
                    "query returned {} rows for limit {}",
                    set.rows.len(),
                    latest.query.limit
                )))
            }
            Ok(set) => {
                self.row_set = set;
                QueryOutcome::Applied
            }
            Err(e) => QueryOutcome::Failed(e),
        }
    }

    pub fn row_set(&self) -> &RowSet {
        &self.row_set
    }

    pub fn rows(&self) -> &[Row] {
        &self.row_set.rows
    }

    pub fn total(&self) -> u64 {
        self.row_set.total
    }

    pub fn find(&self, pk: crate::model::Pk) -> Option<&Row> {
        self.row_set.rows.iter().find(|r| r.pk == pk)
    }

    /// Replaces one row in place after a confirmed edit. Returns `false` when
    /// the row is no longer on the current page.
    pub fn patch_row(&mut self, row: Row) -> bool {
        match self.row_set.rows.iter_mut().find(|r| r.pk == row.pk) {
            Some(slot) => {
                *slot = row;
                true
            }
            None => false,
        }
    }
}
