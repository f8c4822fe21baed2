//! In-memory `NodeApi` for controller tests.

use crate::api::NodeApi;
use crate::error::TableError;
use crate::model::{
    ActionCommand, DeleteOutcome, EditDelta, FilterModel, Pk, Row, RowSet, SortOrder, ViewQuery,
};
use async_trait::async_trait;
use std::collections::{BTreeMap, VecDeque};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Default)]
struct FakeState {
    rows: BTreeMap<Pk, Row>,
    dependents: BTreeMap<Pk, Vec<Pk>>,
    query_delays: VecDeque<Duration>,
    update_error: Option<TableError>,
    lifecycle_error: Option<TableError>,
    dry_run: Option<Result<Vec<Pk>, TableError>>,
    calls: Vec<String>,
    filters: Vec<FilterModel>,
}

#[derive(Default)]
pub(crate) struct FakeApi {
    state: Mutex<FakeState>,
}

impl FakeApi {
    /// Rows with pk `1..=n`, all labelled `A`.
    pub(crate) fn with_rows(n: u64) -> Self {
        let api = Self::default();
        {
            let mut st = api.lock();
            for pk in 1..=n {
                let row = Row::new(Pk(pk))
                    .with_field("label", "A")
                    .with_field("description", "")
                    .with_field("process_state", "Running")
                    .with_field("paused", false);
                st.rows.insert(Pk(pk), row);
            }
        }
        api
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub(crate) fn push_query_delays(&self, delays: &[Duration]) {
        self.lock().query_delays.extend(delays.iter().copied());
    }

    pub(crate) fn fail_updates(&self, err: TableError) {
        self.lock().update_error = Some(err);
    }

    pub(crate) fn fail_lifecycle(&self, err: TableError) {
        self.lock().lifecycle_error = Some(err);
    }

    pub(crate) fn set_dry_run(&self, result: Result<Vec<Pk>, TableError>) {
        self.lock().dry_run = Some(result);
    }

    pub(crate) fn set_dependents(&self, pk: Pk, dependents: &[Pk]) {
        self.lock().dependents.insert(pk, dependents.to_vec());
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub(crate) fn seen_filters(&self) -> Vec<FilterModel> {
        self.lock().filters.clone()
    }

    fn cascade(st: &FakeState, pk: Pk) -> Vec<Pk> {
        let mut nodes = vec![pk];
        nodes.extend(st.dependents.get(&pk).into_iter().flatten().copied());
        nodes
    }
}

#[async_trait]
impl NodeApi for FakeApi {
    async fn query(&self, query: &ViewQuery) -> Result<RowSet, TableError> {
        let delay = {
            let mut st = self.lock();
            st.calls
                .push(format!("GET skip={} limit={}", query.skip, query.limit));
            st.filters.push(query.filter.clone());
            st.query_delays.pop_front()
        };
        if let Some(d) = delay {
            tokio::time::sleep(d).await;
        }
        let st = self.lock();
        let mut rows: Vec<Row> = st.rows.values().cloned().collect();
        if query.sort_order == SortOrder::Desc {
            rows.reverse();
        }
        let total = rows.len() as u64;
        let rows = rows
            .into_iter()
            .skip(query.skip as usize)
            .take(query.limit as usize)
            .collect();
        Ok(RowSet { rows, total })
    }

    async fn update(&self, pk: Pk, delta: &EditDelta) -> Result<Option<Row>, TableError> {
        let mut st = self.lock();
        st.calls.push(format!("PUT {pk}"));
        if let Some(err) = st.update_error.clone() {
            return Err(err);
        }
        let row = st
            .rows
            .get_mut(&pk)
            .ok_or_else(|| TableError::ServerRejection {
                status: 404,
                detail: Some(format!("ProcessNode {pk} not found")),
            })?;
        delta.apply_to(row);
        Ok(Some(row.clone()))
    }

    async fn delete_preview(&self, pk: Pk) -> Result<Vec<Pk>, TableError> {
        let mut st = self.lock();
        st.calls.push(format!("DELETE {pk} dry_run"));
        if let Some(result) = st.dry_run.clone() {
            return result;
        }
        Ok(Self::cascade(&st, pk))
    }

    async fn delete(&self, pk: Pk) -> Result<DeleteOutcome, TableError> {
        let mut st = self.lock();
        st.calls.push(format!("DELETE {pk}"));
        for node in Self::cascade(&st, pk) {
            st.rows.remove(&node);
        }
        Ok(DeleteOutcome {
            deleted: true,
            message: format!("Deleted ProcessNode {pk}"),
        })
    }

    async fn lifecycle(&self, command: ActionCommand, pk: Pk) -> Result<(), TableError> {
        let mut st = self.lock();
        st.calls
            .push(format!("POST {} {pk}", command.endpoint_verb()));
        match st.lifecycle_error.clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
