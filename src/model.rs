use crate::error::TableError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Backend record identifier. Unique within one resource type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pk(pub u64);

impl fmt::Display for Pk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for Pk {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse().map(Pk)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn as_query_str(self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

impl std::str::FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            other => Err(format!("invalid sort order '{other}' (expected asc or desc)")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortSpec {
    pub field: String,
    pub order: SortOrder,
}

impl Default for SortSpec {
    fn default() -> Self {
        Self {
            field: "pk".to_string(),
            order: SortOrder::Desc,
        }
    }
}

/// Structured filter predicate. Forwarded to the backend verbatim; only the
/// backend interprets it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterModel(pub Value);

impl Default for FilterModel {
    fn default() -> Self {
        Self(serde_json::json!({ "items": [] }))
    }
}

impl FilterModel {
    /// Quick-filter predicate in the DataGrid shape: one value per word.
    pub fn quick(text: &str) -> Self {
        let values: Vec<Value> = text
            .split_whitespace()
            .map(|w| Value::String(w.to_string()))
            .collect();
        if values.is_empty() {
            return Self::default();
        }
        Self(serde_json::json!({ "items": [], "quickFilterValues": values }))
    }

    /// Compact JSON used as the query-string payload.
    pub fn to_query_value(&self) -> String {
        self.0.to_string()
    }
}

/// Serialized form of the view state sent to the query endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewQuery {
    pub skip: u64,
    pub limit: u64,
    pub sort_field: String,
    pub sort_order: SortOrder,
    pub filter: FilterModel,
}

impl ViewQuery {
    pub fn page(&self) -> u64 {
        if self.limit == 0 {
            0
        } else {
            self.skip / self.limit
        }
    }
}

/// One backend record as displayed in the table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Row {
    pub pk: Pk,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Row {
    pub fn new(pk: Pk) -> Self {
        Self {
            pk,
            fields: Map::new(),
        }
    }

    pub fn with_field(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.set(name, value.into());
        self
    }

    /// Field lookup; `pk` resolves to the identifier.
    pub fn get(&self, name: &str) -> Option<Value> {
        if name == "pk" {
            return Some(Value::from(self.pk.0));
        }
        self.fields.get(name).cloned()
    }

    pub fn get_str(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_str)
    }

    /// Sets a field. The identifier is immutable and cannot be set this way.
    pub fn set(&mut self, name: &str, value: Value) -> bool {
        if name == "pk" {
            return false;
        }
        self.fields.insert(name.to_string(), value);
        true
    }
}

/// One page of rows plus the full match count. Always replaced as a unit.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct RowSet {
    #[serde(rename = "data")]
    pub rows: Vec<Row>,
    pub total: u64,
}

/// Field name to new value, limited to editable fields.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EditDelta(pub BTreeMap<String, Value>);

impl EditDelta {
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub(crate) fn apply_to(&self, row: &mut Row) {
        for (name, value) in &self.0 {
            row.set(name, value.clone());
        }
    }
}

/// Cascade impact of deleting `target`, as reported by a dry run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeletionPreview {
    pub target: Pk,
    pub dependents: BTreeSet<Pk>,
}

impl DeletionPreview {
    /// Builds a preview from the dry-run node list, which echoes the target.
    /// An empty list means the backend did not even see the target.
    pub fn from_dry_run(target: Pk, deleted_nodes: &[Pk]) -> Result<Self, TableError> {
        if deleted_nodes.is_empty() {
            return Err(TableError::InvariantViolation(format!(
                "dry-run for PK {target} returned no nodes"
            )));
        }
        let dependents = deleted_nodes
            .iter()
            .copied()
            .filter(|pk| *pk != target)
            .collect();
        Ok(Self { target, dependents })
    }

    pub fn summary(&self) -> String {
        format!(
            "Delete PK<{}> and {} dependents?",
            self.target,
            self.dependents.len()
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionCommand {
    Pause,
    Resume,
    Terminate,
    Delete,
}

impl ActionCommand {
    /// Path segment of the lifecycle endpoint.
    pub fn endpoint_verb(self) -> &'static str {
        match self {
            ActionCommand::Pause => "pause",
            ActionCommand::Resume => "play",
            ActionCommand::Terminate => "kill",
            ActionCommand::Delete => "delete",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ActionCommand::Pause => "Pause",
            ActionCommand::Resume => "Resume",
            ActionCommand::Terminate => "Kill",
            ActionCommand::Delete => "Delete",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteOutcome {
    pub deleted: bool,
    #[serde(default)]
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NoticeLevel {
    Success,
    Info,
    Error,
}

/// Transient user-facing message (toast).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    pub fn success(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Success,
            message: message.into(),
        }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Info,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Error,
            message: message.into(),
        }
    }
}

/// Events emitted by the controller and consumed by presentation layers.
#[derive(Debug, Clone, PartialEq)]
pub enum TableEvent {
    QueryIssued {
        token: u64,
        query: ViewQuery,
    },
    RowsReplaced(RowSet),
    QueryFailed(TableError),
    /// Optimistic value shown while an edit is in flight.
    RowPending(Row),
    /// Edit confirmed by the backend.
    RowPatched(Row),
    /// Edit rejected; carries the pre-edit snapshot.
    RowReverted(Row),
    PreviewReady(DeletionPreview),
    /// Deletion workflow returned to idle.
    PreviewClosed,
    Notice(Notice),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn row_round_trips_backend_shape() {
        let raw = serde_json::json!({
            "pk": 42,
            "label": "A",
            "paused": false,
        });
        let row: Row = serde_json::from_value(raw.clone()).unwrap();
        assert_eq!(row.pk, Pk(42));
        assert_eq!(row.get_str("label"), Some("A"));
        assert_eq!(serde_json::to_value(&row).unwrap(), raw);
    }

    #[test]
    fn row_refuses_to_overwrite_pk() {
        let mut row = Row::new(Pk(7));
        assert!(!row.set("pk", Value::from(8)));
        assert_eq!(row.pk, Pk(7));
        assert!(!row.fields.contains_key("pk"));
    }

    #[test]
    fn row_set_reads_data_and_total() {
        let raw = serde_json::json!({ "total": 2, "data": [{ "pk": 1 }, { "pk": 2 }] });
        let set: RowSet = serde_json::from_value(raw).unwrap();
        assert_eq!(set.total, 2);
        assert_eq!(set.rows.len(), 2);
    }

    #[test]
    fn quick_filter_splits_words() {
        let f = FilterModel::quick("  add  multiply ");
        assert_eq!(
            f.0,
            serde_json::json!({ "items": [], "quickFilterValues": ["add", "multiply"] })
        );
        assert_eq!(FilterModel::quick("   "), FilterModel::default());
    }

    #[test]
    fn preview_strips_target() {
        let p = DeletionPreview::from_dry_run(Pk(10), &[Pk(10), Pk(11), Pk(12)]).unwrap();
        assert_eq!(p.dependents.into_iter().collect::<Vec<_>>(), vec![Pk(11), Pk(12)]);
    }

    #[test]
    fn preview_rejects_empty_dry_run() {
        let err = DeletionPreview::from_dry_run(Pk(10), &[]).unwrap_err();
        assert!(matches!(err, TableError::InvariantViolation(_)));
    }

    #[test]
    fn preview_with_only_target_has_no_dependents() {
        let p = DeletionPreview::from_dry_run(Pk(5), &[Pk(5)]).unwrap();
        assert!(p.dependents.is_empty());
        assert_eq!(p.summary(), "Delete PK<5> and 0 dependents?");
    }

    #[test]
    fn lifecycle_verbs_match_endpoints() {
        assert_eq!(ActionCommand::Pause.endpoint_verb(), "pause");
        assert_eq!(ActionCommand::Resume.endpoint_verb(), "play");
        assert_eq!(ActionCommand::Terminate.endpoint_verb(), "kill");
    }
}
