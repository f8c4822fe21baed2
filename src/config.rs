//! Table presets and application configuration.
//!
//! One parametrised controller serves every node table; what differs
//! between them (columns, editable fields, row actions) lives here.

use crate::model::{SortOrder, SortSpec};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnSpec {
    pub field: String,
    pub header: String,
    #[serde(default = "default_true")]
    pub sortable: bool,
}

fn default_true() -> bool {
    true
}

impl ColumnSpec {
    fn new(field: &str, header: &str, sortable: bool) -> Self {
        Self {
            field: field.to_string(),
            header: header.to_string(),
            sortable,
        }
    }
}

/// Which row-level actions a table offers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowActions {
    /// Pause/resume/kill depending on process state, plus delete.
    #[default]
    Lifecycle,
    DeleteOnly,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableConfig {
    pub title: String,
    /// Resource path segment, e.g. `process` for `/api/process-data`.
    pub resource: String,
    pub link_prefix: String,
    pub columns: Vec<ColumnSpec>,
    pub editable_fields: Vec<String>,
    #[serde(default)]
    pub actions: RowActions,
    #[serde(default)]
    pub default_sort: SortSpec,
}

impl TableConfig {
    pub fn is_sortable(&self, field: &str) -> bool {
        field == "pk"
            || self
                .columns
                .iter()
                .any(|c| c.field == field && c.sortable)
    }
}

fn process_columns() -> Vec<ColumnSpec> {
    vec![
        ColumnSpec::new("pk", "PK", true),
        ColumnSpec::new("ctime", "Created", true),
        ColumnSpec::new("process_label", "Process label", false),
        ColumnSpec::new("process_state", "State", false),
        ColumnSpec::new("process_status", "Status", false),
        ColumnSpec::new("label", "Label", true),
        ColumnSpec::new("description", "Description", true),
        ColumnSpec::new("exit_status", "Exit status", false),
        ColumnSpec::new("exit_message", "Exit message", false),
        ColumnSpec::new("paused", "Paused", false),
    ]
}

fn editable() -> Vec<String> {
    vec!["label".to_string(), "description".to_string()]
}

fn process_table(title: &str, resource: &str) -> TableConfig {
    TableConfig {
        title: title.to_string(),
        resource: resource.to_string(),
        link_prefix: format!("/{resource}"),
        columns: process_columns(),
        editable_fields: editable(),
        actions: RowActions::Lifecycle,
        default_sort: SortSpec::default(),
    }
}

/// Built-in table for a resource name, if one exists.
pub fn builtin_table(resource: &str) -> Option<TableConfig> {
    match resource {
        "process" => Some(process_table("Process nodes", "process")),
        "workgraph" => Some(process_table("WorkGraph nodes", "workgraph")),
        "workchain" => Some(process_table("WorkChain nodes", "workchain")),
        "datanode" => Some(TableConfig {
            title: "Data nodes".to_string(),
            resource: "datanode".to_string(),
            link_prefix: "/datanode".to_string(),
            columns: vec![
                ColumnSpec::new("pk", "PK", true),
                ColumnSpec::new("ctime", "Created", true),
                ColumnSpec::new("node_type", "Type", true),
                ColumnSpec::new("label", "Label", true),
                ColumnSpec::new("description", "Description", false),
            ],
            editable_fields: editable(),
            actions: RowActions::DeleteOnly,
            default_sort: SortSpec::default(),
        }),
        "groupnode" => Some(TableConfig {
            title: "Groups".to_string(),
            resource: "groupnode".to_string(),
            link_prefix: "/groupnode".to_string(),
            columns: vec![
                ColumnSpec::new("pk", "PK", true),
                ColumnSpec::new("ctime", "Created", true),
                ColumnSpec::new("label", "Label", true),
                ColumnSpec::new("description", "Description", true),
            ],
            editable_fields: editable(),
            actions: RowActions::DeleteOnly,
            default_sort: SortSpec::default(),
        }),
        _ => None,
    }
}

pub const BUILTIN_RESOURCES: &[&str] = &["process", "workgraph", "workchain", "datanode", "groupnode"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// API root, e.g. `http://localhost:8000/api`.
    pub base_url: String,
    #[serde(with = "humantime_serde")]
    pub request_timeout: Duration,
    #[serde(with = "humantime_serde")]
    pub quick_filter_debounce: Duration,
    pub page_size: u64,
    pub page_size_options: Vec<u64>,
    /// Query-string name the filter predicate is sent under.
    pub filter_param: String,
    /// Extra or overriding table presets keyed by resource name.
    pub tables: BTreeMap<String, TableConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000/api".to_string(),
            request_timeout: Duration::from_secs(10),
            quick_filter_debounce: Duration::from_millis(500),
            page_size: 15,
            page_size_options: vec![15, 30, 50],
            filter_param: "filter".to_string(),
            tables: BTreeMap::new(),
        }
    }
}

impl AppConfig {
    /// `<config dir>/node-table/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|d| d.join("node-table").join("config.json"))
    }

    /// Loads from an explicit path (must exist) or the default location
    /// (optional). Falls back to defaults when neither is present.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(p) => Self::read(p),
            None => match Self::default_path() {
                Some(p) if p.exists() => Self::read(&p),
                _ => Ok(Self::default()),
            },
        }
    }

    fn read(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let cfg: Self = serde_json::from_str(&raw)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        tracing::debug!(path = %path.display(), "loaded config");
        Ok(cfg)
    }

    pub fn table(&self, resource: &str) -> Option<TableConfig> {
        self.tables
            .get(resource)
            .cloned()
            .or_else(|| builtin_table(resource))
    }

    pub fn endpoint_base(&self, table: &TableConfig) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), table.resource)
    }

    pub fn check_page_size(&self, page_size: u64) -> Result<()> {
        if page_size == 0 || !self.page_size_options.contains(&page_size) {
            anyhow::bail!(
                "page size {page_size} is not one of {:?}",
                self.page_size_options
            );
        }
        Ok(())
    }
}

/// Sort order accepted by a table, falling back to its default for
/// non-sortable columns.
pub fn resolve_sort(table: &TableConfig, field: Option<&str>, order: Option<SortOrder>) -> SortSpec {
    let field = match field {
        Some(f) if table.is_sortable(f) => f.to_string(),
        Some(f) => {
            tracing::warn!(field = f, "column is not sortable, using default sort");
            table.default_sort.field.clone()
        }
        None => table.default_sort.field.clone(),
    };
    SortSpec {
        field,
        order: order.unwrap_or(table.default_sort.order),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_builtins_resolve() {
        for name in BUILTIN_RESOURCES {
            let t = builtin_table(name).unwrap();
            assert_eq!(&t.resource, name);
            assert_eq!(t.editable_fields, vec!["label", "description"]);
        }
        assert!(builtin_table("nope").is_none());
    }

    #[test]
    fn datanode_sorts_only_backend_columns() {
        let t = builtin_table("datanode").unwrap();
        for field in ["pk", "ctime", "node_type", "label"] {
            assert!(t.is_sortable(field), "{field}");
        }
        assert!(!t.is_sortable("description"));
    }

    #[test]
    fn endpoint_joins_base_and_resource() {
        let cfg = AppConfig {
            base_url: "http://host:8000/api/".into(),
            ..Default::default()
        };
        let t = builtin_table("workgraph").unwrap();
        assert_eq!(cfg.endpoint_base(&t), "http://host:8000/api/workgraph");
    }

    #[test]
    fn config_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{
                "base_url": "http://example:9000/api",
                "quick_filter_debounce": "250ms",
                "filter_param": "filterModel",
                "tables": {
                    "calcjob": {
                        "title": "Calc jobs",
                        "resource": "calcjob",
                        "link_prefix": "/calcjob",
                        "columns": [{ "field": "pk", "header": "PK" }],
                        "editable_fields": ["label"],
                        "actions": "delete_only"
                    }
                }
            }"#,
        )
        .unwrap();

        let cfg = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(cfg.base_url, "http://example:9000/api");
        assert_eq!(cfg.quick_filter_debounce, Duration::from_millis(250));
        assert_eq!(cfg.request_timeout, Duration::from_secs(10));
        assert_eq!(cfg.filter_param, "filterModel");
        let t = cfg.table("calcjob").unwrap();
        assert_eq!(t.actions, RowActions::DeleteOnly);
        assert_eq!(t.default_sort, SortSpec::default());
        assert!(cfg.table("process").is_some());
    }

    #[test]
    fn missing_explicit_config_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(AppConfig::load(Some(&dir.path().join("absent.json"))).is_err());
    }

    #[test]
    fn page_size_must_be_an_option() {
        let cfg = AppConfig::default();
        assert!(cfg.check_page_size(30).is_ok());
        assert!(cfg.check_page_size(0).is_err());
        assert!(cfg.check_page_size(17).is_err());
    }

    #[test]
    fn non_sortable_column_falls_back() {
        let t = builtin_table("process").unwrap();
        let s = resolve_sort(&t, Some("process_state"), Some(SortOrder::Asc));
        assert_eq!(s.field, "pk");
        assert_eq!(s.order, SortOrder::Asc);
        let s = resolve_sort(&t, Some("ctime"), None);
        assert_eq!(s.field, "ctime");
        assert_eq!(s.order, SortOrder::Desc);
    }
}
