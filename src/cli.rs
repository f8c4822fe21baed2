use crate::actions::available_actions;
use crate::api::{HttpNodeApi, NodeApi};
use crate::config::{resolve_sort, AppConfig, TableConfig, BUILTIN_RESOURCES};
use crate::edit::compute_delta;
use crate::logging::LogFormat;
use crate::model::{
    ActionCommand, FilterModel, Notice, NoticeLevel, Pk, Row, RowSet, SortOrder, TableEvent,
    ViewQuery,
};
use crate::orchestrator::{run_controller, TableCommand, TableController};
use crate::text_output;
use crate::view_state::ViewStateStore;
use anyhow::{anyhow, bail, Context, Result};
use clap::{Parser, Subcommand};
use serde_json::Value;
use std::io::Write;
use std::num::NonZeroU64;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;

/// Output line routing for stdout/stderr writer.
enum OutputLine {
    Stdout(String),
    Stderr(String),
}

/// Spawn a blocking writer for stdout/stderr to avoid blocking async tasks.
fn spawn_output_writer() -> (UnboundedSender<OutputLine>, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::unbounded_channel::<OutputLine>();
    let handle = tokio::task::spawn_blocking(move || {
        let stdout = std::io::stdout();
        let stderr = std::io::stderr();
        let mut out = std::io::LineWriter::new(stdout.lock());
        let mut err = std::io::LineWriter::new(stderr.lock());

        while let Some(line) = rx.blocking_recv() {
            match line {
                OutputLine::Stdout(msg) => {
                    let _ = writeln!(out, "{}", msg);
                }
                OutputLine::Stderr(msg) => {
                    let _ = writeln!(err, "{}", msg);
                }
            }
        }

        let _ = out.flush();
        let _ = err.flush();
    });
    (tx, handle)
}

#[derive(Debug, Parser, Clone)]
#[command(
    name = "node-table",
    version,
    about = "Browse and manage node tables served by a REST backend"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Command>,

    /// API root, e.g. http://localhost:8000/api (overrides the config file)
    #[arg(long, global = true, env = "NODE_TABLE_BASE_URL")]
    pub base_url: Option<String>,

    /// Table to operate on: a built-in resource or one defined in the config file
    #[arg(long, short = 'r', global = true, default_value = "process")]
    pub resource: String,

    /// Zero-based page index
    #[arg(long, global = true, default_value_t = 0)]
    pub page: u64,

    /// Rows per page; must be one of the configured page size options
    #[arg(long, global = true)]
    pub page_size: Option<u64>,

    /// Column to sort by (falls back to the table default if not sortable)
    #[arg(long, global = true)]
    pub sort_field: Option<String>,

    /// Sort direction: asc or desc
    #[arg(long, global = true)]
    pub sort_order: Option<SortOrder>,

    /// Filter predicate as JSON, e.g. '{"items":[...]}'
    #[arg(long, global = true, conflicts_with = "quick")]
    pub filter: Option<String>,

    /// Free-text quick filter, applied through the debounced input path
    #[arg(long, global = true)]
    pub quick: Option<String>,

    /// Query-string name the filter is sent under (e.g. filterModel)
    #[arg(long, global = true)]
    pub filter_param: Option<String>,

    /// Quick-filter debounce window
    #[arg(long, global = true)]
    pub debounce: Option<humantime::Duration>,

    /// Per-request timeout
    #[arg(long, global = true)]
    pub timeout: Option<humantime::Duration>,

    /// Print rows as JSON instead of a column listing
    #[arg(long, global = true)]
    pub json: bool,

    /// Config file (defaults to <config dir>/node-table/config.json)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Compact)]
    pub log_format: LogFormat,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Print one page of the table (default)
    List,
    /// Change editable fields of a row on the current page
    Edit {
        pk: Pk,
        #[arg(long)]
        label: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    /// Delete a row and its dependents after previewing the cascade
    Delete {
        pk: Pk,
        /// Skip the confirmation prompt
        #[arg(long)]
        yes: bool,
    },
    /// Pause a running process
    Pause { pk: Pk },
    /// Resume a paused process
    Resume { pk: Pk },
    /// Kill a process
    Kill { pk: Pk },
}

pub async fn run(args: Cli) -> Result<()> {
    let (out_tx, out_handle) = spawn_output_writer();
    let result = run_session(args, out_tx).await;
    let _ = out_handle.await;
    result
}

/// Apply command-line overrides on top of the loaded config.
fn build_config(args: &Cli) -> Result<AppConfig> {
    let mut config = AppConfig::load(args.config.as_deref())?;
    if let Some(url) = &args.base_url {
        config.base_url = url.clone();
    }
    if let Some(param) = &args.filter_param {
        config.filter_param = param.clone();
    }
    if let Some(size) = args.page_size {
        config.page_size = size;
    }
    if let Some(d) = args.debounce {
        config.quick_filter_debounce = Duration::from(d);
    }
    if let Some(t) = args.timeout {
        config.request_timeout = Duration::from(t);
    }
    Ok(config)
}

/// Initial view: page, sort and any JSON filter. `--quick` is applied later
/// through the controller.
fn build_view(args: &Cli, config: &AppConfig, table: &TableConfig) -> Result<ViewStateStore> {
    config.check_page_size(config.page_size)?;
    let page_size = NonZeroU64::new(config.page_size).context("page size must be positive")?;
    let sort = resolve_sort(table, args.sort_field.as_deref(), args.sort_order);
    let mut view = ViewStateStore::new(page_size, sort);
    if let Some(raw) = &args.filter {
        let value: Value = serde_json::from_str(raw).context("--filter must be valid JSON")?;
        view.set_filter(FilterModel(value));
    }
    if args.quick.is_none() {
        view.set_page(args.page);
    }
    Ok(view)
}

async fn run_session(args: Cli, out: UnboundedSender<OutputLine>) -> Result<()> {
    let config = build_config(&args)?;
    let table = config.table(&args.resource).with_context(|| {
        format!(
            "unknown resource '{}' (built-in: {})",
            args.resource,
            BUILTIN_RESOURCES.join(", ")
        )
    })?;
    let view = build_view(&args, &config, &table)?;
    let http = HttpNodeApi::new(
        config.endpoint_base(&table),
        config.filter_param.clone(),
        config.request_timeout,
    )?;
    tracing::info!(endpoint = http.endpoint(), resource = %table.resource, "opening table");
    let api: Arc<dyn NodeApi> = Arc::new(http);
    let controller = TableController::new(table.clone(), view, config.quick_filter_debounce);
    let mut session = Session::start(api, controller, table, args.json, out);

    let result = session.drive(&args).await;
    session.finish().await;
    result
}

fn notice_line(notice: &Notice) -> String {
    match notice.level {
        NoticeLevel::Error => format!("error: {}", notice.message),
        NoticeLevel::Info => format!("note: {}", notice.message),
        NoticeLevel::Success => notice.message.clone(),
    }
}

/// A running controller plus the CLI side of its channels.
struct Session {
    table: TableConfig,
    json: bool,
    cmd_tx: UnboundedSender<TableCommand>,
    evt_rx: UnboundedReceiver<TableEvent>,
    out: UnboundedSender<OutputLine>,
    handle: JoinHandle<TableController>,
    /// Query behind the next `RowsReplaced`.
    latest: Option<ViewQuery>,
}

impl Session {
    fn start(
        api: Arc<dyn NodeApi>,
        controller: TableController,
        table: TableConfig,
        json: bool,
        out: UnboundedSender<OutputLine>,
    ) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel();
        let (evt_tx, evt_rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(run_controller(api, controller, evt_tx, cmd_rx));
        Self {
            table,
            json,
            cmd_tx,
            evt_rx,
            out,
            handle,
            latest: None,
        }
    }

    async fn finish(self) {
        let _ = self.cmd_tx.send(TableCommand::Quit);
        if let Err(e) = self.handle.await {
            tracing::warn!(error = %e, "table controller task failed");
        }
    }

    fn send(&self, command: TableCommand) -> Result<()> {
        self.cmd_tx
            .send(command)
            .map_err(|_| anyhow!("table controller stopped"))
    }

    fn stdout(&self, line: String) {
        let _ = self.out.send(OutputLine::Stdout(line));
    }

    fn stderr(&self, line: String) {
        let _ = self.out.send(OutputLine::Stderr(line));
    }

    fn notice(&self, notice: &Notice) {
        self.stderr(notice_line(notice));
    }

    /// Next controller event. Notices are printed as they pass through.
    async fn next_event(&mut self) -> Result<TableEvent> {
        let event = self
            .evt_rx
            .recv()
            .await
            .context("table controller stopped")?;
        match &event {
            TableEvent::QueryIssued { token, query } => {
                tracing::debug!(token, skip = query.skip, "query issued");
                self.latest = Some(query.clone());
            }
            TableEvent::Notice(n) => self.notice(n),
            _ => {}
        }
        Ok(event)
    }

    /// Waits for rows fetched under a query accepted by `wanted`.
    async fn await_page(&mut self, wanted: impl Fn(&ViewQuery) -> bool) -> Result<(u64, RowSet)> {
        loop {
            match self.next_event().await? {
                TableEvent::RowsReplaced(rows) => {
                    if let Some(q) = self.latest.as_ref().filter(|q| wanted(q)) {
                        return Ok((q.skip, rows));
                    }
                }
                TableEvent::QueryFailed(e) => {
                    if self.latest.as_ref().is_some_and(|q| wanted(q)) {
                        return Err(anyhow::Error::new(e).context("failed to load rows"));
                    }
                }
                _ => {}
            }
        }
    }

    /// Loads the page the command line asked for.
    async fn load(&mut self, args: &Cli) -> Result<(u64, RowSet)> {
        let Some(text) = args.quick.clone() else {
            return self.await_page(|_| true).await;
        };
        let filter = FilterModel::quick(&text);
        self.send(TableCommand::QuickFilter(text))?;
        let page = self.await_page(|q| q.filter == filter).await?;
        if args.page == 0 {
            return Ok(page);
        }
        self.send(TableCommand::SetPage(args.page))?;
        self.await_page(|q| q.filter == filter && q.page() == args.page)
            .await
    }

    fn print_page(&self, skip: u64, rows: &RowSet) -> Result<()> {
        if self.json {
            self.stdout(serde_json::to_string_pretty(rows)?);
        } else {
            for line in text_output::build_listing(&self.table, rows, skip).lines {
                self.stdout(line);
            }
        }
        Ok(())
    }

    fn print_row(&self, row: &Row) -> Result<()> {
        if self.json {
            self.stdout(serde_json::to_string_pretty(row)?);
        } else {
            for line in text_output::row_lines(&self.table, row) {
                self.stdout(line);
            }
        }
        Ok(())
    }

    async fn drive(&mut self, args: &Cli) -> Result<()> {
        let (skip, rows) = self.load(args).await?;
        match args.command.clone().unwrap_or(Command::List) {
            Command::List => self.print_page(skip, &rows),
            Command::Edit {
                pk,
                label,
                description,
            } => self.edit(&rows, pk, label, description).await,
            Command::Delete { pk, yes } => self.delete(pk, yes).await,
            Command::Pause { pk } => self.lifecycle(&rows, ActionCommand::Pause, pk).await,
            Command::Resume { pk } => self.lifecycle(&rows, ActionCommand::Resume, pk).await,
            Command::Kill { pk } => self.lifecycle(&rows, ActionCommand::Terminate, pk).await,
        }
    }

    async fn edit(
        &mut self,
        rows: &RowSet,
        pk: Pk,
        label: Option<String>,
        description: Option<String>,
    ) -> Result<()> {
        if label.is_none() && description.is_none() {
            bail!("nothing to edit: pass --label and/or --description");
        }
        let snapshot = rows
            .rows
            .iter()
            .find(|r| r.pk == pk)
            .cloned()
            .with_context(|| {
                format!("PK {pk} is not on the current page (use --page, --filter or --quick)")
            })?;
        let mut edited = snapshot.clone();
        for (field, value) in [("label", label), ("description", description)] {
            if let Some(v) = value {
                if !self.table.editable_fields.iter().any(|f| f == field) {
                    bail!("field '{field}' is not editable in {}", self.table.title);
                }
                edited.set(field, Value::from(v));
            }
        }
        if compute_delta(&snapshot, &edited, &self.table.editable_fields).is_empty() {
            self.notice(&Notice::info(format!("No changes for PK {pk}")));
            return Ok(());
        }

        self.send(TableCommand::Edit { snapshot, edited })?;
        loop {
            match self.next_event().await? {
                TableEvent::RowPending(row) => {
                    tracing::debug!(pk = %row.pk, "edit in flight");
                }
                TableEvent::RowPatched(row) if row.pk == pk => return self.print_row(&row),
                TableEvent::Notice(n) if n.level == NoticeLevel::Error => {
                    bail!("edit of PK {pk} was not saved");
                }
                _ => {}
            }
        }
    }

    async fn delete(&mut self, pk: Pk, yes: bool) -> Result<()> {
        self.send(TableCommand::RequestDelete(pk))?;
        let preview = loop {
            match self.next_event().await? {
                TableEvent::PreviewReady(p) if p.target == pk => break p,
                TableEvent::PreviewClosed => bail!("could not preview deletion of PK {pk}"),
                _ => {}
            }
        };
        for line in text_output::preview_lines(&preview) {
            self.stderr(line);
        }
        if !yes && !self.confirm().await? {
            self.send(TableCommand::CancelDelete)?;
            self.notice(&Notice::info(format!("Deletion of PK {pk} cancelled")));
            return Ok(());
        }

        self.send(TableCommand::ConfirmDelete)?;
        loop {
            match self.next_event().await? {
                TableEvent::Notice(n) if n.level == NoticeLevel::Success => break,
                TableEvent::Notice(n) if n.level == NoticeLevel::Error => {
                    bail!("deletion of PK {pk} failed");
                }
                _ => {}
            }
        }
        let (skip, rows) = self.await_page(|_| true).await?;
        self.print_page(skip, &rows)
    }

    /// Asks on stderr and reads one line from stdin.
    async fn confirm(&self) -> Result<bool> {
        self.stderr("Proceed? [y/N]".to_string());
        tokio::task::spawn_blocking(|| -> Result<bool> {
            let mut answer = String::new();
            std::io::stdin()
                .read_line(&mut answer)
                .context("failed to read confirmation")?;
            Ok(matches!(
                answer.trim().to_ascii_lowercase().as_str(),
                "y" | "yes"
            ))
        })
        .await
        .context("confirmation prompt task failed")?
    }

    async fn lifecycle(&mut self, rows: &RowSet, command: ActionCommand, pk: Pk) -> Result<()> {
        if let Some(row) = rows.rows.iter().find(|r| r.pk == pk) {
            if !available_actions(row, self.table.actions).contains(&command) {
                bail!(
                    "{} is not available for PK {pk} in its current state",
                    command.label()
                );
            }
        } else {
            tracing::info!(pk = %pk, "row not on current page, sending command anyway");
        }

        self.send(TableCommand::Action { command, pk })?;
        let outcome = loop {
            if let TableEvent::Notice(n) = self.next_event().await? {
                break n;
            }
        };
        // The page is refetched whether or not the command succeeded.
        let (skip, rows) = self.await_page(|_| true).await?;
        self.print_page(skip, &rows)?;
        if outcome.level == NoticeLevel::Error {
            bail!("{}", outcome.message);
        }
        Ok(())
    }
}
