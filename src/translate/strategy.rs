//! Per-mode rules for turning editor locations into dumped-file locations.
//!
//! A notebook shows every cell as its own document, while an interactive
//! window shows every executed cell inside one real source file. Both dump
//! cells through the kernel's `dumpCell` request and keep a
//! [`CellDumpStore`]; they differ in how a location is matched to a record
//! and in how `setBreakpoints` is split up.

use super::coordinates::{source_path, to_real, translate_lines_only, translate_sources, Direction};
use super::partition::{execute, partition};
use super::store::{CellDumpRecord, CellDumpStore};
use crate::cells::{index_covering_line, normalize_cell_code, Cell, CellSource, NormalizedCode};
use crate::config::DebugMode;
use crate::dap::channel::KernelChannel;
use crate::dap::types::{
    DebugInfoResponse, DumpCellArguments, DumpCellResponse, Message, PydevdSourceMap, Request, Response,
    SetPydevdSourceMapArguments, Source,
};
use crate::debug::state::SessionStatus;
use crate::{Error, Result};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// What to do with an editor request after translation.
#[derive(Debug)]
pub enum Outgoing {
    /// Send `request` to the kernel. `record` is the dump the request's own
    /// `source` was mapped to, used to translate a source-less response.
    Forward {
        request: Request,
        record: Option<CellDumpRecord>,
    },
    /// Already answered by the strategy.
    Handled(Response),
}

#[async_trait]
pub trait LocationStrategy: Send + Sync {
    fn mode(&self) -> DebugMode;

    /// Dumped-file naming reported by the kernel's `debugInfo`.
    fn set_debug_info(&mut self, info: DebugInfoResponse);

    fn store(&self) -> &CellDumpStore;

    /// Dump the cell at `index` and record it. `Ok(None)` when the kernel
    /// could not dump it; the failure has already been logged.
    async fn dump_cell(&mut self, index: usize, kernel: &dyn KernelChannel) -> Result<Option<CellDumpRecord>>;

    /// Editor to kernel.
    async fn translate_outgoing(&mut self, request: Request, kernel: &dyn KernelChannel) -> Result<Outgoing>;

    /// Kernel to editor, in place.
    async fn translate_incoming(
        &mut self,
        message: &mut Message,
        request_record: Option<&CellDumpRecord>,
        kernel: &dyn KernelChannel,
    ) -> Result<()>;

    fn dump_files_for_deletion(&self) -> Vec<String> {
        self.store().dump_files_for_deletion()
    }
}

/// Build the strategy for `mode`.
pub fn for_mode(
    mode: DebugMode,
    cells: Arc<dyn CellSource>,
    status: SessionStatus,
    code_gen_offset: i64,
) -> Box<dyn LocationStrategy> {
    match mode {
        DebugMode::Notebook => Box::new(NotebookStrategy::new(cells, status, code_gen_offset)),
        DebugMode::InteractiveWindow => Box::new(InteractiveWindowStrategy::new(cells, status, code_gen_offset)),
    }
}

/// Dumping and kernel-to-editor translation shared by both modes.
struct CellDumper {
    mode: DebugMode,
    cells: Arc<dyn CellSource>,
    store: CellDumpStore,
    status: SessionStatus,
    code_gen_offset: i64,
    debug_info: Option<DebugInfoResponse>,
    /// Code each cell's current record was dumped from, by logical id.
    dumped_code: HashMap<String, String>,
}

impl CellDumper {
    fn new(mode: DebugMode, cells: Arc<dyn CellSource>, status: SessionStatus, code_gen_offset: i64) -> Self {
        Self {
            mode,
            cells,
            store: CellDumpStore::new(),
            status,
            code_gen_offset,
            debug_info: None,
            dumped_code: HashMap::new(),
        }
    }

    fn record_for(&self, cell: &Cell, index: usize, code: &NormalizedCode, debug_file_path: String) -> CellDumpRecord {
        match self.mode {
            DebugMode::Notebook => CellDumpRecord {
                debug_file_path,
                logical_source_id: cell.id.clone(),
                display_path: cell.id.clone(),
                line_offset: code.stripped_lines.saturating_add(self.code_gen_offset),
                sort_key: index as i64,
                line_count: code.line_count,
            },
            DebugMode::InteractiveWindow => CellDumpRecord {
                debug_file_path,
                logical_source_id: cell.id.clone(),
                display_path: self.cells.document().to_string(),
                line_offset: cell
                    .start_line
                    .saturating_add(code.stripped_lines)
                    .saturating_add(self.code_gen_offset),
                sort_key: cell.start_line,
                line_count: code.line_count,
            },
        }
    }

    async fn dump_index(&mut self, index: usize, kernel: &dyn KernelChannel) -> Result<Option<CellDumpRecord>> {
        match self.cells.cell_at(index)? {
            Some(cell) => self.dump(cell, index, kernel).await,
            None => {
                warn!("No cell at index {} in {}", index, self.cells.document());
                Ok(None)
            }
        }
    }

    async fn dump(&mut self, cell: Cell, index: usize, kernel: &dyn KernelChannel) -> Result<Option<CellDumpRecord>> {
        self.status.ensure_live()?;

        let code = normalize_cell_code(&cell.text, self.mode == DebugMode::InteractiveWindow);
        let arguments = serde_json::to_value(DumpCellArguments { code: code.code.clone() })?;
        let outcome = kernel.request("dumpCell", Some(arguments)).await;

        if self.status.is_ended() {
            debug!("Discarding dump of {} that settled after the session ended", cell.id);
            return Ok(None);
        }

        let dumped = match outcome.and_then(dump_cell_body) {
            Ok(dumped) => dumped,
            Err(e) => {
                let err = Error::DumpFailed {
                    cell: cell.id.clone(),
                    reason: e.to_string(),
                };
                warn!("⚠️  {}", err);
                return Ok(None);
            }
        };

        let record = self.record_for(&cell, index, &code, dumped.source_path);
        self.store.record_dump(record.clone())?;
        self.dumped_code.insert(cell.id.clone(), code.code);
        info!(
            "📦 Dumped {} -> {} (offset {})",
            record.logical_source_id, record.debug_file_path, record.line_offset
        );
        Ok(Some(record))
    }

    /// Record for `cell`, dumping it first if it has not been dumped yet or
    /// has been edited since its last dump.
    async fn ensure_dumped(&mut self, cell: Cell, index: usize, kernel: &dyn KernelChannel) -> Result<Option<CellDumpRecord>> {
        if let Some(record) = self.store.find_by_logical_id(&cell.id) {
            let code = normalize_cell_code(&cell.text, self.mode == DebugMode::InteractiveWindow);
            let unchanged = self.dumped_code.get(&cell.id) == Some(&code.code)
                && *record == self.record_for(&cell, index, &code, record.debug_file_path.clone());
            if unchanged {
                return Ok(Some(record.clone()));
            }
            debug!("Cell {} changed since it was dumped, dumping again", cell.id);
        }
        self.dump(cell, index, kernel).await
    }

    /// Dump every cell without a record. A cell whose dump collides with
    /// another cell's file is skipped so the rest still get dumped.
    async fn dump_undumped(&mut self, kernel: &dyn KernelChannel) -> Result<()> {
        for (index, cell) in self.cells.cells()?.into_iter().enumerate() {
            if self.store.find_by_logical_id(&cell.id).is_some() {
                continue;
            }
            match self.dump(cell, index, kernel).await {
                Ok(_) => {}
                Err(e @ Error::DuplicatePath { .. }) => warn!("⚠️  {}", e),
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    /// Whether a `stackTrace` body names a dumped file this session does not
    /// know about yet.
    fn names_unknown_dump_file(&self, body: &Value) -> bool {
        let Some(info) = &self.debug_info else {
            return false;
        };
        let Some(frames) = body.get("stackFrames").and_then(Value::as_array) else {
            return false;
        };
        frames.iter().any(|frame| {
            frame
                .get("source")
                .and_then(|source| source.get("path"))
                .and_then(Value::as_str)
                .is_some_and(|path| info.is_dump_file(path) && self.store.find_by_debug_path(path).is_none())
        })
    }

    async fn translate_incoming(
        &mut self,
        message: &mut Message,
        request_record: Option<&CellDumpRecord>,
        kernel: &dyn KernelChannel,
    ) -> Result<()> {
        let (body, is_stack_trace) = match message {
            Message::Response(resp) => (resp.body.as_mut(), resp.command == "stackTrace"),
            Message::Event(evt) => (evt.body.as_mut(), false),
            Message::Request(_) => return Ok(()),
        };
        let Some(body) = body else {
            return Ok(());
        };

        if is_stack_trace && self.names_unknown_dump_file(body) {
            debug!("Stack trace names undumped cells of {}, dumping them", self.cells.document());
            self.dump_undumped(kernel).await?;
        }

        let store = &self.store;
        let translated = translate_sources(body, Direction::ToReal, &|path, _| store.find_by_debug_path(path));
        if translated == 0 {
            if let Some(record) = request_record {
                translate_lines_only(body, record, Direction::ToReal);
            }
        }
        Ok(())
    }
}

fn dump_cell_body(response: Response) -> Result<DumpCellResponse> {
    if !response.success {
        return Err(Error::Dap(
            response.message.unwrap_or_else(|| "dumpCell was rejected".to_string()),
        ));
    }
    let body = response
        .body
        .ok_or_else(|| Error::Dap("dumpCell response has no body".to_string()))?;
    Ok(serde_json::from_value(body)?)
}

fn request_source_path(request: &Request) -> Option<String> {
    request
        .arguments
        .as_ref()
        .and_then(Value::as_object)
        .and_then(source_path)
        .map(str::to_string)
}

fn breakpoint_lines(arguments: &Value) -> Vec<i64> {
    arguments
        .get("breakpoints")
        .and_then(Value::as_array)
        .map(|bps| bps.iter().filter_map(|bp| bp.get("line").and_then(Value::as_i64)).collect())
        .unwrap_or_default()
}

/// Translate every resolvable location of `request` to kernel coordinates.
fn forward_with<'r, F>(mut request: Request, lookup: F) -> Outgoing
where
    F: Fn(&str, Option<i64>) -> Option<&'r CellDumpRecord>,
{
    let mut record = None;
    if let Some(arguments) = request.arguments.as_mut() {
        record = arguments
            .as_object()
            .and_then(|object| {
                let line = object.get("line").and_then(Value::as_i64);
                source_path(object).and_then(|path| lookup(path, line))
            })
            .cloned();

        let translated = translate_sources(arguments, Direction::ToKernel, &lookup);
        if translated > 0 {
            debug!("Translated {} location(s) in {}", translated, request.command);
        }
    }
    Outgoing::Forward { request, record }
}

/// Each cell is its own document, addressed by its cell id.
pub struct NotebookStrategy {
    dumper: CellDumper,
}

impl NotebookStrategy {
    pub fn new(cells: Arc<dyn CellSource>, status: SessionStatus, code_gen_offset: i64) -> Self {
        Self {
            dumper: CellDumper::new(DebugMode::Notebook, cells, status, code_gen_offset),
        }
    }

    /// Re-dump the cell (its text may have changed since the last dump) and
    /// send its breakpoints to the resulting file.
    async fn set_breakpoints(&mut self, request: Request, index: usize, kernel: &dyn KernelChannel) -> Result<Outgoing> {
        let Some(record) = self.dumper.dump_index(index, kernel).await? else {
            return Ok(Outgoing::Forward { request, record: None });
        };

        let arguments = request.arguments.clone().unwrap_or_else(|| json!({}));
        let plan = partition(&arguments, |_| Some(&record));
        // An empty request still has to reach the kernel to clear the file
        let clears = if plan.groups.is_empty() {
            vec![record.clone()]
        } else {
            Vec::new()
        };
        let body = execute(&plan, &arguments, &clears, kernel).await?;
        self.dumper.status.ensure_live()?;

        Ok(Outgoing::Handled(Response::success(&request, Some(body))))
    }
}

#[async_trait]
impl LocationStrategy for NotebookStrategy {
    fn mode(&self) -> DebugMode {
        DebugMode::Notebook
    }

    fn set_debug_info(&mut self, info: DebugInfoResponse) {
        self.dumper.debug_info = Some(info);
    }

    fn store(&self) -> &CellDumpStore {
        &self.dumper.store
    }

    async fn dump_cell(&mut self, index: usize, kernel: &dyn KernelChannel) -> Result<Option<CellDumpRecord>> {
        self.dumper.dump_index(index, kernel).await
    }

    async fn translate_outgoing(&mut self, request: Request, kernel: &dyn KernelChannel) -> Result<Outgoing> {
        let path = request_source_path(&request);
        let index = match &path {
            Some(path) => self.dumper.cells.index_of(path)?,
            None => None,
        };

        if request.command == "setBreakpoints" {
            return match index {
                Some(index) => self.set_breakpoints(request, index, kernel).await,
                None => Ok(Outgoing::Forward { request, record: None }),
            };
        }

        if let (Some(path), Some(index)) = (&path, index) {
            if self.dumper.store.find_by_display_path(path).is_none() {
                self.dumper.dump_index(index, kernel).await?;
            }
        }

        let store = &self.dumper.store;
        Ok(forward_with(request, |path, _| store.find_by_display_path(path)))
    }

    async fn translate_incoming(
        &mut self,
        message: &mut Message,
        request_record: Option<&CellDumpRecord>,
        kernel: &dyn KernelChannel,
    ) -> Result<()> {
        self.dumper.translate_incoming(message, request_record, kernel).await
    }
}

/// All cells share one real source file; a location belongs to the nearest
/// dumped cell starting above it.
pub struct InteractiveWindowStrategy {
    dumper: CellDumper,
    /// Dumped files holding breakpoints after the last `setBreakpoints`,
    /// with the record they were set through.
    installed: HashMap<String, CellDumpRecord>,
}

impl InteractiveWindowStrategy {
    pub fn new(cells: Arc<dyn CellSource>, status: SessionStatus, code_gen_offset: i64) -> Self {
        Self {
            dumper: CellDumper::new(DebugMode::InteractiveWindow, cells, status, code_gen_offset),
            installed: HashMap::new(),
        }
    }

    /// Dump every cell covering one of `lines` that has no current dump.
    async fn dump_covering(&mut self, lines: &[i64], kernel: &dyn KernelChannel) -> Result<()> {
        let cells = self.dumper.cells.cells()?;
        let mut wanted: Vec<usize> = lines
            .iter()
            .filter_map(|line| index_covering_line(&cells, *line))
            .collect();
        wanted.sort_unstable();
        wanted.dedup();

        for index in wanted {
            self.dumper.ensure_dumped(cells[index].clone(), index, kernel).await?;
        }
        Ok(())
    }

    /// Describe every dumped cell of the document to pydevd. Failures are
    /// logged and otherwise ignored.
    async fn install_source_map(&self, kernel: &dyn KernelChannel) -> Result<()> {
        let document = self.dumper.cells.document();
        let code_gen_offset = self.dumper.code_gen_offset;
        let mut maps: Vec<PydevdSourceMap> = self
            .dumper
            .store
            .all_records()
            .filter(|record| record.display_path == document)
            .map(|record| {
                let (first, last) = code_lines(record, code_gen_offset);
                PydevdSourceMap {
                    line: to_real(record, first),
                    end_line: to_real(record, last),
                    runtime_line: first,
                    runtime_source: Source::from_path(record.debug_file_path.clone()),
                }
            })
            .collect();
        if maps.is_empty() {
            return Ok(());
        }
        maps.reverse();

        let count = maps.len();
        let arguments = serde_json::to_value(SetPydevdSourceMapArguments {
            source: Source::from_path(document),
            pydevd_source_maps: maps,
        })?;

        match kernel.request("setPydevdSourceMap", Some(arguments)).await {
            Ok(resp) if resp.success => debug!("Installed {} source map entries for {}", count, document),
            Ok(resp) => warn!(
                "⚠️  setPydevdSourceMap rejected for {}: {}",
                document,
                resp.message.unwrap_or_default()
            ),
            Err(e) => warn!("⚠️  setPydevdSourceMap failed for {}: {}", document, e),
        }
        self.dumper.status.ensure_live()
    }

    async fn set_breakpoints(&mut self, request: Request, kernel: &dyn KernelChannel) -> Result<Outgoing> {
        let arguments = request.arguments.clone().unwrap_or_else(|| json!({}));
        self.dump_covering(&breakpoint_lines(&arguments), kernel).await?;
        self.install_source_map(kernel).await?;

        let document = self.dumper.cells.document();
        let code_gen_offset = self.dumper.code_gen_offset;
        let store = &self.dumper.store;
        let plan = partition(&arguments, |line| owning_record(store, document, code_gen_offset, line));
        // Superseded dumps of edited cells are cleared too
        let clears: Vec<CellDumpRecord> = self
            .installed
            .iter()
            .filter(|(path, _)| !plan.groups.iter().any(|group| &group.record.debug_file_path == *path))
            .map(|(_, record)| record.clone())
            .collect();

        let body = execute(&plan, &arguments, &clears, kernel).await?;
        self.dumper.status.ensure_live()?;

        self.installed = plan
            .groups
            .iter()
            .map(|group| (group.record.debug_file_path.clone(), group.record.clone()))
            .collect();
        Ok(Outgoing::Handled(Response::success(&request, Some(body))))
    }
}

/// First and last line of the cell's code inside its dumped file. Lines the
/// kernel prepends (a negative `code_gen_offset`) come before the code.
fn code_lines(record: &CellDumpRecord, code_gen_offset: i64) -> (i64, i64) {
    let first = 1i64.saturating_sub(code_gen_offset).max(1);
    let count = i64::try_from(record.line_count.max(1)).unwrap_or(i64::MAX);
    (first, first.saturating_add(count - 1))
}

/// Dumped cell of `document` whose code covers the 1-based `line`.
fn owning_record<'s>(
    store: &'s CellDumpStore,
    document: &str,
    code_gen_offset: i64,
    line: i64,
) -> Option<&'s CellDumpRecord> {
    store.find_nearest_preceding_in(document, line).filter(|record| {
        let (first, last) = code_lines(record, code_gen_offset);
        (to_real(record, first)..=to_real(record, last)).contains(&line)
    })
}

#[async_trait]
impl LocationStrategy for InteractiveWindowStrategy {
    fn mode(&self) -> DebugMode {
        DebugMode::InteractiveWindow
    }

    fn set_debug_info(&mut self, info: DebugInfoResponse) {
        self.dumper.debug_info = Some(info);
    }

    fn store(&self) -> &CellDumpStore {
        &self.dumper.store
    }

    async fn dump_cell(&mut self, index: usize, kernel: &dyn KernelChannel) -> Result<Option<CellDumpRecord>> {
        self.dumper.dump_index(index, kernel).await
    }

    async fn translate_outgoing(&mut self, request: Request, kernel: &dyn KernelChannel) -> Result<Outgoing> {
        let on_document = request_source_path(&request).as_deref() == Some(self.dumper.cells.document());

        if on_document && request.command == "setBreakpoints" {
            return self.set_breakpoints(request, kernel).await;
        }

        if on_document {
            let line = request
                .arguments
                .as_ref()
                .and_then(|args| args.get("line"))
                .and_then(Value::as_i64);
            if let Some(line) = line {
                self.dump_covering(&[line], kernel).await?;
            }
        }

        let document = self.dumper.cells.document();
        let code_gen_offset = self.dumper.code_gen_offset;
        let store = &self.dumper.store;
        Ok(forward_with(request, |path, line| {
            if path != document {
                return None;
            }
            line.and_then(|line| owning_record(store, document, code_gen_offset, line))
        }))
    }

    async fn translate_incoming(
        &mut self,
        message: &mut Message,
        request_record: Option<&CellDumpRecord>,
        kernel: &dyn KernelChannel,
    ) -> Result<()> {
        self.dumper.translate_incoming(message, request_record, kernel).await
    }
}
