//! Cells of the document being debugged.
//!
//! The proxy never owns the notebook; it asks a [`CellSource`] for the
//! current cells whenever it needs to dump one. Two sources ship with the
//! crate: [`StaticCells`] for embedding callers that already hold cell text,
//! and [`MarkedFile`] for plain source files split by `# %%` markers (the
//! file behind an interactive window).

use crate::{Error, Result};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// One cell as the owning document currently sees it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cell {
    /// Stable per-cell identity, used as the logical source id.
    pub id: String,
    /// Current text of the cell body.
    pub text: String,
    /// 0-based index of the body's first line within the owning document.
    pub start_line: i64,
}

/// Ordered, index-addressable sequence of cells.
pub trait CellSource: Send + Sync {
    /// Path or URI of the owning document.
    fn document(&self) -> &str;

    /// Snapshot of all cells, in document order.
    fn cells(&self) -> Result<Vec<Cell>>;

    fn cell_at(&self, index: usize) -> Result<Option<Cell>> {
        Ok(self.cells()?.into_iter().nth(index))
    }

    /// Index of the cell with identity `id`.
    fn index_of(&self, id: &str) -> Result<Option<usize>> {
        Ok(self.cells()?.iter().position(|cell| cell.id == id))
    }
}

/// Index of the cell in `cells` whose body covers the 1-based document line
/// `line`. A marker line belongs to the cell above it.
pub fn index_covering_line(cells: &[Cell], line: i64) -> Option<usize> {
    cells.iter().rposition(|cell| cell.start_line < line)
}

/// Cells held in memory and updated by the embedding caller.
pub struct StaticCells {
    document: String,
    cells: RwLock<Vec<Cell>>,
}

impl StaticCells {
    pub fn new(document: impl Into<String>, cells: Vec<Cell>) -> Self {
        Self {
            document: document.into(),
            cells: RwLock::new(cells),
        }
    }

    /// Replace the text of the cell with identity `id`.
    pub fn set_text(&self, id: &str, text: impl Into<String>) -> Result<()> {
        let mut cells = self
            .cells
            .write()
            .map_err(|_| Error::Internal("cell list lock poisoned".to_string()))?;
        let cell = cells
            .iter_mut()
            .find(|cell| cell.id == id)
            .ok_or_else(|| Error::InvalidRequest(format!("Unknown cell: {}", id)))?;
        cell.text = text.into();
        Ok(())
    }
}

impl CellSource for StaticCells {
    fn document(&self) -> &str {
        &self.document
    }

    fn cells(&self) -> Result<Vec<Cell>> {
        self.cells
            .read()
            .map(|cells| cells.clone())
            .map_err(|_| Error::Internal("cell list lock poisoned".to_string()))
    }
}

/// A source file split into cells by `# %%` style markers.
///
/// The file is re-read on every call so edits made while debugging are seen
/// the next time a cell is dumped.
pub struct MarkedFile {
    path: PathBuf,
    document: String,
}

impl MarkedFile {
    pub fn new(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref().to_path_buf();
        let document = path.to_string_lossy().into_owned();
        Self { path, document }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CellSource for MarkedFile {
    fn document(&self) -> &str {
        &self.document
    }

    fn cells(&self) -> Result<Vec<Cell>> {
        let text = std::fs::read_to_string(&self.path)?;
        Ok(split_marked_cells(&self.document, &text))
    }
}

pub fn is_cell_marker(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("# %%")
        || trimmed.starts_with("#%%")
        || trimmed.starts_with("# <codecell>")
        || trimmed.starts_with("# In[")
}

/// Split `text` into cells at marker lines. Text before the first marker
/// becomes a cell only if it holds something other than blank lines.
pub fn split_marked_cells(document: &str, text: &str) -> Vec<Cell> {
    let text = normalize_newlines(text);

    let mut cells = Vec::new();
    let mut body: Vec<&str> = Vec::new();
    let mut start_line: i64 = 0;
    let mut seen_marker = false;

    for (index, line) in text.split('\n').enumerate() {
        if is_cell_marker(line) {
            push_cell(&mut cells, document, &body, start_line, seen_marker);
            body.clear();
            seen_marker = true;
            start_line = index as i64 + 1;
        } else {
            body.push(line);
        }
    }
    push_cell(&mut cells, document, &body, start_line, seen_marker);

    cells
}

fn push_cell(cells: &mut Vec<Cell>, document: &str, body: &[&str], start_line: i64, seen_marker: bool) {
    if !seen_marker && body.iter().all(|line| line.trim().is_empty()) {
        return;
    }
    cells.push(Cell {
        id: format!("{}#cell{}", document, cells.len()),
        text: body.join("\n"),
        start_line,
    });
}

pub fn normalize_newlines(text: &str) -> String {
    text.replace("\r\n", "\n")
}

/// Cell code as sent to the kernel, with what was stripped from its head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedCode {
    pub code: String,
    /// Lines removed before the first line the kernel sees.
    pub stripped_lines: i64,
    pub line_count: usize,
}

/// Normalize cell text for `dumpCell`: `\n` line endings and, when
/// `strip_leading_blank` is set, no blank lines before the first statement.
pub fn normalize_cell_code(text: &str, strip_leading_blank: bool) -> NormalizedCode {
    let text = normalize_newlines(text);

    let mut stripped_lines = 0;
    let mut rest = text.as_str();
    if strip_leading_blank {
        while let Some(newline) = rest.find('\n') {
            if !rest[..newline].trim().is_empty() {
                break;
            }
            rest = &rest[newline + 1..];
            stripped_lines += 1;
        }
    }

    let code = rest.to_string();
    let line_count = code.lines().count();
    NormalizedCode {
        code,
        stripped_lines,
        line_count,
    }
}
