//! Line and path rewriting between editor and kernel coordinates.
//!
//! Everything here is pure: given a [`CellDumpRecord`] and a JSON payload it
//! rewrites location fields in place. Payloads are handled as
//! `serde_json::Value` so fields the proxy does not understand reach the
//! other side untouched.

use super::store::CellDumpRecord;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Editor coordinates to dumped-file coordinates (requests).
    ToKernel,
    /// Dumped-file coordinates to editor coordinates (responses, events).
    ToReal,
}

const LINE_FIELDS: [&str; 2] = ["line", "endLine"];
const NESTED_LOCATION_ARRAYS: [&str; 2] = ["breakpoints", "targets"];

/// Lines come straight from editor or kernel JSON, so out-of-range values
/// saturate instead of overflowing.
pub fn to_real(record: &CellDumpRecord, kernel_line: i64) -> i64 {
    kernel_line.saturating_add(record.line_offset)
}

pub fn to_kernel(record: &CellDumpRecord, real_line: i64) -> i64 {
    real_line.saturating_sub(record.line_offset)
}

pub fn translate_line(record: &CellDumpRecord, line: i64, direction: Direction) -> i64 {
    match direction {
        Direction::ToKernel => to_kernel(record, line),
        Direction::ToReal => to_real(record, line),
    }
}

/// `source.path` of a location-bearing object, if it has one.
pub fn source_path(object: &Map<String, Value>) -> Option<&str> {
    object.get("source")?.get("path")?.as_str()
}

/// Rewrite the source and line fields of one object known to refer to
/// `record`.
pub fn translate_location(object: &mut Map<String, Value>, record: &CellDumpRecord, direction: Direction) {
    if let Some(Value::Object(source)) = object.get_mut("source") {
        let path = match direction {
            Direction::ToKernel => &record.debug_file_path,
            Direction::ToReal => &record.display_path,
        };
        if source.contains_key("name") {
            source.insert("name".to_string(), Value::String(file_name(path).to_string()));
        }
        source.insert("path".to_string(), Value::String(path.clone()));
    }
    translate_line_fields(object, record, direction);
}

/// Rewrite `line`, `endLine`, `lines[]` and the lines of nested
/// breakpoint/target objects, leaving `source` alone.
pub fn translate_line_fields(object: &mut Map<String, Value>, record: &CellDumpRecord, direction: Direction) {
    for field in LINE_FIELDS {
        if let Some(line) = object.get(field).and_then(Value::as_i64) {
            object.insert(field.to_string(), Value::from(translate_line(record, line, direction)));
        }
    }

    if let Some(Value::Array(lines)) = object.get_mut("lines") {
        for line in lines.iter_mut() {
            if let Some(n) = line.as_i64() {
                *line = Value::from(translate_line(record, n, direction));
            }
        }
    }

    for key in NESTED_LOCATION_ARRAYS {
        if let Some(Value::Array(items)) = object.get_mut(key) {
            for item in items.iter_mut() {
                if let Value::Object(nested) = item {
                    translate_location(nested, record, direction);
                }
            }
        }
    }
}

/// Walk `value` and translate every object whose `source.path` resolves
/// through `lookup` (called with the path and the object's `line`).
///
/// Returns how many objects were translated; when it is 0 the payload was
/// not modified.
pub fn translate_sources<'r, F>(value: &mut Value, direction: Direction, lookup: &F) -> usize
where
    F: Fn(&str, Option<i64>) -> Option<&'r CellDumpRecord>,
{
    match value {
        Value::Object(object) => {
            let line = object.get("line").and_then(Value::as_i64);
            if let Some(record) = source_path(object).and_then(|path| lookup(path, line)) {
                translate_location(object, record, direction);
                return 1;
            }
            object
                .values_mut()
                .map(|nested| translate_sources(nested, direction, lookup))
                .sum()
        }
        Value::Array(items) => items
            .iter_mut()
            .map(|item| translate_sources(item, direction, lookup))
            .sum(),
        _ => 0,
    }
}

/// Translate line fields of a response body whose location objects carry no
/// `source` of their own (e.g. `breakpointLocations`), using the record the
/// request was translated with.
pub fn translate_lines_only(value: &mut Value, record: &CellDumpRecord, direction: Direction) {
    if let Value::Object(object) = value {
        translate_line_fields(object, record, direction);
    }
}

pub(crate) fn file_name(path: &str) -> &str {
    path.rsplit(|c: char| c == '/' || c == '\\').next().unwrap_or(path)
}
