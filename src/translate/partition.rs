//! Splitting one `setBreakpoints` request across dumped files.
//!
//! The editor sends every breakpoint of a document in one request, but each
//! cell runs from its own dumped file in the kernel. The plan built here
//! groups breakpoints by owning record, one `setBreakpoints` per dumped file,
//! and remembers where each breakpoint came from so the kernel's answers can
//! be put back in request order.

use super::coordinates::{file_name, translate_line_fields, translate_location, Direction};
use super::store::CellDumpRecord;
use crate::dap::channel::KernelChannel;
use crate::dap::types::Breakpoint;
use crate::{Error, Result};
use futures::future::join_all;
use serde_json::{json, Map, Value};
use tracing::{debug, warn};

/// Breakpoints of one request that land in the same dumped file.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingBreakpointGroup {
    pub record: CellDumpRecord,
    /// Breakpoint objects, already in kernel coordinates.
    pub breakpoints: Vec<Value>,
    /// Index of each breakpoint in the original request.
    pub origins: Vec<usize>,
}

/// Where the answer for one requested breakpoint comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Group { group: usize, position: usize },
    /// Not inside any dumped cell; answered locally.
    Unmapped { line: Option<i64> },
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct BreakpointPlan {
    pub groups: Vec<PendingBreakpointGroup>,
    pub slots: Vec<Slot>,
}

impl BreakpointPlan {
    pub fn unmapped_count(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| matches!(slot, Slot::Unmapped { .. }))
            .count()
    }
}

/// Group the breakpoints of `arguments` by the record `owner` assigns to
/// each line. Groups are ordered by first encounter; a record met again
/// later joins its existing group.
pub fn partition<'r, F>(arguments: &Value, owner: F) -> BreakpointPlan
where
    F: Fn(i64) -> Option<&'r CellDumpRecord>,
{
    let mut plan = BreakpointPlan::default();
    let breakpoints = arguments
        .get("breakpoints")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    for (index, breakpoint) in breakpoints.into_iter().enumerate() {
        let line = breakpoint.get("line").and_then(Value::as_i64);
        let Some(record) = line.and_then(&owner) else {
            plan.slots.push(Slot::Unmapped { line });
            continue;
        };

        let group = match plan
            .groups
            .iter()
            .position(|g| g.record.debug_file_path == record.debug_file_path)
        {
            Some(group) => group,
            None => {
                plan.groups.push(PendingBreakpointGroup {
                    record: record.clone(),
                    breakpoints: Vec::new(),
                    origins: Vec::new(),
                });
                plan.groups.len() - 1
            }
        };

        let mut translated = breakpoint;
        if let Value::Object(object) = &mut translated {
            translate_line_fields(object, record, Direction::ToKernel);
        }

        let pending = &mut plan.groups[group];
        plan.slots.push(Slot::Group {
            group,
            position: pending.breakpoints.len(),
        });
        pending.breakpoints.push(translated);
        pending.origins.push(index);
    }

    plan
}

/// Arguments for the sub-request of one group: the original arguments with
/// the source moved to the dumped file and only this group's breakpoints.
pub fn sub_request_arguments(original: &Value, group: &PendingBreakpointGroup) -> Value {
    file_arguments(original, &group.record, group.breakpoints.clone())
}

/// Arguments that clear every breakpoint of `record`'s dumped file.
pub fn clear_request_arguments(original: &Value, record: &CellDumpRecord) -> Value {
    file_arguments(original, record, Vec::new())
}

fn file_arguments(original: &Value, record: &CellDumpRecord, breakpoints: Vec<Value>) -> Value {
    let mut arguments = match original {
        Value::Object(object) => object.clone(),
        _ => Map::new(),
    };

    let mut source = arguments
        .get("source")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();
    if source.contains_key("name") {
        source.insert(
            "name".to_string(),
            Value::String(file_name(&record.debug_file_path).to_string()),
        );
    }
    source.insert("path".to_string(), Value::String(record.debug_file_path.clone()));
    source.remove("sourceReference");
    arguments.insert("source".to_string(), Value::Object(source));

    if arguments.contains_key("lines") {
        let lines: Vec<Value> = breakpoints
            .iter()
            .filter_map(|bp| bp.get("line").cloned())
            .collect();
        arguments.insert("lines".to_string(), Value::Array(lines));
    }
    arguments.insert("breakpoints".to_string(), Value::Array(breakpoints));

    Value::Object(arguments)
}

/// Send every sub-request of `plan` (plus an empty request for each record
/// in `clears`) concurrently, wait for all of them, and merge the answers
/// into one `setBreakpoints` response body in request order.
///
/// Fails if any sub-request fails or is answered with `success: false`.
pub async fn execute(
    plan: &BreakpointPlan,
    original: &Value,
    clears: &[CellDumpRecord],
    kernel: &dyn KernelChannel,
) -> Result<Value> {
    debug!(
        "Partitioned setBreakpoints into {} sub-request(s), {} unmapped, {} clear(s)",
        plan.groups.len(),
        plan.unmapped_count(),
        clears.len()
    );

    let targets: Vec<(&CellDumpRecord, Value)> = plan
        .groups
        .iter()
        .map(|group| (&group.record, sub_request_arguments(original, group)))
        .chain(
            clears
                .iter()
                .map(|record| (record, clear_request_arguments(original, record))),
        )
        .collect();

    let results = join_all(
        targets
            .iter()
            .map(|(_, arguments)| kernel.request("setBreakpoints", Some(arguments.clone()))),
    )
    .await;

    let mut answers: Vec<Vec<Value>> = Vec::with_capacity(plan.groups.len());
    for ((record, _), result) in targets.iter().zip(results) {
        let response = result?;
        if !response.success {
            return Err(Error::Dap(format!(
                "setBreakpoints failed for {}: {}",
                record.debug_file_path,
                response.message.unwrap_or_else(|| "no message".to_string())
            )));
        }

        let mut breakpoints = response
            .body
            .as_ref()
            .and_then(|body| body.get("breakpoints"))
            .and_then(Value::as_array)
            .cloned()
            .unwrap_or_default();
        for breakpoint in breakpoints.iter_mut() {
            if let Value::Object(object) = breakpoint {
                translate_location(object, record, Direction::ToReal);
            }
        }
        answers.push(breakpoints);
    }

    let merged = plan
        .slots
        .iter()
        .map(|slot| match *slot {
            Slot::Group { group, position } => match answers.get(group).and_then(|answer| answer.get(position)) {
                Some(answer) => Ok(answer.clone()),
                None => {
                    warn!("Kernel answered fewer breakpoints than requested for group {}", group);
                    local_answer(false, None, Some("No answer from kernel debugger"))
                }
            },
            Slot::Unmapped { line } => local_answer(true, line, None),
        })
        .collect::<Result<Vec<Value>>>()?;

    Ok(json!({ "breakpoints": merged }))
}

/// Breakpoint answered by the proxy itself.
fn local_answer(verified: bool, line: Option<i64>, message: Option<&str>) -> Result<Value> {
    Ok(serde_json::to_value(Breakpoint {
        id: None,
        verified,
        message: message.map(str::to_string),
        source: None,
        line,
        column: None,
    })?)
}
