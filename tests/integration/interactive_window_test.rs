/// Interactive-window mode: every cell lives in one real `# %%` source file
#[path = "../helpers/mod.rs"]
mod helpers;

use helpers::{dump_path, request, ScriptedKernel};
use jupyter_dap_proxy::cells::{CellSource, MarkedFile};
use jupyter_dap_proxy::dap::types::Event;
use jupyter_dap_proxy::debug::{Bridge, NoopTracker, SessionStatus};
use jupyter_dap_proxy::translate::strategy::for_mode;
use jupyter_dap_proxy::DebugMode;
use serde_json::{json, Value};
use std::io::Write;
use std::sync::Arc;
use tempfile::NamedTempFile;

const ANALYSIS: &str = "import os\n\n# %% load\ndata = [1, 2]\n\n# %%\n\ntotal = sum(data)\nprint(total)\n";
const LOAD_CELL: &str = "data = [1, 2]\n";
const TOTAL_CELL: &str = "total = sum(data)\nprint(total)\n";

struct Fixture {
    _file: NamedTempFile,
    document: String,
    kernel: Arc<ScriptedKernel>,
    bridge: Bridge,
}

fn fixture(code_gen_offset: i64) -> Fixture {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(ANALYSIS.as_bytes()).unwrap();
    let cells = Arc::new(MarkedFile::new(file.path()));
    let document = cells.document().to_string();

    let kernel = Arc::new(ScriptedKernel::default());
    let status = SessionStatus::new();
    let strategy = for_mode(DebugMode::InteractiveWindow, cells, status.clone(), code_gen_offset);
    let bridge = Bridge::new(strategy, status, kernel.clone(), Arc::new(NoopTracker));

    Fixture {
        _file: file,
        document,
        kernel,
        bridge,
    }
}

fn set_breakpoints(document: &str, lines: &[i64]) -> Value {
    json!({
        "source": {"name": "analysis.py", "path": document},
        "breakpoints": lines.iter().map(|line| json!({"line": line})).collect::<Vec<_>>(),
        "lines": lines,
    })
}

fn lines_of(body: &Value) -> Vec<i64> {
    body["breakpoints"]
        .as_array()
        .unwrap()
        .iter()
        .map(|bp| bp["line"].as_i64().unwrap())
        .collect()
}

#[tokio::test]
async fn test_breakpoints_are_split_per_executed_cell() {
    let mut fx = fixture(0);

    let response = fx
        .bridge
        .handle_client_request(request(1, "setBreakpoints", set_breakpoints(&fx.document, &[9, 4, 8])))
        .await
        .unwrap();

    assert_eq!(
        fx.kernel.state.commands(),
        vec!["debugInfo", "dumpCell", "dumpCell", "setPydevdSourceMap", "setBreakpoints", "setBreakpoints"]
    );

    // Groups follow first encounter: the last cell (line 9) comes first
    let sent = fx.kernel.state.sent("setBreakpoints");
    assert_eq!(sent[0]["source"]["path"], json!(dump_path(TOTAL_CELL)));
    assert_eq!(sent[0]["lines"], json!([2, 1]));
    assert_eq!(sent[1]["source"]["path"], json!(dump_path(LOAD_CELL)));
    assert_eq!(sent[1]["lines"], json!([1]));

    let body = response.body.unwrap();
    assert_eq!(lines_of(&body), vec![9, 4, 8]);
    assert!(body["breakpoints"]
        .as_array()
        .unwrap()
        .iter()
        .all(|bp| bp["source"]["path"] == json!(fx.document)));
}

#[tokio::test]
async fn test_lines_outside_cells_are_verified_without_the_kernel() {
    let mut fx = fixture(0);

    // Line 3 is a marker, line 7 the blank line stripped from the last cell
    let response = fx
        .bridge
        .handle_client_request(request(1, "setBreakpoints", set_breakpoints(&fx.document, &[3, 7, 8])))
        .await
        .unwrap();

    let sent = fx.kernel.state.sent("setBreakpoints");
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0]["breakpoints"], json!([{"line": 1}]));

    let body = response.body.unwrap();
    assert_eq!(body["breakpoints"][0], json!({"verified": true, "line": 3}));
    assert_eq!(body["breakpoints"][1], json!({"verified": true, "line": 7}));
    assert_eq!(body["breakpoints"][2]["line"], json!(8));
}

#[tokio::test]
async fn test_source_map_is_sent_before_breakpoints() {
    let mut fx = fixture(0);

    fx.bridge
        .handle_client_request(request(1, "setBreakpoints", set_breakpoints(&fx.document, &[4, 9])))
        .await
        .unwrap();

    let maps = fx.kernel.state.sent("setPydevdSourceMap");
    assert_eq!(maps.len(), 1);
    assert_eq!(
        maps[0]["pydevdSourceMaps"],
        json!([
            {"line": 4, "endLine": 4, "runtimeLine": 1, "runtimeSource": {"path": dump_path(LOAD_CELL)}},
            {"line": 8, "endLine": 9, "runtimeLine": 1, "runtimeSource": {"path": dump_path(TOTAL_CELL)}}
        ])
    );
}

#[tokio::test]
async fn test_removed_breakpoints_are_cleared_in_the_kernel() {
    let mut fx = fixture(0);

    fx.bridge
        .handle_client_request(request(1, "setBreakpoints", set_breakpoints(&fx.document, &[4, 8])))
        .await
        .unwrap();
    let response = fx
        .bridge
        .handle_client_request(request(2, "setBreakpoints", set_breakpoints(&fx.document, &[])))
        .await
        .unwrap();

    let sent = fx.kernel.state.sent("setBreakpoints");
    assert_eq!(sent.len(), 4);
    let mut cleared: Vec<String> = sent[2..]
        .iter()
        .map(|args| {
            assert_eq!(args["breakpoints"], json!([]));
            args["source"]["path"].as_str().unwrap().to_string()
        })
        .collect();
    cleared.sort();
    let mut expected = vec![dump_path(LOAD_CELL), dump_path(TOTAL_CELL)];
    expected.sort();
    assert_eq!(cleared, expected);
    assert_eq!(response.body.unwrap(), json!({"breakpoints": []}));
}

#[tokio::test]
async fn test_stack_trace_into_undumped_cell_is_mapped() {
    let mut fx = fixture(0);
    fx.kernel.state.reply(
        "stackTrace",
        json!({"stackFrames": [
            {"id": 3, "name": "<module>", "line": 2, "column": 1, "source": {"path": dump_path(TOTAL_CELL)}},
            {"id": 4, "name": "<module>", "line": 1, "column": 1, "source": {"path": dump_path(LOAD_CELL)}}
        ], "totalFrames": 2}),
    );

    let response = fx
        .bridge
        .handle_client_request(request(5, "stackTrace", json!({"threadId": 1})))
        .await
        .unwrap();

    assert_eq!(fx.kernel.state.sent("dumpCell").len(), 3);
    let frames = response.body.unwrap()["stackFrames"].clone();
    assert_eq!(frames[0]["source"]["path"], json!(fx.document));
    assert_eq!(frames[0]["line"], json!(9));
    assert_eq!(frames[1]["line"], json!(4));
}

#[tokio::test]
async fn test_stopped_event_after_breakpoint_hit() {
    let mut fx = fixture(0);
    fx.bridge
        .handle_client_request(request(1, "setBreakpoints", set_breakpoints(&fx.document, &[8])))
        .await
        .unwrap();

    let event = fx
        .bridge
        .handle_kernel_event(Event {
            seq: 12,
            event: "breakpoint".to_string(),
            body: Some(json!({
                "reason": "changed",
                "breakpoint": {"id": 1, "verified": true, "line": 1, "source": {"path": dump_path(TOTAL_CELL)}}
            })),
        })
        .await
        .unwrap();

    let breakpoint = &event.body.unwrap()["breakpoint"];
    assert_eq!(breakpoint["line"], json!(8));
    assert_eq!(breakpoint["source"]["path"], json!(fx.document));
}

#[tokio::test]
async fn test_kernel_prologue_shifts_every_line() {
    let mut fx = fixture(-2);

    let response = fx
        .bridge
        .handle_client_request(request(1, "setBreakpoints", set_breakpoints(&fx.document, &[8])))
        .await
        .unwrap();

    // Two injected lines ahead of the cell code push it down in the dump
    assert_eq!(fx.kernel.state.sent("setBreakpoints")[0]["lines"], json!([3]));
    let map = &fx.kernel.state.sent("setPydevdSourceMap")[0]["pydevdSourceMaps"][0];
    assert_eq!(map["line"], json!(8));
    assert_eq!(map["endLine"], json!(9));
    assert_eq!(map["runtimeLine"], json!(3));

    let body = response.body.unwrap();
    assert_eq!(lines_of(&body), vec![8]);
    assert_eq!(body["breakpoints"][0]["verified"], json!(true));
}

#[tokio::test]
async fn test_edited_cell_is_dumped_again() {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(b"# %%\nx = 1\n").unwrap();
    let cells = Arc::new(MarkedFile::new(file.path()));
    let document = cells.document().to_string();
    let kernel = Arc::new(ScriptedKernel::default());
    let status = SessionStatus::new();
    let strategy = for_mode(DebugMode::InteractiveWindow, cells, status.clone(), 0);
    let mut bridge = Bridge::new(strategy, status, kernel.clone(), Arc::new(NoopTracker));

    bridge
        .handle_client_request(request(1, "setBreakpoints", set_breakpoints(&document, &[2])))
        .await
        .unwrap();

    std::fs::write(file.path(), "# %%\n# new comment\n# another\nx = 1\n").unwrap();
    let edited = "# new comment\n# another\nx = 1\n";
    let response = bridge
        .handle_client_request(request(2, "setBreakpoints", set_breakpoints(&document, &[4])))
        .await
        .unwrap();

    assert_eq!(kernel.state.sent("dumpCell").len(), 2);
    assert_eq!(kernel.state.sent("dumpCell")[1], json!({"code": edited}));

    let sent = kernel.state.sent("setBreakpoints");
    assert_eq!(sent.len(), 3);
    assert_eq!(sent[1]["source"]["path"], json!(dump_path(edited)));
    assert_eq!(sent[1]["breakpoints"], json!([{"line": 3}]));
    // The superseded dump loses its breakpoint
    assert_eq!(sent[2]["source"]["path"], json!(dump_path("x = 1\n")));
    assert_eq!(sent[2]["breakpoints"], json!([]));

    let breakpoint = &response.body.unwrap()["breakpoints"][0];
    assert_eq!(breakpoint["line"], json!(4));
    assert_eq!(breakpoint["id"], json!(1));
    assert_eq!(breakpoint["source"]["path"], json!(document));
}
