/// Full proxy over real sockets: editor pipe in, fake kernel debugger on TCP
#[path = "../helpers/mod.rs"]
mod helpers;

use helpers::{editor_pipe, request, KernelServer};
use jupyter_dap_proxy::config::ListenMode;
use jupyter_dap_proxy::dap::types::{Message, Response};
use jupyter_dap_proxy::{DebugMode, ProxyConfig, ProxyServer};
use serde_json::json;
use std::path::Path;
use std::time::Duration;

const SCRIPT: &str = "import math\n\n# %%\nradius = 2\narea = math.pi * radius ** 2\nprint(area)\n";
const AREA_CELL: &str = "radius = 2\narea = math.pi * radius ** 2\nprint(area)\n";

fn config(kernel_addr: &str, cells_file: &Path, keep_dump_files: bool) -> ProxyConfig {
    ProxyConfig {
        mode: DebugMode::InteractiveWindow,
        listen: ListenMode::Stdio,
        kernel_addr: kernel_addr.to_string(),
        cells_file: cells_file.to_path_buf(),
        code_gen_offset: 0,
        keep_dump_files,
        trace_locations: true,
    }
}

async fn next(reader: &mut jupyter_dap_proxy::dap::transport::FramedReader) -> Message {
    tokio::time::timeout(Duration::from_secs(5), reader.read_message())
        .await
        .expect("proxy did not answer in time")
        .unwrap()
}

async fn next_response(reader: &mut jupyter_dap_proxy::dap::transport::FramedReader) -> Response {
    match next(reader).await {
        Message::Response(resp) => resp,
        other => panic!("expected a response, got {:?}", other),
    }
}

#[tokio::test]
async fn test_breakpoint_hit_round_trip_and_cleanup() {
    let workdir = tempfile::tempdir().unwrap();
    let dumps = tempfile::tempdir().unwrap();
    let script = workdir.path().join("area.py");
    std::fs::write(&script, SCRIPT).unwrap();
    let document = script.to_string_lossy().into_owned();

    let kernel = KernelServer::start().await;
    kernel.state.dump_into(dumps.path());
    let dump_file = kernel.state.dump_path(AREA_CELL);

    let server = ProxyServer::new(config(&kernel.addr, &script, false));
    let (proxy_side, editor_side) = editor_pipe();
    let session = tokio::spawn({
        let server = server.clone();
        async move { server.serve_connection(proxy_side).await }
    });
    let (mut editor_reader, mut editor_writer) = editor_side.into_split();

    // Breakpoint on `area = ...`, line 5 of the script
    editor_writer
        .write_message(&Message::Request(request(
            1,
            "setBreakpoints",
            json!({"source": {"path": document}, "breakpoints": [{"line": 5}], "lines": [5]}),
        )))
        .await
        .unwrap();
    let resp = next_response(&mut editor_reader).await;
    assert!(resp.success);
    assert_eq!(resp.request_seq, 1);
    assert_eq!(resp.command, "setBreakpoints");
    let breakpoint = &resp.body.unwrap()["breakpoints"][0];
    assert_eq!(breakpoint["line"], json!(5));
    assert_eq!(breakpoint["source"]["path"], json!(document));

    assert!(Path::new(&dump_file).exists());
    assert_eq!(kernel.state.sent("setBreakpoints")[0]["lines"], json!([2]));

    kernel.emit(
        "stopped",
        json!({"reason": "breakpoint", "threadId": 1, "source": {"path": dump_file}, "line": 2}),
    );
    let Message::Event(stopped) = next(&mut editor_reader).await else {
        panic!("expected the stopped event");
    };
    assert_eq!(stopped.event, "stopped");
    let body = stopped.body.unwrap();
    assert_eq!(body["source"]["path"], json!(document));
    assert_eq!(body["line"], json!(5));

    kernel.state.reply(
        "stackTrace",
        json!({"stackFrames": [
            {"id": 1, "name": "<module>", "line": 2, "column": 1, "source": {"path": dump_file}}
        ], "totalFrames": 1}),
    );
    editor_writer
        .write_message(&Message::Request(request(2, "stackTrace", json!({"threadId": 1}))))
        .await
        .unwrap();
    let trace = next_response(&mut editor_reader).await;
    assert_eq!(trace.request_seq, 2);
    let frame = &trace.body.unwrap()["stackFrames"][0];
    assert_eq!(frame["line"], json!(5));
    assert_eq!(frame["source"]["path"], json!(document));

    editor_writer
        .write_message(&Message::Request(request(3, "disconnect", json!({}))))
        .await
        .unwrap();
    let done = next_response(&mut editor_reader).await;
    assert!(done.success);

    let files = tokio::time::timeout(Duration::from_secs(5), session)
        .await
        .unwrap()
        .unwrap()
        .unwrap();
    assert_eq!(files, vec![dump_file.clone()]);
    assert!(!Path::new(&dump_file).exists());
    assert!(server.manager().list_sessions().await.is_empty());
}

#[tokio::test]
async fn test_dump_files_survive_when_kept() {
    let workdir = tempfile::tempdir().unwrap();
    let dumps = tempfile::tempdir().unwrap();
    let script = workdir.path().join("area.py");
    std::fs::write(&script, SCRIPT).unwrap();
    let document = script.to_string_lossy().into_owned();

    let kernel = KernelServer::start().await;
    kernel.state.dump_into(dumps.path());

    let server = ProxyServer::new(config(&kernel.addr, &script, true));
    let (proxy_side, editor_side) = editor_pipe();
    let session = tokio::spawn(async move { server.serve_connection(proxy_side).await });
    let (mut editor_reader, mut editor_writer) = editor_side.into_split();

    editor_writer
        .write_message(&Message::Request(request(
            1,
            "setBreakpoints",
            json!({"source": {"path": document}, "breakpoints": [{"line": 4}]}),
        )))
        .await
        .unwrap();
    next_response(&mut editor_reader).await;

    // Closing the editor stream ends the session like a disconnect
    drop(editor_reader);
    drop(editor_writer);
    let files = tokio::time::timeout(Duration::from_secs(5), session)
        .await
        .unwrap()
        .unwrap()
        .unwrap();

    assert_eq!(files, vec![kernel.state.dump_path(AREA_CELL)]);
    assert!(Path::new(&files[0]).exists());
}

#[tokio::test]
async fn test_unreachable_kernel_fails_the_connection() {
    let workdir = tempfile::tempdir().unwrap();
    let script = workdir.path().join("area.py");
    std::fs::write(&script, SCRIPT).unwrap();

    // Bind and drop to get a port nobody listens on
    let addr = {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().to_string()
    };

    let server = ProxyServer::new(config(&addr, &script, false));
    let (proxy_side, _editor_side) = editor_pipe();
    let err = server.serve_connection(proxy_side).await.unwrap_err();

    assert!(err.to_string().contains(&addr));
}
