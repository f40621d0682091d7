use serde::{Deserialize, Serialize};
use serde_json::Value;

/// DAP Protocol Message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Message {
    #[serde(rename = "request")]
    Request(Request),
    #[serde(rename = "response")]
    Response(Response),
    #[serde(rename = "event")]
    Event(Event),
}

impl Message {
    /// Short label used in logs: the command or event name.
    pub fn label(&self) -> String {
        match self {
            Message::Request(req) => format!("Request({})", req.command),
            Message::Response(resp) => format!("Response({}, seq {})", resp.command, resp.request_seq),
            Message::Event(evt) => format!("Event({})", evt.event),
        }
    }
}

/// DAP Request
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    pub seq: i32,
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Value>,
}

/// DAP Response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    pub seq: i32,
    pub request_seq: i32,
    pub command: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

impl Response {
    /// Successful response to `request` carrying `body`. `seq` is left at 0
    /// for the writer side to assign.
    pub fn success(request: &Request, body: Option<Value>) -> Self {
        Self {
            seq: 0,
            request_seq: request.seq,
            command: request.command.clone(),
            success: true,
            message: None,
            body,
        }
    }

    /// Failed response to `request`, shaped like a DAP `ErrorResponse`.
    pub fn failure(request: &Request, error: &crate::Error) -> Self {
        let text = error.to_string();
        Self {
            seq: 0,
            request_seq: request.seq,
            command: request.command.clone(),
            success: false,
            message: Some(text.clone()),
            body: Some(serde_json::json!({
                "error": {
                    "id": error.error_code(),
                    "format": text,
                    "showUser": false,
                }
            })),
        }
    }
}

/// DAP Event
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub seq: i32,
    pub event: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<Value>,
}

/// Source reference
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Source {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_reference: Option<i32>,
}

impl Source {
    pub fn from_path(path: impl Into<String>) -> Self {
        Self {
            name: None,
            path: Some(path.into()),
            source_reference: None,
        }
    }
}

/// Breakpoint response
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Breakpoint {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    pub verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<Source>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column: Option<i64>,
}

/// `dumpCell` request arguments: the cell code with `\n` line endings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DumpCellArguments {
    pub code: String,
}

/// `dumpCell` response body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DumpCellResponse {
    pub source_path: String,
}

/// `setPydevdSourceMap` request arguments.
///
/// Tells pydevd that lines `line..=endLine` of `source` are executed as
/// `runtimeSource` starting at `runtimeLine`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetPydevdSourceMapArguments {
    pub source: Source,
    pub pydevd_source_maps: Vec<PydevdSourceMap>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PydevdSourceMap {
    pub line: i64,
    pub end_line: i64,
    pub runtime_line: i64,
    pub runtime_source: Source,
}

/// `debugInfo` response body (ipykernel).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DebugInfoResponse {
    #[serde(default)]
    pub is_started: bool,
    #[serde(default)]
    pub hash_method: Option<String>,
    #[serde(default)]
    pub hash_seed: Option<i64>,
    #[serde(default)]
    pub tmp_file_prefix: Option<String>,
    #[serde(default)]
    pub tmp_file_suffix: Option<String>,
}

impl DebugInfoResponse {
    /// Whether `path` looks like a file produced by `dumpCell`.
    pub fn is_dump_file(&self, path: &str) -> bool {
        match (&self.tmp_file_prefix, &self.tmp_file_suffix) {
            (Some(prefix), Some(suffix)) => path.starts_with(prefix) && path.ends_with(suffix),
            (Some(prefix), None) => path.starts_with(prefix),
            _ => false,
        }
    }
}
