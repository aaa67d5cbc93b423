//! SPDX-License-Identifier: MIT
//!
//! JSON-RPC 2.0 request/response shapes exchanged with a worker child over
//! its stdin/stdout pipes. The child is expected to echo `id` back on its
//! terminal response line; progress lines carry no `id` and are attributed
//! to whichever task is currently in flight.

use serde::Serialize;
use serde_json::Value;

#[derive(Debug, Serialize)]
pub struct RpcRequest<'a> {
    pub jsonrpc: &'static str,
    pub id: &'a str,
    pub method: &'a str,
    pub params: &'a Value,
}

impl<'a> RpcRequest<'a> {
    pub fn new(id: &'a str, method: &'a str, params: &'a Value) -> Self {
        Self { jsonrpc: "2.0", id, method, params }
    }

    pub fn to_line(&self) -> String {
        let mut line = serde_json::to_string(self).expect("RpcRequest always serializes");
        line.push('\n');
        line
    }
}

/// A decoded stdout line that is not a progress frame: the worker's
/// terminal answer for the in-flight task.
///
/// Result-extraction precedence: an `error` field wins over a `result`
/// field, which wins over treating the whole object as the result payload.
pub fn extract_outcome(line: &Value) -> crate::event::TaskOutcome {
    use crate::event::TaskOutcome;

    if let Some(obj) = line.as_object() {
        if let Some(error) = obj.get("error") {
            let message = match error {
                Value::String(s) => s.clone(),
                Value::Object(fields) => match fields.get("message") {
                    Some(Value::String(s)) => s.clone(),
                    _ => error.to_string(),
                },
                other => other.to_string(),
            };
            return TaskOutcome::Failure(message);
        }
        if let Some(result) = obj.get("result") {
            return TaskOutcome::Success(result.clone());
        }
    }
    TaskOutcome::Success(line.clone())
}

/// A decoded stdout line is a progress frame iff it is a JSON object whose
/// only meaningful field is a numeric `progress`.
pub fn as_progress(line: &Value) -> Option<u8> {
    let obj = line.as_object()?;
    let progress = obj.get("progress")?.as_u64()?;
    Some(progress.min(100) as u8)
}
