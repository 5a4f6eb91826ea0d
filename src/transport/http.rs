//! HTTP request/response transport.
//!
//! This module provides [`HttpTransport`], which carries queries and
//! mutations to the server as one POST each.
//!
//! # Body formats
//!
//! Operations without attachments are sent as a JSON document:
//!
//! ```text
//! { "operationName": ..., "query": ..., "variables": {...} }
//! ```
//!
//! Operations with attachments are sent as `multipart/form-data`:
//!
//! - `operations`: the JSON document above with `null` at each file's path
//! - `map`: `{ "0": ["variables.<path>"], "1": [...] }`
//! - `0`, `1`, ...: the file contents, in attachment order

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde_json::{json, Map, Value};

use super::{RequestTransport, Response, TransportError};
use crate::constants::{log_preview, LISTENER_LOG_PREVIEW};
use crate::operation::Operation;

/// reqwest-backed [`RequestTransport`].
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    endpoint: String,
}

impl HttpTransport {
    /// Creates a transport posting to `endpoint`.
    ///
    /// No request timeout is configured; calls wait as long as the
    /// underlying connection allows.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be created.
    pub fn new(endpoint: impl Into<String>) -> Result<Self, TransportError> {
        let client = Client::builder()
            .build()
            .map_err(|e| TransportError::Encode(format!("HTTP client: {e}")))?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }

    /// Creates a transport with a pre-configured HTTP client.
    ///
    /// Useful for testing or when custom client configuration is needed.
    pub fn with_client(client: Client, endpoint: impl Into<String>) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }

    /// Returns the endpoint URL.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

/// JSON document describing `op`.
pub fn operation_body(op: &Operation) -> Value {
    let mut body = Map::new();
    body.insert("operationName".to_string(), json!(op.name()));
    if let Some(document) = op.document_text() {
        body.insert("query".to_string(), json!(document));
    }
    body.insert(
        "variables".to_string(),
        Value::Object(op.variables_map().clone()),
    );
    Value::Object(body)
}

/// Multipart form for an operation with attachments.
///
/// # Errors
///
/// Returns [`TransportError::Encode`] if a content type is not a valid MIME
/// type or the operation document cannot be serialized.
pub fn multipart_form(op: &Operation) -> Result<Form, TransportError> {
    let mut operations = operation_body(op);
    let mut map = Map::new();

    for (index, attachment) in op.attachments().iter().enumerate() {
        if let Some(variables) = operations.get_mut("variables") {
            null_at_path(variables, &attachment.variable_path);
        }
        map.insert(
            index.to_string(),
            json!([format!("variables.{}", attachment.variable_path)]),
        );
    }

    let operations = serde_json::to_string(&operations)
        .map_err(|e| TransportError::Encode(format!("operations: {e}")))?;
    let map = serde_json::to_string(&Value::Object(map))
        .map_err(|e| TransportError::Encode(format!("map: {e}")))?;

    let mut form = Form::new().text("operations", operations).text("map", map);
    for (index, attachment) in op.attachments().iter().enumerate() {
        let part = Part::bytes(attachment.bytes.to_vec())
            .file_name(attachment.file_name.clone())
            .mime_str(&attachment.content_type)
            .map_err(|e| {
                TransportError::Encode(format!(
                    "content type {:?} for {}: {e}",
                    attachment.content_type, attachment.file_name
                ))
            })?;
        form = form.part(index.to_string(), part);
    }
    Ok(form)
}

/// Set the value at dot path `path` to `null`, creating objects as needed.
///
/// Numeric segments index into arrays; an out-of-range index leaves the
/// value unchanged.
fn null_at_path(root: &mut Value, path: &str) {
    let segments: Vec<&str> = path.split('.').filter(|s| !s.is_empty()).collect();
    let Some((last, parents)) = segments.split_last() else {
        return;
    };

    let mut current = root;
    for segment in parents {
        let next = match current {
            Value::Array(items) => match segment.parse::<usize>() {
                Ok(i) if i < items.len() => &mut items[i],
                _ => return,
            },
            Value::Object(map) => map
                .entry((*segment).to_string())
                .or_insert_with(|| Value::Object(Map::new())),
            other => {
                *other = Value::Object(Map::new());
                match other {
                    Value::Object(map) => map
                        .entry((*segment).to_string())
                        .or_insert_with(|| Value::Object(Map::new())),
                    _ => return,
                }
            }
        };
        current = next;
    }

    match current {
        Value::Array(items) => {
            if let Some(slot) = last.parse::<usize>().ok().and_then(|i| items.get_mut(i)) {
                *slot = Value::Null;
            }
        }
        Value::Object(map) => {
            map.insert((*last).to_string(), Value::Null);
        }
        other => {
            let mut map = Map::new();
            map.insert((*last).to_string(), Value::Null);
            *other = Value::Object(map);
        }
    }
}

#[async_trait]
impl RequestTransport for HttpTransport {
    async fn call(&self, op: &Operation) -> Result<Response, TransportError> {
        let mut request = self.client.post(&self.endpoint);
        for (name, value) in op.context() {
            request = request.header(name.as_str(), value.as_str());
        }

        request = if op.attachments().is_empty() {
            request.json(&operation_body(op))
        } else {
            request.multipart(multipart_form(op)?)
        };

        log::debug!(
            "[Http] {} {} ({} attachment(s))",
            op.kind(),
            op.name(),
            op.attachments().len()
        );

        let response = request
            .send()
            .await
            .map_err(|e| TransportError::Connection(e.without_url().to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            log::warn!(
                "[Http] {} failed: {} {}",
                op.name(),
                status,
                log_preview(&body, LISTENER_LOG_PREVIEW)
            );
            let errors = serde_json::from_str::<Response>(&body)
                .map(|r| r.errors)
                .unwrap_or_default();
            return Err(TransportError::Status {
                status: status.as_u16(),
                body,
                errors,
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| TransportError::Connection(e.without_url().to_string()))?;
        serde_json::from_slice::<Response>(&body).map_err(|e| {
            log::warn!("[Http] {} returned an undecodable body: {}", op.name(), e);
            TransportError::Decode(e.to_string())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::Attachment;

    #[test]
    fn test_operation_body_without_document() {
        let op = Operation::query("GetEvent").variable("id", json!(7));
        assert_eq!(
            operation_body(&op),
            json!({ "operationName": "GetEvent", "variables": { "id": 7 } })
        );
    }

    #[test]
    fn test_operation_body_with_document() {
        let op = Operation::query("Me").document("query Me { me { id } }");
        assert_eq!(operation_body(&op)["query"], json!("query Me { me { id } }"));
    }

    #[test]
    fn test_null_at_nested_path_creates_objects() {
        let mut vars = json!({ "input": { "name": "x" } });
        null_at_path(&mut vars, "input.avatar");
        assert_eq!(vars, json!({ "input": { "name": "x", "avatar": null } }));

        let mut empty = json!({});
        null_at_path(&mut empty, "a.b");
        assert_eq!(empty, json!({ "a": { "b": null } }));
    }

    #[test]
    fn test_null_at_array_index() {
        let mut vars = json!({ "files": ["a", "b"] });
        null_at_path(&mut vars, "files.1");
        assert_eq!(vars, json!({ "files": ["a", null] }));

        null_at_path(&mut vars, "files.9");
        assert_eq!(vars, json!({ "files": ["a", null] }));
    }

    #[test]
    fn test_multipart_form_rejects_bad_mime() {
        let op = Operation::mutation("Upload")
            .attach(Attachment::new("file", "a.bin", b"x".to_vec()).content_type("not a mime"));
        assert!(matches!(multipart_form(&op), Err(TransportError::Encode(_))));
    }

    #[test]
    fn test_multipart_form_builds_for_valid_attachments() {
        let op = Operation::mutation("Upload")
            .variable("file", Value::Null)
            .attach(Attachment::new("file", "a.png", b"png".to_vec()).content_type("image/png"));
        assert!(multipart_form(&op).is_ok());
    }
}
