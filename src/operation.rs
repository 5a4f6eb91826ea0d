//! Outgoing operations.
//!
//! An [`Operation`] is one unit of work sent to the server. Its
//! [`OperationKind`] is fixed when the operation is built and is the only
//! thing the router looks at; payload contents never influence routing.
//!
//! # Usage
//!
//! ```
//! use chatlink::operation::{Operation, OperationKind};
//!
//! let op = Operation::query("GetEvent").variable("id", serde_json::json!(7));
//! assert_eq!(op.kind(), OperationKind::Query);
//! ```

use std::collections::BTreeMap;
use std::str::FromStr;

use bytes::Bytes;
use serde_json::{Map, Value};

/// How an operation is carried to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OperationKind {
    /// Read-only request/response call.
    Query,
    /// Mutating request/response call.
    Mutation,
    /// Long-lived stream carried on the persistent channel.
    Subscription,
}

impl OperationKind {
    /// Wire name of the kind.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Mutation => "mutation",
            Self::Subscription => "subscription",
        }
    }
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error for kind names that are not one of `query`, `mutation`, `subscription`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownKind(pub String);

impl std::fmt::Display for UnknownKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Unknown operation kind: {}", self.0)
    }
}

impl std::error::Error for UnknownKind {}

impl FromStr for OperationKind {
    type Err = UnknownKind;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "query" => Ok(Self::Query),
            "mutation" => Ok(Self::Mutation),
            "subscription" => Ok(Self::Subscription),
            _ => Err(UnknownKind(s.to_string())),
        }
    }
}

/// A binary file carried alongside an operation's variables.
///
/// `variable_path` names where the file sits in the variables, using dot
/// notation relative to the variables object (e.g. `"input.avatar"` or
/// `"files.0"`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    /// Dot path of the variable the file fills.
    pub variable_path: String,
    /// File name reported in the multipart part.
    pub file_name: String,
    /// MIME type of the content.
    pub content_type: String,
    /// Raw file contents.
    pub bytes: Bytes,
}

impl Attachment {
    /// Create an attachment with `application/octet-stream` content type.
    pub fn new(
        variable_path: impl Into<String>,
        file_name: impl Into<String>,
        bytes: impl Into<Bytes>,
    ) -> Self {
        Self {
            variable_path: variable_path.into(),
            file_name: file_name.into(),
            content_type: "application/octet-stream".to_string(),
            bytes: bytes.into(),
        }
    }

    /// Override the MIME type.
    pub fn content_type(mut self, content_type: impl Into<String>) -> Self {
        self.content_type = content_type.into();
        self
    }
}

/// A single outgoing unit of work.
///
/// Fields are private; builder methods consume and return `self` while the
/// operation is being assembled, and [`Operation::with_context`] produces a
/// new operation rather than mutating a shared one.
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    name: String,
    kind: OperationKind,
    document: Option<String>,
    variables: Map<String, Value>,
    context: BTreeMap<String, String>,
    attachments: Vec<Attachment>,
}

impl Operation {
    /// Create an operation of the given kind.
    pub fn new(name: impl Into<String>, kind: OperationKind) -> Self {
        Self {
            name: name.into(),
            kind,
            document: None,
            variables: Map::new(),
            context: BTreeMap::new(),
            attachments: Vec::new(),
        }
    }

    /// Create a query operation.
    pub fn query(name: impl Into<String>) -> Self {
        Self::new(name, OperationKind::Query)
    }

    /// Create a mutation operation.
    pub fn mutation(name: impl Into<String>) -> Self {
        Self::new(name, OperationKind::Mutation)
    }

    /// Create a subscription operation.
    pub fn subscription(name: impl Into<String>) -> Self {
        Self::new(name, OperationKind::Subscription)
    }

    /// Set the operation document (query text).
    pub fn document(mut self, document: impl Into<String>) -> Self {
        self.document = Some(document.into());
        self
    }

    /// Replace all variables.
    pub fn variables(mut self, variables: Map<String, Value>) -> Self {
        self.variables = variables;
        self
    }

    /// Set one variable.
    pub fn variable(mut self, key: impl Into<String>, value: Value) -> Self {
        self.variables.insert(key.into(), value);
        self
    }

    /// Attach a binary file.
    pub fn attach(mut self, attachment: Attachment) -> Self {
        self.attachments.push(attachment);
        self
    }

    /// Return a copy of this operation with one extra context entry.
    #[must_use]
    pub fn with_context(&self, key: impl Into<String>, value: impl Into<String>) -> Self {
        let mut next = self.clone();
        next.context.insert(key.into(), value.into());
        next
    }

    /// Set one context entry, replacing any previous value for `key`.
    pub fn context_entry(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.context.insert(key.into(), value.into());
        self
    }

    /// Remove a context entry (case-insensitive key match).
    pub fn without_context(mut self, key: &str) -> Self {
        self.context.retain(|k, _| !k.eq_ignore_ascii_case(key));
        self
    }

    /// Operation name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Routing kind.
    pub fn kind(&self) -> OperationKind {
        self.kind
    }

    /// Operation document, if any.
    pub fn document_text(&self) -> Option<&str> {
        self.document.as_deref()
    }

    /// Variables object.
    pub fn variables_map(&self) -> &Map<String, Value> {
        &self.variables
    }

    /// Transport context (headers for request/response calls).
    pub fn context(&self) -> &BTreeMap<String, String> {
        &self.context
    }

    /// Binary attachments.
    pub fn attachments(&self) -> &[Attachment] {
        &self.attachments
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_kind_from_str() {
        assert_eq!("query".parse::<OperationKind>(), Ok(OperationKind::Query));
        assert_eq!("Mutation".parse::<OperationKind>(), Ok(OperationKind::Mutation));
        assert_eq!(
            "SUBSCRIPTION".parse::<OperationKind>(),
            Ok(OperationKind::Subscription)
        );
    }

    #[test]
    fn test_unknown_kind_is_rejected() {
        let err = "stream".parse::<OperationKind>().unwrap_err();
        assert_eq!(err, UnknownKind("stream".to_string()));
        assert_eq!(err.to_string(), "Unknown operation kind: stream");
    }

    #[test]
    fn test_with_context_leaves_original_untouched() {
        let op = Operation::query("GetEvent");
        let with = op.with_context("Authorization", "Bearer t");

        assert!(op.context().is_empty());
        assert_eq!(with.context().get("Authorization").map(String::as_str), Some("Bearer t"));
        assert_eq!(with.name(), "GetEvent");
    }

    #[test]
    fn test_builder_collects_variables_and_attachments() {
        let op = Operation::mutation("UploadAvatar")
            .document("mutation UploadAvatar($file: Upload!) { upload(file: $file) }")
            .variable("file", Value::Null)
            .attach(Attachment::new("file", "a.png", b"png".to_vec()).content_type("image/png"));

        assert_eq!(op.kind(), OperationKind::Mutation);
        assert_eq!(op.variables_map().get("file"), Some(&json!(null)));
        assert_eq!(op.attachments().len(), 1);
        assert_eq!(op.attachments()[0].content_type, "image/png");
        assert!(op.document_text().is_some());
    }
}
