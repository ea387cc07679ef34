//! Endpoint data model and JSON:API documents.
//!
//! An [`Endpoint`] is a registered mock: the verb and path it answers on and
//! the canned [`Response`] replayed for it. Inputs arrive wrapped in a
//! [`One`] document and are checked with [`EndpointInput::validate`] before
//! they reach the registry.

use crate::error::MockError;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::LazyLock;

/// JSON:API resource type of every endpoint.
pub const RESOURCE_TYPE: &str = "endpoints";

/// HTTP methods an endpoint may be registered for.
pub const ALLOWED_VERBS: [&str; 9] = [
    "GET", "HEAD", "OPTIONS", "TRACE", "PUT", "DELETE", "POST", "PATCH", "CONNECT",
];

/// Absolute URI path: RFC 3986 pchars and slashes, percent escapes well formed.
static PATH_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^/(?:[A-Za-z0-9\-._~!$&'()*+,;=:@/]|%[0-9A-Fa-f]{2})*$")
        .expect("path pattern is valid")
});

/// Document carrying a single resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct One<T> {
    pub data: T,
}

/// Document carrying a list of resources.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Many<T> {
    pub data: Vec<T>,
}

/// A registered mock endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Endpoint {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: i64,
    pub attributes: Attributes,
}

impl Endpoint {
    /// Attach a stored id to an input.
    pub fn new(id: i64, input: EndpointInput) -> Self {
        Self {
            kind: input.kind,
            id,
            attributes: input.attributes,
        }
    }
}

/// An endpoint that has not been stored yet. Any `id` sent by the client is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndpointInput {
    #[serde(rename = "type")]
    pub kind: String,
    pub attributes: Attributes,
}

impl From<Attributes> for EndpointInput {
    fn from(attributes: Attributes) -> Self {
        Self {
            kind: RESOURCE_TYPE.to_string(),
            attributes,
        }
    }
}

/// What an endpoint matches on and what it answers with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attributes {
    pub verb: String,
    pub path: String,
    pub response: Response,
}

/// Canned reply replayed when an endpoint matches.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Response {
    pub code: u16,

    #[serde(default, deserialize_with = "null_as_empty")]
    pub headers: BTreeMap<String, String>,

    #[serde(default)]
    pub body: String,
}

impl Response {
    /// Body as written to the wire.
    ///
    /// One leading and one trailing double quote are removed when both are
    /// present, so `"\"hello\""` is served as `hello`.
    pub fn wire_body(&self) -> &str {
        let body = self.body.as_str();
        if body.len() >= 2 && body.starts_with('"') && body.ends_with('"') {
            &body[1..body.len() - 1]
        } else {
            body
        }
    }
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<BTreeMap<String, String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::deserialize(deserializer)?.unwrap_or_default())
}

/// A single failed validation rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldError {
    /// Dotted location of the field, e.g. `Endpoint.Attributes.Verb`.
    pub namespace: &'static str,
    /// Field name.
    pub field: &'static str,
    /// Rule that failed: `required`, `oneof`, `uri`, `gte` or `lte`.
    pub tag: &'static str,
}

impl FieldError {
    fn new(namespace: &'static str, field: &'static str, tag: &'static str) -> Self {
        Self {
            namespace,
            field,
            tag,
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Key: '{}' Error:Field validation for '{}' failed on the '{}' tag",
            self.namespace, self.field, self.tag
        )
    }
}

impl EndpointInput {
    /// Collect every rule the input breaks.
    pub fn field_errors(&self) -> Vec<FieldError> {
        let mut errors = Vec::new();

        if self.kind.is_empty() {
            errors.push(FieldError::new("Endpoint.Type", "Type", "required"));
        } else if self.kind != RESOURCE_TYPE {
            errors.push(FieldError::new("Endpoint.Type", "Type", "oneof"));
        }

        let attributes = &self.attributes;
        if attributes.verb.is_empty() {
            errors.push(FieldError::new("Endpoint.Attributes.Verb", "Verb", "required"));
        } else if !ALLOWED_VERBS.contains(&attributes.verb.as_str()) {
            errors.push(FieldError::new("Endpoint.Attributes.Verb", "Verb", "oneof"));
        }

        if attributes.path.is_empty() {
            errors.push(FieldError::new("Endpoint.Attributes.Path", "Path", "required"));
        } else if !is_valid_path(&attributes.path) {
            errors.push(FieldError::new("Endpoint.Attributes.Path", "Path", "uri"));
        }

        let code = attributes.response.code;
        if code == 0 {
            errors.push(FieldError::new(
                "Endpoint.Attributes.Response.Code",
                "Code",
                "required",
            ));
        } else if code < 100 {
            errors.push(FieldError::new(
                "Endpoint.Attributes.Response.Code",
                "Code",
                "gte",
            ));
        } else if code > 599 {
            errors.push(FieldError::new(
                "Endpoint.Attributes.Response.Code",
                "Code",
                "lte",
            ));
        }

        errors
    }

    /// Validate the input, reporting every failed rule on its own line.
    pub fn validate(&self) -> Result<(), MockError> {
        let errors = self.field_errors();
        if errors.is_empty() {
            return Ok(());
        }
        let message = errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n");
        Err(MockError::Validation(message))
    }
}

/// Whether `path` is an absolute URI path.
pub fn is_valid_path(path: &str) -> bool {
    PATH_PATTERN.is_match(path)
}

/// Decode a `{"data": ...}` request body and validate the endpoint in it.
pub fn decode_input(body: &[u8]) -> Result<EndpointInput, MockError> {
    let document: One<EndpointInput> = serde_json::from_slice(body)
        .map_err(|e| MockError::Validation(format!("Unable to decode request body: {}", e)))?;
    document.data.validate()?;
    Ok(document.data)
}
