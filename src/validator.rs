//! JSON-schema request body validation.
//!
//! [`Validator`] decodes a request body under a byte limit, validates it
//! against a compiled schema and turns failures into API errors:
//!
//! | Failure | Status | Error type |
//! |---------|--------|------------|
//! | empty body, `null`, or `{}` when the schema requires properties | 400 | `request_body_required` |
//! | more than `limit` bytes | 413 | `request_body_exceeded` |
//! | malformed JSON | 400 | `invalid_json` |
//! | schema violation | 422 | per violation, see [`Violation::kind`] |
//!
//! Schema violations go through [`ErrorRule`]s keyed by field and error type,
//! each with a `*` wildcard. Lookup order is `field/type`, `field/*`,
//! `*/type`, `*/*`; without a matching rule the violation maps to an error
//! carrying the field, type and schema message. A rule may return no errors
//! to drop a violation; a body whose violations are all dropped passes.
//! Results are de-duplicated by `(field, type)`.
//!
//! The validator is also a [`Handler`]: on success the decoded body is stored
//! under [`BODY_KEY`] and the chain continues.

use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::sync::Arc;

use async_trait::async_trait;
use http::StatusCode;
use jsonschema::error::ValidationErrorKind;
use jsonschema::{JSONSchema, ValidationError};
use serde_json::Value;
use tracing::debug;

use crate::core::Context;
use crate::handler::Handler;
use crate::response::{ApiError, ApiResponse};

/// Context key of the decoded body after successful validation.
pub const BODY_KEY: &str = "kumi.validated_body";

/// Default body limit (1 MiB).
pub const DEFAULT_LIMIT: usize = 1024 * 1024;

/// Wildcard for rule keys.
pub const ANY: &str = "*";

/// Field name of violations on the document root.
pub const ROOT_FIELD: &str = "(root)";

pub const BODY_REQUIRED: &str = "request_body_required";
pub const BODY_EXCEEDED: &str = "request_body_exceeded";
pub const INVALID_JSON: &str = "invalid_json";

/// The schema could not be compiled.
#[derive(Debug, Clone, thiserror::Error)]
#[error("invalid JSON schema: {0}")]
pub struct SchemaCompileError(String);

/// One schema violation, before rule mapping.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Violation {
    /// Dotted path of the offending value, `(root)` for the document.
    pub field: String,
    /// Error type, e.g. `required`, `invalid_type`, `string_gte`.
    pub kind: &'static str,
    /// Message produced by the schema engine.
    pub message: String,
}

impl Violation {
    /// API error carrying this violation as is.
    pub fn to_api_error(&self) -> ApiError {
        ApiError::field(self.field.clone(), self.kind, self.message.clone())
    }
}

/// Maps a violation to zero or more API errors.
pub type ErrorRule = Arc<dyn Fn(&Violation) -> Vec<ApiError> + Send + Sync>;

/// Rule replacing type and message, keeping the field.
pub fn rule(kind: impl Into<String>, message: impl Into<String>) -> ErrorRule {
    let kind = kind.into();
    let message = message.into();
    Arc::new(move |v: &Violation| {
        vec![ApiError::field(v.field.clone(), kind.clone(), message.clone())]
    })
}

/// Rule dropping the violation.
pub fn ignore() -> ErrorRule {
    Arc::new(|_: &Violation| Vec::new())
}

/// Outcome of the after-failure hook.
pub enum AfterFailure {
    /// Use these errors instead of the mapped ones. No errors accepts the
    /// body.
    Errors(Vec<ApiError>),
    /// Send this envelope as is.
    Respond(ApiResponse),
}

/// Runs after schema validation fails, with the decoded body and the mapped
/// errors. Useful for `oneOf`/`anyOf` schemas that need specific messages.
pub type AfterFailureHook = Arc<dyn Fn(&Value, Vec<ApiError>) -> AfterFailure + Send + Sync>;

/// Compiled schema plus body limit and error rules.
pub struct Validator {
    schema: JSONSchema,
    /// Top-level `required` is non-empty.
    requires_properties: bool,
    limit: usize,
    rules: HashMap<String, HashMap<String, ErrorRule>>,
    after_failure: Option<AfterFailureHook>,
}

impl Validator {
    pub fn new(schema: &Value) -> Result<Self, SchemaCompileError> {
        let compiled =
            JSONSchema::compile(schema).map_err(|e| SchemaCompileError(e.to_string()))?;
        let requires_properties = schema
            .get("required")
            .and_then(Value::as_array)
            .is_some_and(|r| !r.is_empty());

        Ok(Self {
            schema: compiled,
            requires_properties,
            limit: DEFAULT_LIMIT,
            rules: HashMap::new(),
            after_failure: None,
        })
    }

    /// Largest accepted body in bytes.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Map violations of `kind` on `field`; either may be [`ANY`].
    pub fn with_rule(mut self, field: &str, kind: &str, rule: ErrorRule) -> Self {
        self.rules
            .entry(field.to_string())
            .or_default()
            .insert(kind.to_string(), rule);
        self
    }

    pub fn with_after_failure<F>(mut self, hook: F) -> Self
    where
        F: Fn(&Value, Vec<ApiError>) -> AfterFailure + Send + Sync + 'static,
    {
        self.after_failure = Some(Arc::new(hook));
        self
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// Decode and validate a body read from `reader`.
    ///
    /// At most `limit + 1` bytes are read; reading more than `limit` means the
    /// body is too large.
    pub fn validate_reader<R: Read>(&self, reader: R) -> Result<Value, ApiResponse> {
        let mut buf = Vec::new();
        let mut limited = reader.take(self.limit as u64 + 1);
        if let Err(e) = limited.read_to_end(&mut buf) {
            debug!(error = %e, "failed to read request body");
            return Err(invalid_json(format!("could not read request body: {}", e)));
        }
        if buf.len() > self.limit {
            return Err(ApiResponse::failure(
                StatusCode::PAYLOAD_TOO_LARGE,
                vec![ApiError::new(
                    BODY_EXCEEDED,
                    format!("request body exceeds {} bytes", self.limit),
                )],
            ));
        }
        self.validate_bytes_within_limit(&buf)
    }

    /// Decode and validate an in-memory body.
    pub fn validate_bytes(&self, body: &[u8]) -> Result<Value, ApiResponse> {
        self.validate_reader(body)
    }

    fn validate_bytes_within_limit(&self, body: &[u8]) -> Result<Value, ApiResponse> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Err(body_required());
        }
        let value: Value = match serde_json::from_slice(body) {
            Ok(value) => value,
            Err(e) => return Err(invalid_json(e.to_string())),
        };
        if self.is_missing(&value) {
            return Err(body_required());
        }

        let violations: Vec<Violation> = match self.schema.validate(&value) {
            Ok(()) => Vec::new(),
            Err(errors) => errors.map(|e| violation(&e)).collect(),
        };
        if violations.is_empty() {
            return Ok(value);
        }

        // Rules that drop every violation accept the body.
        let errors = self.map_violations(violations);
        if errors.is_empty() {
            return Ok(value);
        }
        let errors = match &self.after_failure {
            Some(hook) => match hook(&value, errors) {
                AfterFailure::Errors(errors) => errors,
                AfterFailure::Respond(response) => return Err(response),
            },
            None => errors,
        };
        if errors.is_empty() {
            return Ok(value);
        }
        Err(ApiResponse::failure(StatusCode::UNPROCESSABLE_ENTITY, errors))
    }

    fn is_missing(&self, value: &Value) -> bool {
        match value {
            Value::Null => true,
            Value::Object(map) => map.is_empty() && self.requires_properties,
            _ => false,
        }
    }

    fn rule_for(&self, violation: &Violation) -> Option<&ErrorRule> {
        let by_field = |field: &str| {
            self.rules
                .get(field)
                .and_then(|kinds| kinds.get(violation.kind).or_else(|| kinds.get(ANY)))
        };
        by_field(&violation.field).or_else(|| by_field(ANY))
    }

    /// Apply rules and drop duplicate `(field, type)` pairs.
    pub fn map_violations<I>(&self, violations: I) -> Vec<ApiError>
    where
        I: IntoIterator<Item = Violation>,
    {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for violation in violations {
            let mapped = match self.rule_for(&violation) {
                Some(rule) => rule(&violation),
                None => vec![violation.to_api_error()],
            };
            for error in mapped {
                if seen.insert((error.field.clone(), error.kind.clone())) {
                    out.push(error);
                }
            }
        }
        out
    }
}

impl std::fmt::Debug for Validator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Validator")
            .field("limit", &self.limit)
            .field("requires_properties", &self.requires_properties)
            .field("rules", &self.rules.len())
            .finish()
    }
}

fn body_required() -> ApiResponse {
    ApiResponse::failure(
        StatusCode::BAD_REQUEST,
        vec![ApiError::new(BODY_REQUIRED, "request body is required")],
    )
}

fn invalid_json(message: String) -> ApiResponse {
    ApiResponse::failure(
        StatusCode::BAD_REQUEST,
        vec![ApiError::new(INVALID_JSON, message)],
    )
}

fn violation(error: &ValidationError<'_>) -> Violation {
    let base = dotted(&error.instance_path.to_string());
    let child = |name: &str| {
        if base.is_empty() {
            name.to_string()
        } else {
            format!("{}.{}", base, name)
        }
    };

    let (field, kind) = match &error.kind {
        ValidationErrorKind::Required { property } => {
            let name = property
                .as_str()
                .map(str::to_owned)
                .unwrap_or_else(|| property.to_string());
            (child(&name), "required")
        }
        ValidationErrorKind::AdditionalProperties { unexpected } => {
            let field = match unexpected.first() {
                Some(name) => child(name),
                None => base.clone(),
            };
            (field, "additional_property_not_allowed")
        }
        other => (base.clone(), violation_kind(other)),
    };

    Violation {
        field: if field.is_empty() { ROOT_FIELD.to_string() } else { field },
        kind,
        message: error.to_string(),
    }
}

fn violation_kind(kind: &ValidationErrorKind) -> &'static str {
    use ValidationErrorKind as K;
    match kind {
        K::Type { .. } => "invalid_type",
        K::Enum { .. } => "enum",
        K::Constant { .. } => "const",
        K::AnyOf { .. } => "number_any_of",
        K::OneOfNotValid { .. } | K::OneOfMultipleValid { .. } => "number_one_of",
        K::Not { .. } => "number_not",
        K::MinLength { .. } => "string_gte",
        K::MaxLength { .. } => "string_lte",
        K::Pattern { .. } => "does_not_match_pattern",
        K::Format { .. } => "format",
        K::Minimum { .. } => "number_gte",
        K::ExclusiveMinimum { .. } => "number_gt",
        K::Maximum { .. } => "number_lte",
        K::ExclusiveMaximum { .. } => "number_lt",
        K::MultipleOf { .. } => "multiple_of",
        K::MinItems { .. } => "array_min_items",
        K::MaxItems { .. } => "array_max_items",
        K::UniqueItems { .. } => "unique",
        K::Contains { .. } => "contains",
        K::MinProperties { .. } => "array_min_properties",
        K::MaxProperties { .. } => "array_max_properties",
        K::FalseSchema { .. } => "false",
        _ => "invalid",
    }
}

/// `/address/street` -> `address.street`.
fn dotted(pointer: &str) -> String {
    pointer
        .split('/')
        .filter(|s| !s.is_empty())
        .map(|s| s.replace("~1", "/").replace("~0", "~"))
        .collect::<Vec<_>>()
        .join(".")
}

#[async_trait]
impl Handler for Validator {
    async fn call(&self, ctx: &mut Context) {
        match self.validate_bytes(ctx.request().body()) {
            Ok(value) => {
                ctx.set(BODY_KEY, value);
                ctx.next().await;
            }
            Err(response) => {
                debug!(
                    request_id = %ctx.request_id(),
                    status = response.status_code().as_u16(),
                    "request body rejected"
                );
                ctx.respond(&response);
            }
        }
    }

    fn name(&self) -> &'static str {
        "validator"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn user_schema() -> Value {
        json!({
            "type": "object",
            "required": ["name"],
            "properties": {
                "name": {"type": "string", "minLength": 2},
                "age": {"type": "integer", "minimum": 0},
                "address": {
                    "type": "object",
                    "properties": {"street": {"type": "string"}}
                }
            }
        })
    }

    fn first_error(result: Result<Value, ApiResponse>) -> (StatusCode, ApiError) {
        let response = result.unwrap_err();
        (response.status_code(), response.errors[0].clone())
    }

    #[test]
    fn test_empty_object_is_body_required() {
        let v = Validator::new(&user_schema()).unwrap();
        let (status, error) = first_error(v.validate_bytes(b"{}"));
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error.kind, BODY_REQUIRED);

        for body in [&b""[..], b"   \n", b"null"] {
            let (_, error) = first_error(v.validate_bytes(body));
            assert_eq!(error.kind, BODY_REQUIRED);
        }
    }

    #[test]
    fn test_body_over_limit() {
        let v = Validator::new(&user_schema()).unwrap().with_limit(16);
        let (status, error) = first_error(v.validate_bytes(br#"{"name":"a long enough name"}"#));
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(error.kind, BODY_EXCEEDED);

        assert!(v.validate_bytes(br#"{"name":"ab"}"#).is_ok());
    }

    #[test]
    fn test_malformed_json() {
        let v = Validator::new(&user_schema()).unwrap();
        let (status, error) = first_error(v.validate_bytes(b"{\"name\":"));
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(error.kind, INVALID_JSON);
    }

    #[test]
    fn test_missing_required_field() {
        let v = Validator::new(&user_schema()).unwrap();
        let response = v.validate_bytes(br#"{"age": 3}"#).unwrap_err();
        assert_eq!(response.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(response.code.as_deref(), Some("unprocessable_entity"));
        assert_eq!(response.errors.len(), 1);
        assert_eq!(response.errors[0].field.as_deref(), Some("name"));
        assert_eq!(response.errors[0].kind, "required");
    }

    #[test]
    fn test_nested_field_and_type_names() {
        let v = Validator::new(&user_schema()).unwrap();
        let response = v
            .validate_bytes(br#"{"name": "x", "age": -1, "address": {"street": 5}}"#)
            .unwrap_err();
        let pairs: Vec<(String, String)> = response
            .errors
            .iter()
            .map(|e| (e.field.clone().unwrap_or_default(), e.kind.clone()))
            .collect();
        assert!(pairs.contains(&("name".into(), "string_gte".into())));
        assert!(pairs.contains(&("age".into(), "number_gte".into())));
        assert!(pairs.contains(&("address.street".into(), "invalid_type".into())));
    }

    #[test]
    fn test_rules_and_wildcards() {
        let v = Validator::new(&user_schema())
            .unwrap()
            .with_rule("name", "required", rule("name_missing", "tell us your name"))
            .with_rule(ANY, "invalid_type", rule("wrong_type", "wrong type"))
            .with_rule("age", ANY, ignore());

        let response = v.validate_bytes(br#"{"age": -1}"#).unwrap_err();
        assert_eq!(response.errors.len(), 1);
        assert_eq!(response.errors[0].kind, "name_missing");
        assert_eq!(response.errors[0].message, "tell us your name");

        let response = v.validate_bytes(br#"{"name": 7}"#).unwrap_err();
        assert_eq!(response.errors[0].kind, "wrong_type");
        assert_eq!(response.errors[0].field.as_deref(), Some("name"));
    }

    #[test]
    fn test_duplicates_removed() {
        let v = Validator::new(&user_schema()).unwrap();
        let errors = v.map_violations(vec![
            Violation {
                field: "name".into(),
                kind: "required",
                message: "a".into(),
            },
            Violation {
                field: "name".into(),
                kind: "required",
                message: "b".into(),
            },
        ]);
        assert_eq!(errors.len(), 1);
    }

    #[test]
    fn test_after_failure_hook() {
        let v = Validator::new(&user_schema())
            .unwrap()
            .with_after_failure(|body, _errors| {
                if body.get("kind").is_some() {
                    AfterFailure::Respond(ApiResponse::error(StatusCode::CONFLICT, "custom"))
                } else {
                    AfterFailure::Errors(vec![ApiError::new("replaced", "replaced")])
                }
            });

        let response = v.validate_bytes(br#"{"age": 1}"#).unwrap_err();
        assert_eq!(response.errors[0].kind, "replaced");

        let response = v.validate_bytes(br#"{"kind": 1}"#).unwrap_err();
        assert_eq!(response.status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_dropped_violations_accept_body() {
        let schema = json!({"type": "object", "properties": {"age": {"type": "integer"}}});
        let v = Validator::new(&schema).unwrap().with_rule("age", ANY, ignore());
        let value = v.validate_bytes(br#"{"age": "x"}"#).unwrap();
        assert_eq!(value["age"], "x");

        let v = Validator::new(&user_schema())
            .unwrap()
            .with_after_failure(|_body, _errors| AfterFailure::Errors(Vec::new()));
        assert!(v.validate_bytes(br#"{"age": 1}"#).is_ok());
    }

    #[test]
    fn test_invalid_schema() {
        assert!(Validator::new(&json!({"type": "no-such-type"})).is_err());
    }

    #[tokio::test]
    async fn test_handler_stores_body() {
        use crate::core::Request;
        use crate::handler::{handler_fn, Chain};
        use http::{HeaderMap, Method};

        let req = Request::new(
            Method::POST,
            "/users".parse().unwrap(),
            HeaderMap::new(),
            bytes::Bytes::from_static(br#"{"name":"kumi"}"#),
        );
        let mut ctx = Context::new(req);
        ctx.set_chain(
            &Chain::new()
                .with(Validator::new(&user_schema()).unwrap())
                .with(handler_fn(|ctx| {
                    Box::pin(async move {
                        let name = ctx
                            .get::<Value>(BODY_KEY)
                            .and_then(|b| b["name"].as_str())
                            .unwrap_or_default()
                            .to_string();
                        let _ = ctx.write_str(&name);
                    })
                })),
        );
        ctx.next().await;
        assert_eq!(ctx.writer().body(), b"kumi");
    }
}
