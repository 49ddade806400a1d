//! Response envelope and formatters.
//!
//! Every JSON API answer is wrapped in an [`ApiResponse`]:
//!
//! ```json
//! {"success":true,"result":{"id":1}}
//! {"success":false,"status":409,"code":"conflict","errors":[{"field":"email","type":"already_exists","message":"..."}]}
//! ```
//!
//! A [`Formatter`] turns the envelope into bytes on a [`ResponseWriter`]. The
//! engine carries the formatter in its configuration; [`JSON_FORMATTER`] is
//! the default and [`XML_FORMATTER`] is the alternative.

mod xml;

use http::StatusCode;
use serde::Serialize;
use serde_json::Value;

use crate::core::{header_values, ResponseWriter};

/// Field-level API error.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ApiError {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
}

impl ApiError {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: None,
            kind: kind.into(),
            message: message.into(),
        }
    }

    /// Error attached to a request field.
    pub fn field(
        field: impl Into<String>,
        kind: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            field: Some(field.into()),
            kind: kind.into(),
            message: message.into(),
        }
    }
}

/// Pagination block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Paging {
    pub total_count: u64,
    pub limit: u64,
    pub offset: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub order: Option<String>,
}

impl Paging {
    pub fn new(total_count: u64, limit: u64, offset: u64) -> Self {
        Self {
            total_count,
            limit,
            offset,
            order: None,
        }
    }

    pub fn with_order(mut self, order: impl Into<String>) -> Self {
        self.order = Some(order.into());
        self
    }
}

/// Success/error envelope.
///
/// `status` and `code` are only present on failures; the HTTP status line
/// already carries them for successes.
#[derive(Clone, Debug, Serialize)]
pub struct ApiResponse {
    #[serde(skip)]
    http_status: StatusCode,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<ApiError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub paging: Option<Paging>,
}

impl ApiResponse {
    /// 200 envelope carrying `result`.
    pub fn success(result: Value) -> Self {
        Self {
            http_status: StatusCode::OK,
            success: true,
            status: None,
            code: None,
            errors: Vec::new(),
            result: Some(result),
            paging: None,
        }
    }

    /// 200 envelope from any serializable payload.
    pub fn success_from<T: Serialize>(result: &T) -> Result<Self, FormatError> {
        Ok(Self::success(serde_json::to_value(result)?))
    }

    /// Error envelope with the derived machine code.
    ///
    /// A failure always carries at least one error; an empty list gets one
    /// typed after the status code.
    pub fn failure(status: StatusCode, mut errors: Vec<ApiError>) -> Self {
        let code = status_code_name(status);
        if errors.is_empty() {
            let message = status.canonical_reason().unwrap_or("request failed");
            errors.push(ApiError::new(code.clone(), message));
        }
        Self {
            http_status: status,
            success: false,
            status: Some(status.as_u16()),
            code: Some(code),
            errors,
            result: None,
            paging: None,
        }
    }

    /// Error envelope with a single error whose type is the status code name.
    pub fn error(status: StatusCode, message: impl Into<String>) -> Self {
        let code = status_code_name(status);
        Self::failure(status, vec![ApiError::new(code, message)])
    }

    /// Override the HTTP status of a success envelope (e.g. 201).
    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.http_status = status;
        if !self.success {
            self.status = Some(status.as_u16());
            self.code = Some(status_code_name(status));
        }
        self
    }

    pub fn with_paging(mut self, paging: Paging) -> Self {
        self.paging = Some(paging);
        self
    }

    /// HTTP status the envelope is sent with.
    #[inline]
    pub fn status_code(&self) -> StatusCode {
        self.http_status
    }
}

/// snake_case of the canonical reason phrase, e.g. `409` -> `conflict`.
pub fn status_code_name(status: StatusCode) -> String {
    if status == StatusCode::UNPROCESSABLE_ENTITY {
        return "unprocessable_entity".to_string();
    }
    let Some(reason) = status.canonical_reason() else {
        return format!("status_{}", status.as_u16());
    };
    let mut name = String::with_capacity(reason.len());
    for ch in reason.chars() {
        if ch.is_ascii_alphanumeric() {
            name.push(ch.to_ascii_lowercase());
        } else if !name.is_empty() && !name.ends_with('_') {
            name.push('_');
        }
    }
    while name.ends_with('_') {
        name.pop();
    }
    name
}

/// Errors raised while serializing an envelope.
#[derive(Debug, thiserror::Error)]
pub enum FormatError {
    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Writes an envelope: sets `Content-Type`, the status, then the body.
pub type Formatter = fn(&ApiResponse, &mut ResponseWriter) -> Result<(), FormatError>;

/// JSON envelope formatter (the default).
pub const JSON_FORMATTER: Formatter = format_json;

/// XML envelope formatter.
pub const XML_FORMATTER: Formatter = xml::format_xml;

fn format_json(response: &ApiResponse, writer: &mut ResponseWriter) -> Result<(), FormatError> {
    let body = serde_json::to_vec(response)?;
    writer.headers_mut().insert(
        http::header::CONTENT_TYPE,
        header_values::APPLICATION_JSON.clone(),
    );
    writer.write_header(response.status_code());
    writer.write(&body)?;
    Ok(())
}
