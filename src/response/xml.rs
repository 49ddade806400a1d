//! XML rendering of the response envelope.
//!
//! ```xml
//! <?xml version="1.0" encoding="UTF-8"?>
//! <response>
//!   <success>false</success>
//!   <status>409</status>
//!   <code>conflict</code>
//!   <errors><error field="email" type="already_exists">email is taken</error></errors>
//! </response>
//! ```
//!
//! JSON results map onto elements: object keys become child elements, array
//! entries become `<item>` elements, `null` becomes an empty element.

use std::io::{self, Write};

use quick_xml::events::{BytesDecl, BytesText, Event};
use quick_xml::Writer;
use serde_json::Value;

use super::{ApiResponse, FormatError, Paging};
use crate::core::{header_values, ResponseWriter};

pub(super) fn format_xml(
    response: &ApiResponse,
    writer: &mut ResponseWriter,
) -> Result<(), FormatError> {
    let mut buf = Vec::with_capacity(256);
    write_envelope(&mut buf, response)?;

    writer.headers_mut().insert(
        http::header::CONTENT_TYPE,
        header_values::APPLICATION_XML.clone(),
    );
    writer.write_header(response.status_code());
    writer.write(&buf)?;
    Ok(())
}

fn write_envelope(buf: &mut Vec<u8>, response: &ApiResponse) -> io::Result<()> {
    let mut writer = Writer::new(buf);

    writer.write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))?;

    writer.create_element("response").write_inner_content(|w| {
        write_text_element(w, "success", if response.success { "true" } else { "false" })?;
        if let Some(status) = response.status {
            write_text_element(w, "status", &status.to_string())?;
        }
        if let Some(code) = &response.code {
            write_text_element(w, "code", code)?;
        }
        if !response.errors.is_empty() {
            w.create_element("errors").write_inner_content(|w| {
                for err in &response.errors {
                    let mut el = w.create_element("error");
                    if let Some(field) = &err.field {
                        el = el.with_attribute(("field", field.as_str()));
                    }
                    el.with_attribute(("type", err.kind.as_str()))
                        .write_text_content(BytesText::new(&err.message))?;
                }
                Ok(())
            })?;
        }
        if let Some(result) = &response.result {
            write_value(w, "result", result)?;
        }
        if let Some(paging) = &response.paging {
            write_paging(w, paging)?;
        }
        Ok(())
    })?;

    Ok(())
}

fn write_paging<W: Write>(writer: &mut Writer<W>, paging: &Paging) -> io::Result<()> {
    writer.create_element("paging").write_inner_content(|w| {
        write_text_element(w, "total_count", &paging.total_count.to_string())?;
        write_text_element(w, "limit", &paging.limit.to_string())?;
        write_text_element(w, "offset", &paging.offset.to_string())?;
        if let Some(order) = &paging.order {
            write_text_element(w, "order", order)?;
        }
        Ok(())
    })?;
    Ok(())
}

fn write_value<W: Write>(writer: &mut Writer<W>, tag: &str, value: &Value) -> io::Result<()> {
    let tag = element_name(tag);
    match value {
        Value::Null => {
            writer.create_element(tag).write_empty()?;
        }
        Value::Bool(b) => write_text_element(writer, tag, if *b { "true" } else { "false" })?,
        Value::Number(n) => write_text_element(writer, tag, &n.to_string())?,
        Value::String(s) => write_text_element(writer, tag, s)?,
        Value::Array(items) => {
            writer.create_element(tag).write_inner_content(|w| {
                for item in items {
                    write_value(w, "item", item)?;
                }
                Ok(())
            })?;
        }
        Value::Object(map) => {
            writer.create_element(tag).write_inner_content(|w| {
                for (key, item) in map {
                    write_value(w, key, item)?;
                }
                Ok(())
            })?;
        }
    }
    Ok(())
}

/// Keys that are not valid XML names fall back to `item`.
fn element_name(key: &str) -> &str {
    let mut chars = key.chars();
    let valid_start = chars
        .next()
        .map(|c| c.is_ascii_alphabetic() || c == '_')
        .unwrap_or(false);
    let valid_rest = chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if valid_start && valid_rest && !key.to_ascii_lowercase().starts_with("xml") {
        key
    } else {
        "item"
    }
}

/// Write a simple `<tag>text</tag>` element.
fn write_text_element<W: Write>(writer: &mut Writer<W>, tag: &str, text: &str) -> io::Result<()> {
    writer
        .create_element(tag)
        .write_text_content(BytesText::new(text))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::{ApiError, XML_FORMATTER};
    use http::StatusCode;
    use serde_json::json;

    fn render(response: &ApiResponse) -> String {
        let mut w = ResponseWriter::new();
        XML_FORMATTER(response, &mut w).unwrap();
        assert_eq!(
            w.headers().get(http::header::CONTENT_TYPE).unwrap(),
            "application/xml; charset=utf-8"
        );
        String::from_utf8(w.body().to_vec()).unwrap()
    }

    #[test]
    fn test_error_envelope() {
        let resp = ApiResponse::failure(
            StatusCode::CONFLICT,
            vec![ApiError::field("email", "already_exists", "taken & gone")],
        );
        let xml = render(&resp);
        assert!(xml.starts_with(r#"<?xml version="1.0" encoding="UTF-8"?>"#));
        assert!(xml.contains("<success>false</success>"));
        assert!(xml.contains("<status>409</status>"));
        assert!(xml.contains("<code>conflict</code>"));
        assert!(xml.contains(
            r#"<errors><error field="email" type="already_exists">taken &amp; gone</error></errors>"#
        ));
    }

    #[test]
    fn test_success_envelope() {
        let resp = ApiResponse::success(json!({"name": "kumi", "tags": ["a", "b"], "none": null}));
        let xml = render(&resp);
        assert!(xml.contains("<success>true</success>"));
        assert!(!xml.contains("<status>"));
        assert!(xml.contains("<name>kumi</name>"));
        assert!(xml.contains("<tags><item>a</item><item>b</item></tags>"));
        assert!(xml.contains("<none/>"));
    }

    #[test]
    fn test_invalid_keys_become_items() {
        assert_eq!(element_name("1abc"), "item");
        assert_eq!(element_name("with space"), "item");
        assert_eq!(element_name("xmlns"), "item");
        assert_eq!(element_name("user_id"), "user_id");
    }
}
