//! Request body encoding, chosen by content type.
//!
//! | content type                        | body                                  |
//! |-------------------------------------|---------------------------------------|
//! | `application/x-www-form-urlencoded` | URL-encoded fields, line feeds → CRLF |
//! | `application/json`                  | JSON text (strings passed through)    |
//! | `multipart/form-data`               | passed through                        |
//! | anything else                       | passed through                        |
//!
//! The header keeps the caller's exact string, so parameters such as a
//! multipart boundary survive.

use url::form_urlencoded;

use crate::error::ClientError;
use crate::params::{Content, Params};

pub const FORM_URLENCODED: &str = "application/x-www-form-urlencoded";
pub const JSON: &str = "application/json";
pub const MULTIPART: &str = "multipart/form-data";

/// Encoding strategy selected from a content-type string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ContentType {
    FormUrlEncoded,
    Json,
    Multipart,
    Other(String),
}

impl ContentType {
    /// Match on the media type only, ignoring parameters and case.
    pub fn of(value: &str) -> Self {
        let media = value.split(';').next().unwrap_or("").trim().to_ascii_lowercase();
        match media.as_str() {
            FORM_URLENCODED => ContentType::FormUrlEncoded,
            JSON => ContentType::Json,
            MULTIPART => ContentType::Multipart,
            _ => ContentType::Other(media),
        }
    }
}

/// A body ready to attach, with the content-type header value to send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedBody {
    pub content_type: String,
    pub body: String,
}

/// Encode `content` for sending. Returns `None` when there is nothing to
/// attach, in which case no content-type header should be set either.
pub fn encode(
    content: Option<&Content>,
    content_type: Option<&str>,
) -> Result<Option<EncodedBody>, ClientError> {
    let Some(content) = content.filter(|c| !c.is_empty()) else {
        return Ok(None);
    };
    let content_type = content_type
        .filter(|ct| !ct.is_empty())
        .unwrap_or(FORM_URLENCODED)
        .to_string();

    let body = match ContentType::of(&content_type) {
        ContentType::FormUrlEncoded => normalize_line_feeds(&form_body(content)),
        ContentType::Json => json_body(content)?,
        ContentType::Multipart | ContentType::Other(_) => passthrough(content)?,
    };
    Ok(Some(EncodedBody { content_type, body }))
}

fn form_body(content: &Content) -> String {
    match content {
        Content::Text(text) => text.clone(),
        Content::Form(params) => urlencode(params.iter()),
        Content::Json(serde_json::Value::Object(fields)) => {
            let pairs: Vec<(&str, String)> = fields
                .iter()
                .map(|(k, v)| (k.as_str(), scalar_text(v)))
                .collect();
            urlencode(pairs.iter().map(|(k, v)| (*k, v.as_str())))
        }
        Content::Json(other) => other.to_string(),
    }
}

fn json_body(content: &Content) -> Result<String, ClientError> {
    match content {
        Content::Text(text) => Ok(text.clone()),
        Content::Json(value) => Ok(serde_json::to_string(value)?),
        Content::Form(params) => Ok(serde_json::to_string(&params_object(params))?),
    }
}

fn passthrough(content: &Content) -> Result<String, ClientError> {
    match content {
        Content::Text(text) => Ok(text.clone()),
        Content::Json(value) => Ok(serde_json::to_string(value)?),
        Content::Form(params) => Ok(urlencode(params.iter())),
    }
}

fn urlencode<'a>(fields: impl Iterator<Item = (&'a str, &'a str)>) -> String {
    let mut serializer = form_urlencoded::Serializer::new(String::new());
    for (key, value) in fields {
        serializer.append_pair(key, value);
    }
    serializer.finish()
}

/// Later duplicates overwrite earlier ones.
fn params_object(params: &Params) -> serde_json::Map<String, serde_json::Value> {
    params
        .iter()
        .map(|(k, v)| (k.to_string(), serde_json::Value::String(v.to_string())))
        .collect()
}

fn scalar_text(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        serde_json::Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Turn lone line feeds into CRLF pairs, both raw (`\n`) and
/// percent-encoded (`%0A`). Existing `\r\n` and `%0D%0A` are left alone.
pub fn normalize_line_feeds(body: &str) -> String {
    let bytes = body.as_bytes();
    let mut out = String::with_capacity(body.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'\n' {
            if !out.ends_with('\r') {
                out.push('\r');
            }
            out.push('\n');
            i += 1;
        } else if is_encoded(bytes, i, b'A') {
            if !ends_with_encoded_cr(&out) {
                out.push_str("%0D");
            }
            out.push_str(&body[i..i + 3]);
            i += 3;
        } else {
            let ch = body[i..].chars().next().unwrap_or_default();
            out.push(ch);
            i += ch.len_utf8().max(1);
        }
    }
    out
}

fn is_encoded(bytes: &[u8], i: usize, hex: u8) -> bool {
    bytes.len() >= i + 3
        && bytes[i] == b'%'
        && bytes[i + 1] == b'0'
        && bytes[i + 2].eq_ignore_ascii_case(&hex)
}

fn ends_with_encoded_cr(out: &str) -> bool {
    let bytes = out.as_bytes();
    bytes.len() >= 3 && is_encoded(bytes, bytes.len() - 3, b'D')
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn content_type_strategy_table() {
        assert_eq!(ContentType::of("application/json; charset=utf-8"), ContentType::Json);
        assert_eq!(ContentType::of("Multipart/Form-Data; boundary=x"), ContentType::Multipart);
        assert_eq!(ContentType::of(FORM_URLENCODED), ContentType::FormUrlEncoded);
        assert_eq!(
            ContentType::of("text/plain"),
            ContentType::Other("text/plain".to_string())
        );
    }

    #[test]
    fn absent_or_empty_content_is_noop() {
        assert_eq!(encode(None, Some(JSON)).unwrap(), None);
        assert_eq!(encode(Some(&Content::from("")), None).unwrap(), None);
    }

    #[test]
    fn defaults_to_form_encoding() {
        let content = Content::Form(Params::pairs([("name", "Ada Lovelace"), ("n", "1")]));
        let encoded = encode(Some(&content), None).unwrap().unwrap();
        assert_eq!(encoded.content_type, FORM_URLENCODED);
        assert_eq!(encoded.body, "name=Ada+Lovelace&n=1");
    }

    #[test]
    fn form_line_feeds_become_crlf() {
        let content = Content::Form(Params::pairs([("msg", "a\nb\r\nc")]));
        let encoded = encode(Some(&content), None).unwrap().unwrap();
        assert_eq!(encoded.body, "msg=a%0D%0Ab%0D%0Ac");
    }

    #[test]
    fn raw_form_text_is_normalized() {
        assert_eq!(normalize_line_feeds("x=1%0Ay\nz\r\n"), "x=1%0D%0Ay\r\nz\r\n");
        assert_eq!(normalize_line_feeds("%0d%0a"), "%0d%0a");
        assert_eq!(normalize_line_feeds("héllo"), "héllo");
    }

    #[test]
    fn json_object_form_encodes_fields() {
        let content = Content::Json(json!({"a": "x", "b": 2}));
        let encoded = encode(Some(&content), Some(FORM_URLENCODED)).unwrap().unwrap();
        assert_eq!(encoded.body, "a=x&b=2");
    }

    #[test]
    fn json_serializes_structured_content() {
        let content = Content::Json(json!({"name": "widget", "tags": ["a", "b"]}));
        let encoded = encode(Some(&content), Some(JSON)).unwrap().unwrap();
        let back: serde_json::Value = serde_json::from_str(&encoded.body).unwrap();
        assert_eq!(back, json!({"name": "widget", "tags": ["a", "b"]}));
    }

    #[test]
    fn json_passes_strings_through() {
        let content = Content::from(r#"{"already":"encoded"}"#);
        let encoded = encode(Some(&content), Some(JSON)).unwrap().unwrap();
        assert_eq!(encoded.body, r#"{"already":"encoded"}"#);
    }

    #[test]
    fn multipart_keeps_header_and_body() {
        let ct = "multipart/form-data; boundary=XyZ";
        let body = "--XyZ\r\ncontent\r\n--XyZ--";
        let encoded = encode(Some(&Content::from(body)), Some(ct)).unwrap().unwrap();
        assert_eq!(encoded.content_type, ct);
        assert_eq!(encoded.body, body);
    }

    #[test]
    fn unknown_type_passes_through() {
        let encoded = encode(Some(&Content::from("a\nb")), Some("text/plain"))
            .unwrap()
            .unwrap();
        assert_eq!(encoded.body, "a\nb");
    }
}
