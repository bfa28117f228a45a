//! Response body decoding.
//!
//! A response whose content type ends in `/json` is parsed as JSON. A body
//! that fails to parse is returned as text with a warning: empty and
//! plain-text bodies are legitimate even when the server labels them JSON.

use serde::de::DeserializeOwned;

use crate::error::ClientError;
use crate::http::HttpResponse;

/// The decoded form of a response body.
#[derive(Debug, Clone, PartialEq)]
pub enum Processed {
    Json(serde_json::Value),
    Text(String),
}

impl Processed {
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Processed::Json(value) => Some(value),
            Processed::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Processed::Text(text) => Some(text),
            Processed::Json(_) => None,
        }
    }

    /// Text bodies become JSON strings.
    pub fn into_json(self) -> serde_json::Value {
        match self {
            Processed::Json(value) => value,
            Processed::Text(text) => serde_json::Value::String(text),
        }
    }

    /// Deserialize a JSON body into `T`.
    pub fn parse<T: DeserializeOwned>(self) -> Result<T, ClientError> {
        Ok(serde_json::from_value(self.into_json())?)
    }
}

/// Whether a content-type header announces JSON.
pub fn is_json(content_type: &str) -> bool {
    content_type
        .split(';')
        .next()
        .unwrap_or("")
        .trim()
        .to_ascii_lowercase()
        .ends_with("/json")
}

/// Decode `response`, or `None` when there is no response.
pub fn decode(response: Option<&HttpResponse>) -> Option<Processed> {
    let response = response?;
    let json = response.content_type().is_some_and(is_json);
    if !json || response.body.trim().is_empty() {
        return Some(Processed::Text(response.body.clone()));
    }
    match serde_json::from_str(&response.body) {
        Ok(value) => Some(Processed::Json(value)),
        Err(err) => {
            tracing::warn!(
                status = response.status,
                error = %err,
                "response declared JSON but did not parse, returning raw text"
            );
            Some(Processed::Text(response.body.clone()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Arc;

    #[derive(Clone, Default)]
    struct Captured(Arc<parking_lot::Mutex<Vec<u8>>>);

    impl std::io::Write for Captured {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for Captured {
        type Writer = Captured;

        fn make_writer(&'a self) -> Self::Writer {
            self.clone()
        }
    }

    /// Log output at warn level or above while `f` runs.
    fn warnings_during(f: impl FnOnce()) -> String {
        let captured = Captured::default();
        let subscriber = tracing_subscriber::fmt()
            .with_writer(captured.clone())
            .with_max_level(tracing::Level::WARN)
            .with_ansi(false)
            .finish();
        tracing::subscriber::with_default(subscriber, f);
        let bytes = captured.0.lock().clone();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    fn json_response(body: &str) -> HttpResponse {
        HttpResponse::new(200, body).with_header("Content-Type", "application/json; charset=utf-8")
    }

    #[test]
    fn absent_response_decodes_to_none() {
        assert_eq!(decode(None), None);
    }

    #[test]
    fn json_body_is_parsed() {
        let processed = decode(Some(&json_response(r#"{"ok":true,"n":[1,2]}"#))).unwrap();
        assert_eq!(processed, Processed::Json(json!({"ok": true, "n": [1, 2]})));
    }

    #[test]
    fn invalid_json_falls_back_to_text() {
        let processed = decode(Some(&json_response("not json"))).unwrap();
        assert_eq!(processed, Processed::Text("not json".to_string()));
    }

    #[test]
    fn empty_json_body_is_text() {
        let processed = decode(Some(&json_response(""))).unwrap();
        assert_eq!(processed.as_text(), Some(""));
    }

    #[test]
    fn empty_json_body_does_not_warn() {
        let logs = warnings_during(|| {
            decode(Some(&json_response("")));
            decode(Some(&json_response("  \n")));
        });
        assert_eq!(logs, "");
    }

    #[test]
    fn unparseable_json_body_warns() {
        let logs = warnings_during(|| {
            decode(Some(&json_response("not json")));
        });
        assert!(logs.contains("did not parse"));
    }

    #[test]
    fn non_json_content_type_is_text() {
        let response = HttpResponse::new(200, "{\"a\":1}").with_header("content-type", "text/plain");
        assert_eq!(decode(Some(&response)).unwrap().as_text(), Some("{\"a\":1}"));
    }

    #[test]
    fn missing_content_type_is_text() {
        let response = HttpResponse::new(200, "[1]");
        assert!(decode(Some(&response)).unwrap().as_json().is_none());
    }

    #[test]
    fn json_suffix_variants() {
        assert!(is_json("application/json"));
        assert!(is_json("text/json"));
        assert!(!is_json("application/problem+json"));
        assert!(!is_json("application/jsonp"));
    }

    #[test]
    fn repeated_decode_is_stable() {
        let response = json_response(r#"{"items":[{"id":1},{"id":2}],"next":null}"#);
        let first = decode(Some(&response));
        let second = decode(Some(&response));
        assert_eq!(first, second);
    }

    #[test]
    fn processed_parses_into_type() {
        #[derive(serde::Deserialize)]
        struct Item {
            id: u32,
        }
        let item: Item = decode(Some(&json_response(r#"{"id":9}"#)))
            .unwrap()
            .parse()
            .unwrap();
        assert_eq!(item.id, 9);
    }
}
