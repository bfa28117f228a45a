//! Target URL composition.
//!
//! A URL is `base + "/" + path`, where `:name` placeholders in the path are
//! filled from a mapping parameter set and whatever parameters remain are
//! appended as a query string. Placeholder values are percent-encoded as a
//! single path segment, so `/` or `?` inside a value never changes the route. Query construction goes through
//! `form_urlencoded`, which keeps repeated keys as separate entries.

use url::form_urlencoded;

use crate::error::ClientError;
use crate::params::Params;

/// Base address from either an explicit `url` or `host` + `port`.
///
/// `url` wins when both are present. A host without a scheme gets `http://`.
pub fn base_url(
    host: Option<&str>,
    url: Option<&str>,
    port: Option<u16>,
) -> Result<String, ClientError> {
    if let Some(url) = url.filter(|u| !u.is_empty()) {
        return Ok(url.trim_end_matches('/').to_string());
    }
    let host = host.filter(|h| !h.is_empty()).ok_or_else(|| {
        ClientError::InvalidArgument("host or url is required".to_string())
    })?;
    let host = host.trim_end_matches('/');
    let mut base = if host.contains("://") {
        host.to_string()
    } else {
        format!("http://{host}")
    };
    if let Some(port) = port {
        base.push_str(&format!(":{port}"));
    }
    Ok(base)
}

/// Compose the absolute URL for `path` under `base`.
pub fn build_url(base: &str, path: &str, mut params: Params) -> Result<String, ClientError> {
    if path.is_empty() {
        return Err(ClientError::InvalidArgument("path is required".to_string()));
    }
    let path = fill_placeholders(path.trim_start_matches('/'), &mut params);
    let mut url = format!("{}/{path}", base.trim_end_matches('/'));

    if !params.is_empty() {
        let mut query = form_urlencoded::Serializer::new(String::new());
        for (key, value) in params.iter() {
            query.append_pair(key, value);
        }
        url.push(if url.contains('?') { '&' } else { '?' });
        url.push_str(&query.finish());
    }
    Ok(url)
}

/// Replace each `:token` with the matching mapping entry, consuming it.
/// Tokens with no matching entry are left as written.
fn fill_placeholders(path: &str, params: &mut Params) -> String {
    let mut out = String::with_capacity(path.len());
    let mut rest = path;
    while let Some(pos) = rest.find(':') {
        out.push_str(&rest[..pos]);
        let after = &rest[pos + 1..];
        let len = after
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(after.len());
        let name = &after[..len];
        let value = if name.is_empty() { None } else { params.take(name) };
        match value {
            Some(value) => out.push_str(&urlencoding::encode(&value)),
            None => {
                out.push(':');
                out.push_str(name);
            }
        }
        rest = &after[len..];
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn host_and_port_synthesize_base() {
        let base = base_url(Some("localhost"), None, Some(80)).unwrap();
        assert_eq!(base, "http://localhost:80");
    }

    #[test]
    fn host_scheme_is_kept() {
        let base = base_url(Some("https://api.example.com/"), None, None).unwrap();
        assert_eq!(base, "https://api.example.com");
    }

    #[test]
    fn url_takes_precedence_over_host() {
        let base = base_url(Some("ignored"), Some("https://svc.internal/v2/"), Some(81)).unwrap();
        assert_eq!(base, "https://svc.internal/v2");
    }

    #[test]
    fn missing_host_and_url_is_invalid() {
        let err = base_url(None, Some(""), Some(80)).unwrap_err();
        assert!(matches!(err, ClientError::InvalidArgument(_)));
    }

    #[test]
    fn mapping_params_become_query() {
        let url = build_url(
            "http://localhost:80",
            "/test/path/to/resource",
            Params::map([("foo", "bar"), ("qux", "baz")]),
        )
        .unwrap();
        assert_eq!(url, "http://localhost:80/test/path/to/resource?foo=bar&qux=baz");
    }

    #[test]
    fn repeated_pairs_are_kept_in_order() {
        let url = build_url("http://h", "list", Params::flat(&["a", "1", "a", "2"]).unwrap())
            .unwrap();
        assert_eq!(url, "http://h/list?a=1&a=2");
    }

    #[test]
    fn placeholder_consumes_mapping_entry() {
        let url = build_url(
            "http://h",
            "/users/:id/posts",
            Params::map([("id", "42"), ("page", "2")]),
        )
        .unwrap();
        assert_eq!(url, "http://h/users/42/posts?page=2");
    }

    #[test]
    fn placeholder_values_are_escaped_as_one_segment() {
        let url = build_url(
            "http://h",
            "/people/:name/notes",
            Params::map([("name", "John Smith/#1?")]),
        )
        .unwrap();
        assert_eq!(url, "http://h/people/John%20Smith%2F%231%3F/notes");
    }

    #[test]
    fn unmatched_placeholder_is_left_literal() {
        let url = build_url("http://h", "/users/:id", Params::map([("page", "2")])).unwrap();
        assert_eq!(url, "http://h/users/:id?page=2");
    }

    #[test]
    fn pairs_never_fill_placeholders() {
        let url = build_url("http://h", "/users/:id", Params::pairs([("id", "1")])).unwrap();
        assert_eq!(url, "http://h/users/:id?id=1");
    }

    #[test]
    fn query_values_are_encoded() {
        let url = build_url("http://h", "search", Params::pairs([("q", "a b&c")])).unwrap();
        assert_eq!(url, "http://h/search?q=a+b%26c");
    }

    #[test]
    fn empty_path_is_invalid() {
        let err = build_url("http://h", "", Params::new()).unwrap_err();
        assert!(matches!(err, ClientError::InvalidArgument(_)));
    }

    #[test]
    fn existing_query_is_extended() {
        let url = build_url("http://h", "/find?x=1", Params::pairs([("y", "2")])).unwrap();
        assert_eq!(url, "http://h/find?x=1&y=2");
    }
}
