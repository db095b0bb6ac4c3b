use std::borrow::Cow;
use std::collections::HashMap;

use http_types::Method;

use crate::cookie::Cookie;
use crate::headers::Headers;

/// A parsed HTTP request.
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    uri: String,
    query_string: String,
    pub(crate) headers: Headers,
    pub(crate) cookies: Vec<Cookie>,
    pub(crate) content_type: Option<String>,
    pub(crate) content_length: usize,
    pub(crate) body: Option<Vec<u8>>,
}

impl Request {
    /// Create a request from a method and a request target.
    ///
    /// The target is split at the first `?`; the path part is
    /// percent-decoded and the query string kept raw.
    pub fn new(method: Method, target: &str) -> Self {
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path, query),
            None => (target, ""),
        };
        Self {
            method,
            uri: decode_component(path, false),
            query_string: query.to_owned(),
            headers: Headers::new(),
            cookies: Vec::new(),
            content_type: None,
            content_length: 0,
            body: None,
        }
    }

    /// The request method.
    pub fn method(&self) -> Method {
        self.method
    }

    /// The decoded path, without the query string.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// The raw query string, empty if there was none.
    pub fn query_string(&self) -> &str {
        &self.query_string
    }

    /// The request headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Look up a single header.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name)
    }

    /// Cookies sent with the request.
    pub fn cookies(&self) -> &[Cookie] {
        &self.cookies
    }

    /// Find a cookie by name.
    pub fn cookie(&self, name: &str) -> Option<&Cookie> {
        self.cookies.iter().find(|c| c.name == name)
    }

    /// The declared content type, if the request carried a body.
    pub fn content_type(&self) -> Option<&str> {
        self.content_type.as_deref()
    }

    /// The declared body length.
    pub fn content_length(&self) -> usize {
        self.content_length
    }

    /// The request body, if one was sent.
    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    /// The body decoded as UTF-8.
    pub fn body_string(&self) -> Option<String> {
        self.body
            .as_deref()
            .map(|b| String::from_utf8_lossy(b).into_owned())
    }

    /// Split the query string into name/value pairs.
    ///
    /// Fields are separated by `&` or `;`; a field with no `=` has an empty
    /// value and a field with more than one `=` is ignored. Names and
    /// values are percent-decoded with `+` read as a space. Repeated names
    /// collect every value in order.
    pub fn parse_query_string(&self) -> HashMap<String, Vec<String>> {
        let mut fields: HashMap<String, Vec<String>> = HashMap::new();
        for field in self.query_string.split(&['&', ';'][..]) {
            let mut pair = field.split('=');
            let (name, value) = match (pair.next(), pair.next(), pair.next()) {
                (Some(name), None, None) => (name, ""),
                (Some(name), Some(value), None) => (name, value),
                _ => continue,
            };
            if name.is_empty() {
                continue;
            }
            fields
                .entry(decode_component(name, true))
                .or_default()
                .push(decode_component(value, true));
        }
        fields
    }
}

/// Percent-decode a URI component, leaving it untouched if the result is
/// not valid UTF-8.
fn decode_component(raw: &str, plus_as_space: bool) -> String {
    let raw = if plus_as_space {
        raw.replace('+', " ")
    } else {
        raw.to_owned()
    };
    let decoded = urlencoding::decode(&raw).map(Cow::into_owned);
    decoded.unwrap_or(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_target_at_first_question_mark() {
        let req = Request::new(Method::Get, "/some%20dir/file?a=1?b=2");
        assert_eq!(req.uri(), "/some dir/file");
        assert_eq!(req.query_string(), "a=1?b=2");
    }

    #[test]
    fn no_query_string() {
        let req = Request::new(Method::Get, "/index.html");
        assert_eq!(req.uri(), "/index.html");
        assert_eq!(req.query_string(), "");
        assert!(req.parse_query_string().is_empty());
    }

    #[test]
    fn query_string_fields() {
        let req = Request::new(Method::Get, "/q?name=J%C3%BCrgen+M&flag;tag=a&tag=b&x=1=2");
        let fields = req.parse_query_string();
        assert_eq!(fields["name"], vec!["Jürgen M"]);
        assert_eq!(fields["flag"], vec![""]);
        assert_eq!(fields["tag"], vec!["a", "b"]);
        assert!(!fields.contains_key("x"));
    }
}
