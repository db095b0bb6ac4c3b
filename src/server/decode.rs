//! Decode HTTP requests on the server.

use std::io;
use std::str::{self, FromStr};

use futures_lite::io::AsyncRead;
use http_types::Method;

use super::line_reader::LineReader;
use super::ServerOptions;
use crate::cookie::parse_cookie_header;
use crate::error::HttpError;
use crate::headers::{CONTENT_LENGTH, CONTENT_TYPE, COOKIE};
use crate::request::Request;

/// The outcome of reading a request off the wire.
#[derive(Debug)]
pub(crate) enum Decoded {
    /// A complete request.
    Request(Request),
    /// Enough arrived to build a request, but the rest of it was refused.
    Rejected(Request, HttpError),
    /// Nothing worth answering: drop the connection without a response.
    Closed,
}

/// Read a request: start line, headers and an optional body.
pub(crate) async fn decode<R>(reader: &mut LineReader<R>, opts: &ServerOptions) -> Decoded
where
    R: AsyncRead + Unpin,
{
    let mut req = match reader.read_line().await {
        Ok(Some(line)) => match parse_start_line(&line) {
            Some(req) => req,
            None => {
                log::trace!("dropping connection with unparsable start line");
                return Decoded::Closed;
            }
        },
        Ok(None) | Err(_) => return Decoded::Closed,
    };

    let mut last_header: Option<String> = None;
    loop {
        let line = match reader.read_line().await {
            Ok(Some(line)) => line,
            Ok(None) => return Decoded::Closed,
            Err(err) if err.kind() == io::ErrorKind::InvalidData => {
                return Decoded::Rejected(req, bad_request("Header line too long."));
            }
            Err(_) => return Decoded::Closed,
        };
        if line.is_empty() {
            break;
        }
        if let Err(err) = parse_header_line(&mut req, &mut last_header, &line) {
            return Decoded::Rejected(req, err);
        }
    }

    if let Some(cookies) = req.headers.get(COOKIE) {
        req.cookies = parse_cookie_header(cookies);
    }

    let content_type = match req.headers.get(CONTENT_TYPE) {
        Some(content_type) => content_type.to_owned(),
        None => return Decoded::Request(req),
    };
    req.content_type = Some(content_type);

    let length = match req
        .headers
        .get(CONTENT_LENGTH)
        .and_then(|len| len.trim().parse::<usize>().ok())
    {
        Some(length) => length,
        None => return Decoded::Rejected(req, HttpError::length_required()),
    };
    req.content_length = length;

    if length > opts.max_request_body {
        return Decoded::Rejected(req, HttpError::request_entity_too_large());
    }

    match reader.read_body(length).await {
        Ok(Some(body)) => {
            req.body = Some(body);
            Decoded::Request(req)
        }
        Ok(None) | Err(_) => {
            log::trace!("connection dropped while reading a {} byte body", length);
            Decoded::Closed
        }
    }
}

/// Parse `METHOD SP+ request-target SP+ HTTP/d.d`.
///
/// The method and the `HTTP` token are case-insensitive and any single-digit
/// version is accepted.
fn parse_start_line(line: &[u8]) -> Option<Request> {
    let line = str::from_utf8(line).ok()?;
    let mut parts = line.split(' ').filter(|part| !part.is_empty());
    let (method, target, version) = (parts.next()?, parts.next()?, parts.next()?);
    if parts.next().is_some() || !is_http_version(version) {
        return None;
    }
    if !method.bytes().all(|b| b.is_ascii_alphabetic()) {
        return None;
    }

    let method = Method::from_str(&method.to_ascii_uppercase()).ok()?;
    Some(Request::new(method, target))
}

fn is_http_version(token: &str) -> bool {
    match token.as_bytes() {
        [h, t1, t2, p, b'/', major, b'.', minor] => {
            h.eq_ignore_ascii_case(&b'h')
                && t1.eq_ignore_ascii_case(&b't')
                && t2.eq_ignore_ascii_case(&b't')
                && p.eq_ignore_ascii_case(&b'p')
                && major.is_ascii_digit()
                && minor.is_ascii_digit()
        }
        _ => false,
    }
}

/// Parse one header line into the request.
///
/// A line starting with whitespace continues the previous header; its
/// trimmed text is appended to that header's value after a single space.
fn parse_header_line(
    req: &mut Request,
    last_header: &mut Option<String>,
    line: &[u8],
) -> Result<(), HttpError> {
    if line[0] == b' ' || line[0] == b'\t' {
        let name = last_header
            .as_deref()
            .ok_or_else(|| bad_request("Invalid header format."))?;
        let continuation = str::from_utf8(line)
            .map_err(|_| bad_request("Cannot parse header."))?
            .trim();
        if let Some(value) = req.headers.get_mut(name) {
            if !continuation.is_empty() {
                if !value.is_empty() {
                    value.push(' ');
                }
                value.push_str(continuation);
            }
        }
        return Ok(());
    }

    let mut raw = Vec::with_capacity(line.len() + 4);
    raw.extend_from_slice(line);
    raw.extend_from_slice(b"\r\n\r\n");

    let mut slot = [httparse::EMPTY_HEADER; 1];
    let header = match httparse::parse_headers(&raw, &mut slot) {
        Ok(httparse::Status::Complete((_, [header]))) => *header,
        _ => return Err(bad_request("Cannot parse header.")),
    };
    let value = str::from_utf8(header.value)
        .map_err(|_| bad_request("Cannot parse header."))?
        .trim();

    req.headers.insert(header.name, value);
    *last_header = Some(header.name.to_owned());
    Ok(())
}

fn bad_request(message: &'static str) -> HttpError {
    HttpError::bad_request().set_message(message)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::ResponseCode;
    use futures_lite::future::block_on;
    use futures_lite::io::Cursor;

    fn decode_str(s: &str) -> Decoded {
        let opts = ServerOptions::default().max_request_body(16);
        let mut reader = LineReader::new(Cursor::new(s.replace('\n', "\r\n").into_bytes()), 256);
        block_on(decode(&mut reader, &opts))
    }

    fn request(decoded: Decoded) -> Request {
        match decoded {
            Decoded::Request(req) => req,
            other => panic!("expected a request, got {:?}", other),
        }
    }

    fn rejection(decoded: Decoded) -> ResponseCode {
        match decoded {
            Decoded::Rejected(_, err) => err.code(),
            other => panic!("expected a rejection, got {:?}", other),
        }
    }

    #[test]
    fn get_without_body() {
        let req = request(decode_str("GET /a%20b?x=1 HTTP/1.0\nHost: localhost\n\n"));
        assert_eq!(req.method(), Method::Get);
        assert_eq!(req.uri(), "/a b");
        assert_eq!(req.query_string(), "x=1");
        assert_eq!(req.header("host"), Some("localhost"));
        assert_eq!(req.body(), None);
    }

    #[test]
    fn method_is_case_insensitive() {
        let req = request(decode_str("post / HTTP/1.1\n\n"));
        assert_eq!(req.method(), Method::Post);
    }

    #[test]
    fn post_with_body() {
        let req = request(decode_str(
            "POST /submit HTTP/1.0\nContent-Type: text/plain\nContent-Length: 5\n\nhello",
        ));
        assert_eq!(req.content_type(), Some("text/plain"));
        assert_eq!(req.content_length(), 5);
        assert_eq!(req.body_string().as_deref(), Some("hello"));
    }

    #[test]
    fn continuation_lines_join_with_a_space() {
        let req = request(decode_str("GET / HTTP/1.0\nFoo: a\n b\n\tc\n\n"));
        assert_eq!(req.header("foo"), Some("a b c"));
    }

    #[test]
    fn duplicate_headers_keep_the_last_value() {
        let req = request(decode_str("GET / HTTP/1.0\nX-Tag: one\nx-tag: two\n\n"));
        assert_eq!(req.header("X-Tag"), Some("two"));
        assert_eq!(req.headers().len(), 1);
    }

    #[test]
    fn cookies_are_parsed() {
        let req = request(decode_str("GET / HTTP/1.0\nCookie: a=1; b=2\n\n"));
        let cookies: Vec<_> = req
            .cookies()
            .iter()
            .map(|c| (c.name.as_str(), c.value.as_str()))
            .collect();
        assert_eq!(cookies, vec![("a", "1"), ("b", "2")]);
    }

    #[test]
    fn unparsable_start_lines_close_silently() {
        for line in &[
            "GARBAGE\n\n",
            "GET /\n\n",
            "FETCH / HTTP/1.0\n\n",
            "GET / HTTP/10.0\n\n",
            "GET / FTP/1.0\n\n",
            "GET / HTTP/1.0 extra\n\n",
            "G3T / HTTP/1.0\n\n",
        ] {
            assert!(matches!(decode_str(line), Decoded::Closed), "{}", line);
        }
    }

    #[test]
    fn lenient_start_lines() {
        for line in &[
            "GET /a?b=c HTTP/1.0\n\n",
            "GET /a?b=c HTTP/1.2\n\n",
            "GET /a?b=c HTTP/2.0\n\n",
            "get /a?b=c http/1.0\n\n",
            "GET   /a?b=c   HTTP/1.1\n\n",
        ] {
            let req = request(decode_str(line));
            assert_eq!(req.method(), Method::Get, "{}", line);
            assert_eq!(req.uri(), "/a", "{}", line);
            assert_eq!(req.query_string(), "b=c", "{}", line);
        }
    }

    #[test]
    fn empty_connection_closes() {
        assert!(matches!(decode_str(""), Decoded::Closed));
    }

    #[test]
    fn malformed_header_is_bad_request() {
        let decoded = decode_str("GET / HTTP/1.0\nNot a header\n\n");
        assert_eq!(rejection(decoded), ResponseCode::BadRequest);
    }

    #[test]
    fn leading_continuation_is_bad_request() {
        let decoded = decode_str("GET / HTTP/1.0\n orphan\n\n");
        assert_eq!(rejection(decoded), ResponseCode::BadRequest);
    }

    #[test]
    fn content_type_without_length() {
        let decoded = decode_str("POST / HTTP/1.0\nContent-Type: text/plain\n\nhello");
        assert_eq!(rejection(decoded), ResponseCode::LengthRequired);
    }

    #[test]
    fn non_numeric_length() {
        let decoded = decode_str("POST / HTTP/1.0\nContent-Type: text/plain\nContent-Length: -3\n\n");
        assert_eq!(rejection(decoded), ResponseCode::LengthRequired);
    }

    #[test]
    fn body_over_the_cap() {
        let decoded = decode_str("POST / HTTP/1.0\nContent-Type: text/plain\nContent-Length: 17\n\n");
        assert_eq!(rejection(decoded), ResponseCode::RequestEntityTooLarge);
    }

    #[test]
    fn short_body_closes_silently() {
        let decoded = decode_str("POST / HTTP/1.0\nContent-Type: text/plain\nContent-Length: 10\n\nabc");
        assert!(matches!(decoded, Decoded::Closed));
    }

    #[test]
    fn body_ignored_without_content_type() {
        let req = request(decode_str("POST / HTTP/1.0\nContent-Length: 3\n\nabc"));
        assert_eq!(req.body(), None);
    }
}
