//! Serialize responses on the server.

use std::io::{self, Write};

use crate::headers::{CONTENT_LENGTH, SET_COOKIE};
use crate::response::Response;
use crate::status::ResponseCode;

/// Encode a response into its HTTP/1.0 wire form.
///
/// `Content-Length` is always computed from the buffered content; a value
/// set by the application is ignored. Upgrade responses carry no length,
/// since the connection changes protocol right after the head.
pub(crate) fn encode(res: Response) -> io::Result<Vec<u8>> {
    let content = res.content();
    let mut out = Vec::with_capacity(256 + content.len());

    write!(out, "HTTP/1.0 {} {}\r\n", res.code().code(), res.reason())?;

    for (name, value) in res.headers().iter() {
        if name.eq_ignore_ascii_case(CONTENT_LENGTH) {
            continue;
        }
        write!(out, "{}: {}\r\n", name, value)?;
    }

    if res.code() != ResponseCode::SwitchingProtocols {
        write!(out, "{}: {}\r\n", CONTENT_LENGTH, content.len())?;
    }

    for cookie in res.cookies() {
        write!(out, "{}: {}\r\n", SET_COOKIE, cookie)?;
    }

    out.extend_from_slice(b"\r\n");
    out.extend_from_slice(content);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cookie::Cookie;
    use pretty_assertions::assert_eq;

    fn encode_str(res: Response) -> String {
        String::from_utf8(encode(res).unwrap()).unwrap()
    }

    #[test]
    fn status_headers_and_body() {
        let mut res = Response::new();
        res.set_header("Content-Type", "text/plain");
        res.write_str("hi");
        assert_eq!(
            encode_str(res),
            "HTTP/1.0 200 OK\r\nContent-Type: text/plain\r\nContent-Length: 2\r\n\r\nhi"
        );
    }

    #[test]
    fn empty_body_still_has_length() {
        let mut res = Response::new();
        res.set_code(ResponseCode::NotFound);
        assert_eq!(
            encode_str(res),
            "HTTP/1.0 404 Not Found\r\nContent-Length: 0\r\n\r\n"
        );
    }

    #[test]
    fn override_message_replaces_reason() {
        let mut res = Response::new();
        res.set_code(ResponseCode::BadRequest);
        res.set_message("Cannot parse header.");
        assert!(encode_str(res).starts_with("HTTP/1.0 400 Cannot parse header.\r\n"));
    }

    #[test]
    fn application_length_is_replaced() {
        let mut res = Response::new();
        res.set_header("content-length", "999");
        res.write_str("abc");
        assert_eq!(encode_str(res), "HTTP/1.0 200 OK\r\nContent-Length: 3\r\n\r\nabc");
    }

    #[test]
    fn cookies_follow_headers() {
        let mut res = Response::new();
        res.add_cookie(Cookie::new("a", "1").with_path("/"));
        assert_eq!(
            encode_str(res),
            "HTTP/1.0 200 OK\r\nContent-Length: 0\r\nSet-Cookie: a=1; Path=/\r\n\r\n"
        );
    }

    #[test]
    fn upgrade_has_no_length() {
        let mut res = Response::new();
        res.set_code(ResponseCode::SwitchingProtocols);
        res.set_header("Upgrade", "websocket");
        assert_eq!(
            encode_str(res),
            "HTTP/1.0 101 Switching Protocols\r\nUpgrade: websocket\r\n\r\n"
        );
    }
}
