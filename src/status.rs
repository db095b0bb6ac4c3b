//! The closed set of response codes the server can emit.

use std::fmt;

/// HTTP response codes.
///
/// Only the subset the server actually produces is included; the numeric
/// values and reason phrases follow HTTP/1.0.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseCode {
    /// 101
    SwitchingProtocols,
    /// 200
    Ok,
    /// 301
    MovedPermanently,
    /// 303
    SeeOther,
    /// 400
    BadRequest,
    /// 401
    Unauthorized,
    /// 403
    Forbidden,
    /// 404
    NotFound,
    /// 405
    MethodNotAllowed,
    /// 411
    LengthRequired,
    /// 413
    RequestEntityTooLarge,
    /// 500
    InternalServerError,
    /// 501
    NotImplemented,
    /// 505
    VersionNotSupported,
}

impl ResponseCode {
    /// The numeric status code sent on the status line.
    pub fn code(self) -> u16 {
        match self {
            ResponseCode::SwitchingProtocols => 101,
            ResponseCode::Ok => 200,
            ResponseCode::MovedPermanently => 301,
            ResponseCode::SeeOther => 303,
            ResponseCode::BadRequest => 400,
            ResponseCode::Unauthorized => 401,
            ResponseCode::Forbidden => 403,
            ResponseCode::NotFound => 404,
            ResponseCode::MethodNotAllowed => 405,
            ResponseCode::LengthRequired => 411,
            ResponseCode::RequestEntityTooLarge => 413,
            ResponseCode::InternalServerError => 500,
            ResponseCode::NotImplemented => 501,
            ResponseCode::VersionNotSupported => 505,
        }
    }

    /// The default reason phrase for this code.
    pub fn reason(self) -> &'static str {
        match self {
            ResponseCode::SwitchingProtocols => "Switching Protocols",
            ResponseCode::Ok => "OK",
            ResponseCode::MovedPermanently => "Moved Permanently",
            ResponseCode::SeeOther => "See Other",
            ResponseCode::BadRequest => "Bad Request",
            ResponseCode::Unauthorized => "Unauthorized",
            ResponseCode::Forbidden => "Forbidden",
            ResponseCode::NotFound => "Not Found",
            ResponseCode::MethodNotAllowed => "Method Not Allowed",
            ResponseCode::LengthRequired => "Length Required",
            ResponseCode::RequestEntityTooLarge => "Request Entity Too Large",
            ResponseCode::InternalServerError => "Internal Server Error",
            ResponseCode::NotImplemented => "Not Implemented",
            ResponseCode::VersionNotSupported => "Version Not Supported",
        }
    }

    /// Pick the override message if there is one, the default reason otherwise.
    pub fn message<'a>(self, alternate: Option<&'a str>) -> &'a str {
        alternate.unwrap_or_else(|| self.reason())
    }
}

impl Default for ResponseCode {
    fn default() -> Self {
        ResponseCode::Ok
    }
}

impl fmt::Display for ResponseCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.code(), self.reason())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_and_reasons() {
        assert_eq!(ResponseCode::LengthRequired.code(), 411);
        assert_eq!(ResponseCode::RequestEntityTooLarge.code(), 413);
        assert_eq!(ResponseCode::VersionNotSupported.reason(), "Version Not Supported");
        assert_eq!(ResponseCode::default(), ResponseCode::Ok);
    }

    #[test]
    fn override_message() {
        assert_eq!(ResponseCode::NotFound.message(None), "Not Found");
        assert_eq!(ResponseCode::NotFound.message(Some("Gone fishing")), "Gone fishing");
    }
}
