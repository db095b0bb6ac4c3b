use std::borrow::Cow;
use std::io;

use thiserror::Error;

use crate::status::ResponseCode;

/// A status-coded condition raised while handling a request.
///
/// Returning one of these from a parser stage, a filter or a handler
/// short-circuits normal output: the response status and message are
/// overwritten with the error's before the response is sent.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{} {}", .code.code(), .code.message(.message.as_deref()))]
pub struct HttpError {
    code: ResponseCode,
    message: Option<Cow<'static, str>>,
}

macro_rules! http_error_constructors {
    ($($(#[$doc:meta])* $name:ident => $code:ident,)*) => {
        $(
            $(#[$doc])*
            pub fn $name() -> Self {
                Self::new(ResponseCode::$code)
            }
        )*
    };
}

impl HttpError {
    /// Create an error with the code's default reason phrase.
    pub fn new(code: ResponseCode) -> Self {
        Self {
            code,
            message: None,
        }
    }

    /// Create an error carrying a custom message for the status line.
    pub fn with_message(code: ResponseCode, message: impl Into<Cow<'static, str>>) -> Self {
        Self {
            code,
            message: Some(message.into()),
        }
    }

    /// The response code this condition maps to.
    pub fn code(&self) -> ResponseCode {
        self.code
    }

    /// The override message, if one was given.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Replace the message.
    pub fn set_message(mut self, message: impl Into<Cow<'static, str>>) -> Self {
        self.message = Some(message.into());
        self
    }

    http_error_constructors! {
        /// 101, only meaningful during an upgrade.
        switching_protocols => SwitchingProtocols,
        /// 200, used by handlers to exit early with a plain response.
        ok => Ok,
        /// 301
        moved_permanently => MovedPermanently,
        /// 303
        see_other => SeeOther,
        /// 400
        bad_request => BadRequest,
        /// 401
        unauthorized => Unauthorized,
        /// 403
        forbidden => Forbidden,
        /// 404
        not_found => NotFound,
        /// 405
        method_not_allowed => MethodNotAllowed,
        /// 411
        length_required => LengthRequired,
        /// 413
        request_entity_too_large => RequestEntityTooLarge,
        /// 500
        internal_server_error => InternalServerError,
        /// 501
        not_implemented => NotImplemented,
        /// 505
        version_not_supported => VersionNotSupported,
    }
}

impl From<ResponseCode> for HttpError {
    fn from(code: ResponseCode) -> Self {
        Self::new(code)
    }
}

impl From<io::Error> for HttpError {
    fn from(err: io::Error) -> Self {
        log::debug!("I/O failure while handling request: {}", err);
        Self::internal_server_error()
    }
}

/// Errors from configuring or running a server.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum ServerError {
    /// `start` was called on a server that is already running.
    #[error("socket server is already running")]
    AlreadyRunning,
    /// A handler, filter or route was changed while the server is running.
    #[error("cannot change registrations while the server is running")]
    RegistrationWhileRunning,
    /// A route prefix was registered twice.
    #[error("a handler is already registered for prefix `{0}`")]
    DuplicateRoute(String),
    /// `start` was called before a connection handler was installed.
    #[error("no connection handler installed")]
    NoHandler,
    /// Binding or querying the listening socket failed.
    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Errors when sending on a WebSocket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum WsError {
    /// The socket has been closed.
    #[error("websocket is closed")]
    Closed,
    /// The payload does not fit in a single 16-bit length frame.
    #[error("payload of {0} bytes exceeds the outbound frame limit")]
    FrameTooLarge(usize),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_uses_override_message() {
        let err = HttpError::with_message(ResponseCode::BadRequest, "Cannot parse header.");
        assert_eq!(err.to_string(), "400 Cannot parse header.");
        assert_eq!(HttpError::not_found().to_string(), "404 Not Found");
    }

    #[test]
    fn io_errors_map_to_internal_server_error() {
        let err: HttpError = io::Error::new(io::ErrorKind::Other, "boom").into();
        assert_eq!(err.code(), ResponseCode::InternalServerError);
        assert_eq!(err.message(), None);
    }
}
