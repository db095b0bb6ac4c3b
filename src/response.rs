use std::borrow::Cow;

use crate::cookie::Cookie;
use crate::headers::{Headers, LOCATION};
use crate::status::ResponseCode;

/// The response being built for a request.
///
/// Filters and handlers mutate it; the connection processor serializes it
/// once at the end of the exchange.
#[derive(Debug, Clone, Default)]
pub struct Response {
    code: ResponseCode,
    message: Option<Cow<'static, str>>,
    headers: Headers,
    cookies: Vec<Cookie>,
    content: Vec<u8>,
}

impl Response {
    /// Create an empty `200 OK` response.
    pub fn new() -> Self {
        Self::default()
    }

    /// The current status.
    pub fn code(&self) -> ResponseCode {
        self.code
    }

    /// Set the status, clearing any override message.
    pub fn set_code(&mut self, code: ResponseCode) {
        self.code = code;
        self.message = None;
    }

    /// The override reason message, if set.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Override the reason phrase sent on the status line.
    pub fn set_message(&mut self, message: impl Into<Cow<'static, str>>) {
        self.message = Some(message.into());
    }

    /// The reason phrase that will be sent.
    pub fn reason(&self) -> &str {
        self.code.message(self.message.as_deref())
    }

    /// The response headers.
    pub fn headers(&self) -> &Headers {
        &self.headers
    }

    /// Mutable access to the response headers.
    pub fn headers_mut(&mut self) -> &mut Headers {
        &mut self.headers
    }

    /// Set a header, replacing any previous value.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.headers.insert(name, value);
    }

    /// Cookies to send as `Set-Cookie` headers.
    pub fn cookies(&self) -> &[Cookie] {
        &self.cookies
    }

    /// Queue a cookie.
    pub fn add_cookie(&mut self, cookie: Cookie) {
        self.cookies.push(cookie);
    }

    /// The buffered body.
    pub fn content(&self) -> &[u8] {
        &self.content
    }

    /// Append bytes to the body.
    pub fn write(&mut self, bytes: impl AsRef<[u8]>) {
        self.content.extend_from_slice(bytes.as_ref());
    }

    /// Append text to the body.
    pub fn write_str(&mut self, text: &str) {
        self.write(text.as_bytes());
    }

    /// Discard the buffered body.
    pub fn clear_content(&mut self) {
        self.content.clear();
    }

    /// Redirect to `location` with `303 See Other`, or `301 Moved
    /// Permanently` when `permanent` is set.
    pub fn redirect(&mut self, location: impl Into<String>, permanent: bool) {
        self.set_code(if permanent {
            ResponseCode::MovedPermanently
        } else {
            ResponseCode::SeeOther
        });
        self.headers.insert(LOCATION, location);
    }

    pub(crate) fn apply_error(&mut self, code: ResponseCode, message: Option<&str>) {
        self.code = code;
        self.message = message.map(|m| Cow::Owned(m.to_owned()));
    }
}
