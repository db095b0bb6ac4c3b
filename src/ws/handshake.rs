//! The HTTP/1.x upgrade handshake.

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use sha1::{Digest, Sha1};

use crate::headers::{
    CONNECTION, SEC_WEBSOCKET_ACCEPT, SEC_WEBSOCKET_KEY, SEC_WEBSOCKET_PROTOCOL,
    SEC_WEBSOCKET_VERSION, UPGRADE,
};
use crate::request::Request;
use crate::response::Response;
use crate::status::ResponseCode;

const GUID: &str = "258EAFA5-E914-47DA-95CA-C5AB0DC85B11";
const VERSION: &str = "13";

fn header_contains(req: &Request, name: &str, token: &str) -> bool {
    req.header(name)
        .map(|value| value.to_ascii_lowercase().contains(token))
        .unwrap_or(false)
}

/// Whether the request asks for a version 13 WebSocket upgrade.
pub(crate) fn is_upgrade_request(req: &Request) -> bool {
    header_contains(req, CONNECTION, "upgrade")
        && header_contains(req, UPGRADE, "websocket")
        && req.header(SEC_WEBSOCKET_VERSION).map(str::trim) == Some(VERSION)
        && req.header(SEC_WEBSOCKET_KEY).is_some()
}

/// The subprotocols offered by the client, in order.
///
/// A client that names none offers the single empty protocol.
pub(crate) fn offered_protocols(req: &Request) -> Vec<String> {
    match req.header(SEC_WEBSOCKET_PROTOCOL) {
        Some(list) => list.split(',').map(|p| p.trim().to_owned()).collect(),
        None => vec![String::new()],
    }
}

/// Compute `Sec-WebSocket-Accept` for a client key.
pub(crate) fn accept_key(key: &str) -> String {
    let mut hasher = Sha1::new();
    hasher.update(key.trim().as_bytes());
    hasher.update(GUID.as_bytes());
    STANDARD.encode(hasher.finalize())
}

/// Turn `res` into a `101 Switching Protocols` answer for `req`.
pub(crate) fn accept(req: &Request, res: &mut Response, protocol: &str) {
    let key = req.header(SEC_WEBSOCKET_KEY).unwrap_or_default();
    res.set_code(ResponseCode::SwitchingProtocols);
    res.set_header(UPGRADE, "websocket");
    res.set_header(CONNECTION, "Upgrade");
    res.set_header(SEC_WEBSOCKET_ACCEPT, accept_key(key));
    if !protocol.is_empty() {
        res.set_header(SEC_WEBSOCKET_PROTOCOL, protocol);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http_types::Method;
    use pretty_assertions::assert_eq;

    fn upgrade_request() -> Request {
        let mut req = Request::new(Method::Get, "/chat");
        req.headers.insert("Connection", "keep-alive, Upgrade");
        req.headers.insert("Upgrade", "WebSocket");
        req.headers.insert("Sec-WebSocket-Version", "13");
        req.headers.insert("Sec-WebSocket-Key", "dGhlIHNhbXBsZSBub25jZQ==");
        req
    }

    #[test]
    fn rfc_accept_key() {
        assert_eq!(
            accept_key("dGhlIHNhbXBsZSBub25jZQ=="),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
        assert_eq!(
            accept_key(" dGhlIHNhbXBsZSBub25jZQ== "),
            "s3pPLMBiTxaQ9kYGzzhZRbK+xOo="
        );
    }

    #[test]
    fn detects_upgrades() {
        assert!(is_upgrade_request(&upgrade_request()));

        let mut req = upgrade_request();
        req.headers.insert("Sec-WebSocket-Version", "8");
        assert!(!is_upgrade_request(&req));

        let mut req = upgrade_request();
        req.headers.remove("Sec-WebSocket-Key");
        assert!(!is_upgrade_request(&req));

        let mut req = upgrade_request();
        req.headers.insert("Connection", "close");
        assert!(!is_upgrade_request(&req));
    }

    #[test]
    fn protocol_offers() {
        let mut req = upgrade_request();
        assert_eq!(offered_protocols(&req), vec![String::new()]);

        req.headers.insert("Sec-WebSocket-Protocol", "chat, superchat");
        assert_eq!(offered_protocols(&req), vec!["chat", "superchat"]);
    }

    #[test]
    fn switching_protocols_response() {
        let req = upgrade_request();
        let mut res = Response::new();
        accept(&req, &mut res, "chat");

        assert_eq!(res.code(), ResponseCode::SwitchingProtocols);
        assert_eq!(res.headers().get("upgrade"), Some("websocket"));
        assert_eq!(res.headers().get("connection"), Some("Upgrade"));
        assert_eq!(
            res.headers().get("sec-websocket-accept"),
            Some("s3pPLMBiTxaQ9kYGzzhZRbK+xOo=")
        );
        assert_eq!(res.headers().get("sec-websocket-protocol"), Some("chat"));

        let mut res = Response::new();
        accept(&req, &mut res, "");
        assert!(!res.headers().contains("sec-websocket-protocol"));
    }
}
