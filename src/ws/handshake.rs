use hyper::header::{
    HeaderMap, HeaderName, HeaderValue, CONNECTION, HOST, SEC_WEBSOCKET_ACCEPT,
    SEC_WEBSOCKET_KEY, SEC_WEBSOCKET_VERSION, UPGRADE,
};
use hyper::{Body, Method, Request, Response, StatusCode, Version};
use sha1::{Digest, Sha1};
use url::Url;

use super::consts::*;
use super::error::{Error, HandshakeError};

fn sha1(msg: &[u8]) -> [u8; 20] {
    let mut hasher = Sha1::new();
    hasher.update(msg);
    hasher.finalize().into()
}

/// A fresh `Sec-WebSocket-Key`: 16 random bytes, base64 encoded.
pub fn generate_key() -> String {
    let nonce: [u8; 16] = rand::random();
    base64::encode(nonce)
}

/// The `Sec-WebSocket-Accept` value answering `key`.
pub fn accept_key_from(key: &[u8]) -> String {
    let concatenated = [key, WS_MAGIC_CONST].concat();
    let hash = sha1(&concatenated);
    base64::encode(hash)
}

// true if any comma separated element of any `name` header equals `token`
fn has_token(headers: &HeaderMap, name: HeaderName, token: &str) -> bool {
    headers
        .get_all(name)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|item| item.trim().eq_ignore_ascii_case(token))
}

/// Builds the client's Upgrade request for a `ws://` or `wss://` url.
pub fn build_request(url: &Url, key: &str) -> Result<Request<Body>, Error> {
    if !matches!(url.scheme(), "ws" | "wss") {
        return Err(HandshakeError::InvalidUrl("scheme must be ws or wss").into());
    }
    if url.fragment().is_some() {
        return Err(HandshakeError::InvalidUrl("fragments are not allowed").into());
    }
    let host = url
        .host_str()
        .ok_or(HandshakeError::InvalidUrl("missing host"))?;
    // `port()` is None for the scheme's default port
    let host = match url.port() {
        Some(port) => format!("{}:{}", host, port),
        None => host.to_string(),
    };
    let target = match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    };

    let request = Request::builder()
        .method(Method::GET)
        .uri(target)
        .version(Version::HTTP_11)
        .header(HOST, host)
        .header(CONNECTION, "Upgrade")
        .header(UPGRADE, WS_UPGRADE_TOKEN)
        .header(SEC_WEBSOCKET_KEY, key)
        .header(SEC_WEBSOCKET_VERSION, WS_VERSION)
        .body(Body::empty())?;
    Ok(request)
}

/// Checks a client's Upgrade request, returning its `Sec-WebSocket-Key`.
pub fn validate_request<B>(req: &Request<B>) -> Result<String, HandshakeError> {
    if req.method() != Method::GET {
        return Err(HandshakeError::MethodNotAllowed(req.method().to_string()));
    }
    if req.version() < Version::HTTP_11 {
        return Err(HandshakeError::UnsupportedHttpVersion);
    }
    let headers = req.headers();
    if !headers.contains_key(HOST) {
        return Err(HandshakeError::MissingHost);
    }
    if !has_token(headers, UPGRADE, WS_UPGRADE_TOKEN) {
        return Err(HandshakeError::MissingUpgrade);
    }
    if !has_token(headers, CONNECTION, CONNECTION_UPGRADE_TOKEN) {
        return Err(HandshakeError::MissingConnectionUpgrade);
    }
    let key = headers
        .get(SEC_WEBSOCKET_KEY)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|key| !key.is_empty())
        .ok_or(HandshakeError::MissingKey)?;
    if headers.get(SEC_WEBSOCKET_VERSION).map(HeaderValue::as_bytes) != Some(WS_VERSION.as_bytes())
    {
        return Err(HandshakeError::UnsupportedVersion);
    }
    Ok(key.to_string())
}

/// The 101 response accepting a request that carried `key`.
pub fn switching_protocols(key: &str) -> Result<Response<Body>, Error> {
    let response = Response::builder()
        .status(StatusCode::SWITCHING_PROTOCOLS)
        .header(UPGRADE, WS_UPGRADE_TOKEN)
        .header(CONNECTION, "Upgrade")
        .header(SEC_WEBSOCKET_ACCEPT, accept_key_from(key.as_bytes()))
        .body(Body::empty())?;
    Ok(response)
}

/// The error response refusing a request.
pub fn rejection(err: &HandshakeError) -> Response<Body> {
    let mut response = Response::new(Body::from(err.to_string()));
    *response.status_mut() = err.status();
    if let HandshakeError::UnsupportedVersion = err {
        response
            .headers_mut()
            .insert(SEC_WEBSOCKET_VERSION, HeaderValue::from_static(WS_VERSION));
    }
    response
}

/// Checks the server's answer to a request that carried `key`.
pub fn validate_response<B>(res: &Response<B>, key: &str) -> Result<(), HandshakeError> {
    if res.status() != StatusCode::SWITCHING_PROTOCOLS {
        return Err(HandshakeError::UnexpectedStatus(res.status()));
    }
    let headers = res.headers();
    if !has_token(headers, UPGRADE, WS_UPGRADE_TOKEN) {
        return Err(HandshakeError::MissingUpgrade);
    }
    if !has_token(headers, CONNECTION, CONNECTION_UPGRADE_TOKEN) {
        return Err(HandshakeError::MissingConnectionUpgrade);
    }
    let expected = accept_key_from(key.as_bytes());
    match headers.get(SEC_WEBSOCKET_ACCEPT).and_then(|v| v.to_str().ok()) {
        Some(accept) if accept.trim() == expected => Ok(()),
        _ => Err(HandshakeError::AcceptMismatch),
    }
}
