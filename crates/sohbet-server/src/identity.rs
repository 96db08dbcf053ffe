//! Identity extraction for the transport handshake.
//!
//! Credential verification happens upstream (login sets the cookie); by the
//! time a WebSocket upgrade arrives, the cookie carries an already-verified
//! username. This module only extracts it. No cookie, no connection.

use axum::http::{header, HeaderMap};

/// Cookie holding the verified username.
pub const USERNAME_COOKIE: &str = "username";

/// Extract the verified username from the upgrade request, if any.
#[must_use]
pub fn verified_username(headers: &HeaderMap) -> Option<String> {
    let cookies = headers.get(header::COOKIE)?.to_str().ok()?;
    cookie_value(cookies, USERNAME_COOKIE).filter(|username| !username.is_empty())
}

fn cookie_value(header: &str, name: &str) -> Option<String> {
    header
        .split(';')
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.to_string())
}
