//! Authorization marker cookies
//!
//! The marker (`admin_authenticated=true`) only records that this browser
//! profile signed in before. It is never verified and never grants data
//! access; it lets the route interceptor skip the login redirect. The
//! identity label cookie carries the last signed-in identity for display.

use axum::http::{header, HeaderMap, HeaderValue};

/// Marker cookie name
pub const MARKER_COOKIE: &str = "admin_authenticated";
/// Marker value meaning "signed in"
pub const MARKER_VALUE: &str = "true";
/// Last known identity label
pub const IDENTITY_COOKIE: &str = "admin_user";

/// Value of a cookie from the request's `Cookie` headers
pub fn read_cookie(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|h| h.to_str().ok())
        .flat_map(|h| h.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim().to_string())
}

/// Raw marker value, if the request carries one
pub fn marker_from_headers(headers: &HeaderMap) -> Option<String> {
    read_cookie(headers, MARKER_COOKIE)
}

/// Check a marker value against the sentinel
pub fn is_marker_set(value: Option<&str>) -> bool {
    value == Some(MARKER_VALUE)
}

fn cookie(name: &str, value: &str, max_age: i64, secure: bool) -> String {
    let mut cookie = format!("{}={}; Path=/; SameSite=Lax; Max-Age={}", name, value, max_age);
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// `Set-Cookie` values that set the marker and identity label
pub fn set_marker_cookies(identity: &str, max_age_hours: i64, secure: bool) -> Vec<HeaderValue> {
    let max_age = max_age_hours * 60 * 60;
    let label = urlencoding::encode(identity);
    [
        cookie(MARKER_COOKIE, MARKER_VALUE, max_age, secure),
        cookie(IDENTITY_COOKIE, &label, max_age, secure),
    ]
    .iter()
    .filter_map(|c| HeaderValue::from_str(c).ok())
    .collect()
}

/// `Set-Cookie` values that remove both cookies
pub fn clear_marker_cookies(secure: bool) -> Vec<HeaderValue> {
    [
        cookie(MARKER_COOKIE, "", 0, secure),
        cookie(IDENTITY_COOKIE, "", 0, secure),
    ]
    .iter()
    .filter_map(|c| HeaderValue::from_str(c).ok())
    .collect()
}
