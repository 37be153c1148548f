//! Double-submit CSRF token for the script-driven candidate flow.

use axum::http::HeaderMap;
use headers::{Cookie, HeaderMapExt};
use subtle::ConstantTimeEq;
use uuid::Uuid;

pub const CSRF_COOKIE: &str = "csrf_token";
pub const CSRF_HEADER: &str = "x-csrf-token";

pub fn issue_token() -> String {
    Uuid::new_v4().simple().to_string()
}

pub fn set_cookie_value(token: &str) -> String {
    format!("{CSRF_COOKIE}={token}; Path=/; SameSite=Strict; HttpOnly")
}

/// The header token must equal the cookie token.
pub fn verify(headers: &HeaderMap) -> bool {
    let Some(cookie) = headers.typed_get::<Cookie>() else {
        return false;
    };
    let Some(expected) = cookie.get(CSRF_COOKIE).filter(|token| !token.is_empty()) else {
        return false;
    };
    let Some(presented) = headers
        .get(CSRF_HEADER)
        .and_then(|value| value.to_str().ok())
    else {
        return false;
    };

    expected.as_bytes().ct_eq(presented.trim().as_bytes()).into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::{header, HeaderValue};

    fn headers_with(cookie: &str, header_token: Option<&str>) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_str(cookie).expect("cookie header"),
        );
        if let Some(token) = header_token {
            headers.insert(CSRF_HEADER, HeaderValue::from_str(token).expect("token header"));
        }
        headers
    }

    #[test]
    fn matching_tokens_pass() {
        let token = issue_token();
        assert_eq!(token.len(), 32);
        let headers = headers_with(&format!("theme=dark; csrf_token={token}"), Some(&token));
        assert!(verify(&headers));
    }

    #[test]
    fn missing_or_mismatched_tokens_fail() {
        assert!(!verify(&HeaderMap::new()));
        assert!(!verify(&headers_with("csrf_token=abc", None)));
        assert!(!verify(&headers_with("csrf_token=abc", Some("abd"))));
        assert!(!verify(&headers_with("other=abc", Some("abc"))));
    }

    #[test]
    fn cookie_is_strict_and_http_only() {
        let value = set_cookie_value("abc");
        assert!(value.starts_with("csrf_token=abc;"));
        assert!(value.contains("SameSite=Strict"));
        assert!(value.contains("HttpOnly"));
    }
}
