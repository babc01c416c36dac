//! Origin allowlist for the chat API.
//!
//! Separate from CORS: CORS only instructs browsers, while this check
//! rejects requests server-side unless they come from an embedding page we
//! know about.

use axum::{
    extract::{Request, State},
    http::{HeaderMap, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};

use super::{ErrorResponse, WebState};

/// Whether the request headers name an allowed embedding page.
///
/// `Origin` must match exactly; `X-Widget-Url` and then `Referer` may
/// start with an allowed origin at a path boundary.
pub fn is_allowed(allowed: &[String], headers: &HeaderMap) -> bool {
    let get = |name: &str| {
        headers
            .get(name)
            .and_then(|v| v.to_str().ok())
            .filter(|v| !v.is_empty())
    };

    if let Some(origin) = get("origin") {
        if allowed.iter().any(|a| a == origin) {
            return true;
        }
    }
    if let Some(widget_url) = get("x-widget-url") {
        if allowed.iter().any(|a| url_within(widget_url, a)) {
            return true;
        }
    }
    if let Some(referer) = get("referer") {
        if allowed.iter().any(|a| url_within(referer, a)) {
            return true;
        }
    }
    false
}

/// `url` is `prefix` itself or continues past it with a path, query or
/// fragment, so `https://a.com.evil.io` is not within `https://a.com`.
fn url_within(url: &str, prefix: &str) -> bool {
    match url.strip_prefix(prefix) {
        Some(rest) => {
            prefix.ends_with('/') || rest.is_empty() || rest.starts_with(['/', '?', '#'])
        }
        None => false,
    }
}

fn is_exempt(method: &Method, path: &str) -> bool {
    method == Method::OPTIONS || path == "/api/health" || !path.starts_with("/api/")
}

/// Reject API requests from unknown origins with 403.
pub async fn validate_origin(State(state): State<WebState>, request: Request, next: Next) -> Response {
    if is_exempt(request.method(), request.uri().path())
        || is_allowed(&state.allowed_origins, request.headers())
    {
        return next.run(request).await;
    }

    tracing::warn!(
        path = %request.uri().path(),
        origin = ?request.headers().get("origin"),
        referer = ?request.headers().get("referer"),
        "Origin validation failed"
    );
    (
        StatusCode::FORBIDDEN,
        Json(ErrorResponse::new("Access denied: Invalid origin", "FORBIDDEN")),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(pairs: &[(&'static str, &'static str)]) -> HeaderMap {
        let mut map = HeaderMap::new();
        for (k, v) in pairs {
            map.insert(*k, HeaderValue::from_static(v));
        }
        map
    }

    fn allowed() -> Vec<String> {
        vec![
            "https://intranet.acme.com".to_string(),
            "https://storage.googleapis.com/acme-widget".to_string(),
        ]
    }

    #[test]
    fn test_origin_must_match_exactly() {
        assert!(is_allowed(&allowed(), &headers(&[("origin", "https://intranet.acme.com")])));
        assert!(!is_allowed(
            &allowed(),
            &headers(&[("origin", "https://intranet.acme.com.evil.io")])
        ));
    }

    #[test]
    fn test_widget_url_and_referer_prefixes() {
        assert!(is_allowed(
            &allowed(),
            &headers(&[
                ("origin", "https://storage.googleapis.com"),
                ("x-widget-url", "https://storage.googleapis.com/acme-widget/index.html")
            ])
        ));
        assert!(is_allowed(
            &allowed(),
            &headers(&[("referer", "https://intranet.acme.com/help")])
        ));
        assert!(!is_allowed(
            &allowed(),
            &headers(&[("referer", "https://storage.googleapis.com/other-bucket/")])
        ));
    }

    #[test]
    fn test_lookalike_hosts_are_rejected() {
        for name in ["referer", "x-widget-url"] {
            for url in [
                "https://intranet.acme.com.evil.io",
                "https://intranet.acme.com.evil.io/page",
                "https://intranet.acme.com:8443/page",
                "https://storage.googleapis.com/acme-widget-clone/index.html",
            ] {
                assert!(!is_allowed(&allowed(), &headers(&[(name, url)])), "{} {}", name, url);
            }
        }

        for url in [
            "https://intranet.acme.com",
            "https://intranet.acme.com?from=widget",
            "https://intranet.acme.com#chat",
            "https://storage.googleapis.com/acme-widget/index.html",
        ] {
            assert!(is_allowed(&allowed(), &headers(&[("referer", url)])), "{}", url);
        }
    }

    #[test]
    fn test_no_headers_or_empty_allowlist() {
        assert!(!is_allowed(&allowed(), &HeaderMap::new()));
        assert!(!is_allowed(&[], &headers(&[("origin", "https://intranet.acme.com")])));
    }

    #[test]
    fn test_exempt_requests() {
        assert!(is_exempt(&Method::OPTIONS, "/api/chat"));
        assert!(is_exempt(&Method::GET, "/api/health"));
        assert!(!is_exempt(&Method::POST, "/api/chat"));
    }
}
