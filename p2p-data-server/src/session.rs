use crate::state::AppState;
use axum::{
    Json,
    extract::{Request, State},
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{COOKIE, SET_COOKIE},
    },
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use p2p_data::access::CredentialStore;
use serde_json::json;
use std::sync::Arc;

pub const SESSION_COOKIE: &str = "p2p_session";

/// Browser cookie remembering a successful login.
///
/// Reads the incoming `Cookie` header and records the `Set-Cookie` change, if
/// any, to attach to the response.
#[derive(Debug, Default)]
pub struct CookieCredentials {
    cached: Option<String>,
    update: Option<Option<String>>,
}

impl CookieCredentials {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let cached = headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(|value| value.split(';'))
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(name, _)| *name == SESSION_COOKIE)
            .map(|(_, value)| value.to_string())
            .filter(|value| !value.is_empty());

        Self { cached, update: None }
    }

    /// `Set-Cookie` value for the recorded change.
    pub fn set_cookie(&self) -> Option<HeaderValue> {
        let cookie = match self.update.as_ref()? {
            Some(credential) => format!("{SESSION_COOKIE}={credential}; Path=/; HttpOnly; SameSite=Lax"),
            None => format!("{SESSION_COOKIE}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0"),
        };
        HeaderValue::from_str(&cookie).ok()
    }

    /// Attach the recorded change to `response`.
    pub fn apply(&self, mut response: Response) -> Response {
        if let Some(value) = self.set_cookie() {
            response.headers_mut().append(SET_COOKIE, value);
        }
        response
    }
}

impl CredentialStore for CookieCredentials {
    fn cached(&self) -> Option<String> {
        match &self.update {
            Some(update) => update.clone(),
            None => self.cached.clone(),
        }
    }

    fn persist(&mut self, credential: &str) {
        self.update = Some(Some(credential.to_string()));
    }

    fn clear(&mut self) {
        self.update = Some(None);
    }
}

/// Axum middleware: require a valid session cookie when a password is configured.
///
/// API requests are answered with 401, page requests redirected to `/login`.
pub async fn require_session(State(state): State<Arc<AppState>>, request: Request, next: Next) -> Response {
    let credentials = CookieCredentials::from_headers(request.headers());
    if state.gate.has_valid_cached_credential(&credentials) {
        return next.run(request).await;
    }

    if request.uri().path().starts_with("/api/") {
        let body = json!({ "error": "unauthorized" });
        (StatusCode::UNAUTHORIZED, Json(body)).into_response()
    } else {
        Redirect::to("/login").into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(cookie: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(COOKIE, HeaderValue::from_str(cookie).unwrap());
        headers
    }

    #[test]
    fn test_from_headers() {
        struct TestCase {
            cookie: &'static str,
            expected: Option<&'static str>,
        }

        let tests = vec![
            TestCase {
                // TC0: only cookie
                cookie: "p2p_session=abc",
                expected: Some("abc"),
            },
            TestCase {
                // TC1: among others
                cookie: "theme=dark; p2p_session=abc; lang=es",
                expected: Some("abc"),
            },
            TestCase {
                // TC2: absent
                cookie: "theme=dark",
                expected: None,
            },
            TestCase {
                // TC3: cleared
                cookie: "p2p_session=",
                expected: None,
            },
        ];

        for (index, test) in tests.into_iter().enumerate() {
            let actual = CookieCredentials::from_headers(&headers(test.cookie)).cached();
            assert_eq!(actual.as_deref(), test.expected, "TC{} failed", index);
        }
    }

    #[test]
    fn test_set_cookie_follows_changes() {
        let mut credentials = CookieCredentials::from_headers(&headers("p2p_session=old"));
        assert_eq!(credentials.set_cookie(), None);

        credentials.persist("new");
        assert_eq!(credentials.cached().as_deref(), Some("new"));
        assert_eq!(
            credentials.set_cookie().unwrap(),
            "p2p_session=new; Path=/; HttpOnly; SameSite=Lax"
        );

        credentials.clear();
        assert_eq!(credentials.cached(), None);
        assert!(credentials.set_cookie().unwrap().to_str().unwrap().contains("Max-Age=0"));
    }
}
