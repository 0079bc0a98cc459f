//! Request-scoped token and identity propagation.
//!
//! Each inbound request runs inside its own [`scope`], a task-local slot
//! holding the caller's bearer token and decoded claims. Downstream code
//! reads them through free functions instead of threading credentials
//! through every call.
//!
//! Concurrent requests never observe each other's state: the slot lives
//! with the task, so interleaved executions each see their own context.
//!
//! Absence of a context is not an error. Accessors called outside any
//! scope return `None`, setters become no-ops, and [`auth_header`]
//! degrades to an empty header map, which downstream code treats as "call
//! unauthenticated".

use std::cell::RefCell;
use std::future::Future;
use std::sync::Arc;

use http::header::AUTHORIZATION;
use http::{HeaderMap, HeaderValue};
use medrec_core::types::AuthClaims;

#[derive(Default)]
struct ContextData {
    token: Option<String>,
    user: Option<Arc<AuthClaims>>,
}

tokio::task_local! {
    static CONTEXT: RefCell<ContextData>;
}

/// Run a future inside a fresh, isolated request context.
pub async fn scope<F>(fut: F) -> F::Output
where
    F: Future,
{
    CONTEXT.scope(RefCell::new(ContextData::default()), fut).await
}

/// Store the caller's bearer token. No-op outside any scope.
pub fn set_token(token: impl Into<String>) {
    let token = token.into();
    let _ = CONTEXT.try_with(|ctx| ctx.borrow_mut().token = Some(token));
}

/// The caller's bearer token, if any scope is active and populated.
pub fn token() -> Option<String> {
    CONTEXT.try_with(|ctx| ctx.borrow().token.clone()).ok().flatten()
}

/// Store the caller's decoded claims. No-op outside any scope.
pub fn set_user(user: Arc<AuthClaims>) {
    let _ = CONTEXT.try_with(|ctx| ctx.borrow_mut().user = Some(user));
}

/// The caller's decoded claims, if any scope is active and populated.
pub fn user() -> Option<Arc<AuthClaims>> {
    CONTEXT.try_with(|ctx| ctx.borrow().user.clone()).ok().flatten()
}

/// Headers carrying the caller's credentials onward.
///
/// Empty when no token is set; otherwise a single
/// `Authorization: Bearer <token>` entry.
pub fn auth_header() -> HeaderMap {
    let mut headers = HeaderMap::new();
    if let Some(token) = token() {
        match HeaderValue::from_str(&format!("Bearer {token}")) {
            Ok(value) => {
                headers.insert(AUTHORIZATION, value);
            }
            Err(e) => {
                tracing::warn!(error = %e, "bearer token is not a valid header value");
            }
        }
    }
    headers
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn claims(sub: &str) -> Arc<AuthClaims> {
        Arc::new(AuthClaims {
            sub: sub.to_string(),
            role: Some("MEDICO".to_string()),
            exp: 4_102_444_800,
            iat: 0,
            extra: Default::default(),
        })
    }

    #[tokio::test]
    async fn test_scope_holds_token_and_user() {
        scope(async {
            assert!(token().is_none());

            set_token("abc");
            set_user(claims("u1"));

            assert_eq!(token().as_deref(), Some("abc"));
            assert_eq!(user().unwrap().sub, "u1");
        })
        .await;
    }

    #[tokio::test]
    async fn test_accessors_outside_scope_degrade_to_none() {
        set_token("ignored");
        assert!(token().is_none());
        assert!(user().is_none());
        assert!(auth_header().is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_scopes_stay_isolated() {
        let a = tokio::spawn(scope(async {
            set_token("token-a");
            tokio::time::sleep(Duration::from_millis(30)).await;
            token()
        }));
        let b = tokio::spawn(scope(async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            set_token("token-b");
            tokio::time::sleep(Duration::from_millis(30)).await;
            token()
        }));

        assert_eq!(a.await.unwrap().as_deref(), Some("token-a"));
        assert_eq!(b.await.unwrap().as_deref(), Some("token-b"));
    }

    #[tokio::test]
    async fn test_nested_scope_starts_fresh() {
        scope(async {
            set_token("outer");
            scope(async {
                assert!(token().is_none());
                set_token("inner");
                assert_eq!(token().as_deref(), Some("inner"));
            })
            .await;
            assert_eq!(token().as_deref(), Some("outer"));
        })
        .await;
    }

    #[tokio::test]
    async fn test_auth_header_carries_bearer_token() {
        scope(async {
            set_token("t0k3n");
            let headers = auth_header();
            assert_eq!(
                headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()),
                Some("Bearer t0k3n")
            );
        })
        .await;
    }
}
