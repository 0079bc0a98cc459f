//! Axum layers wiring authentication into the request context.
//!
//! [`context_middleware`] opens a fresh context scope around each request
//! and must be the outermost of the two layers. [`auth_middleware`]
//! extracts the `Authorization: Bearer` header, verifies the token and
//! stores token and claims in the context; handlers can also extract the
//! claims from request extensions.
//!
//! ```ignore
//! let app = Router::new()
//!     .route("/patients", get(list_patients))
//!     .layer(middleware::from_fn_with_state(auth_config, auth_middleware))
//!     .layer(middleware::from_fn(context_middleware));
//! ```

use std::sync::Arc;

use axum::{
    Json,
    extract::{Request, State},
    http::{HeaderMap, StatusCode, header::AUTHORIZATION},
    middleware::Next,
    response::{IntoResponse, Response},
};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde_json::json;

use medrec_core::types::AuthClaims;

use crate::context;

/// Verification settings for inbound bearer tokens.
#[derive(Clone)]
pub struct AuthConfig {
    decoding_key: Arc<DecodingKey>,
    validation: Validation,
}

impl AuthConfig {
    pub fn new(jwt_secret: &str) -> Self {
        Self {
            decoding_key: Arc::new(DecodingKey::from_secret(jwt_secret.as_bytes())),
            validation: Validation::new(Algorithm::HS256),
        }
    }

    fn decode(&self, token: &str) -> Result<AuthClaims, jsonwebtoken::errors::Error> {
        jsonwebtoken::decode::<AuthClaims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
    }
}

/// Wrap the rest of the stack in a fresh, isolated request context.
pub async fn context_middleware(request: Request, next: Next) -> Response {
    context::scope(next.run(request)).await
}

/// Reject requests without a valid bearer token; populate the context and
/// request extensions for the ones that carry one.
pub async fn auth_middleware(
    State(config): State<AuthConfig>,
    mut request: Request,
    next: Next,
) -> Response {
    let Some(token) = bearer_token(request.headers()) else {
        return unauthorized("token not provided");
    };

    let claims = match config.decode(&token) {
        Ok(claims) => Arc::new(claims),
        Err(e) => {
            tracing::debug!(error = %e, "rejected bearer token");
            return unauthorized("invalid or expired token");
        }
    };

    context::set_token(&token);
    context::set_user(Arc::clone(&claims));
    request.extensions_mut().insert(claims);

    next.run(request).await
}

fn bearer_token(headers: &HeaderMap) -> Option<String> {
    let header = headers.get(AUTHORIZATION)?.to_str().ok()?;
    header.strip_prefix("Bearer ").map(str::to_string)
}

fn unauthorized(message: &str) -> Response {
    (StatusCode::UNAUTHORIZED, Json(json!({ "message": message }))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        Extension, Router,
        body::Body,
        http::Request as HttpRequest,
        middleware::{from_fn, from_fn_with_state},
        routing::get,
    };
    use jsonwebtoken::{EncodingKey, Header};
    use tower::ServiceExt;

    const SECRET: &str = "test-secret";

    fn token_for(sub: &str, exp: u64) -> String {
        let claims = AuthClaims {
            sub: sub.to_string(),
            role: Some("MEDICO".to_string()),
            exp,
            iat: 0,
            extra: Default::default(),
        };
        jsonwebtoken::encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(SECRET.as_bytes()),
        )
        .unwrap()
    }

    async fn whoami(Extension(claims): Extension<Arc<AuthClaims>>) -> String {
        // The context and the extension must agree.
        let from_context = context::user().map(|u| u.sub.clone()).unwrap_or_default();
        assert_eq!(from_context, claims.sub);
        assert!(context::token().is_some());
        claims.sub.clone()
    }

    fn app() -> Router {
        Router::new()
            .route("/whoami", get(whoami))
            .layer(from_fn_with_state(AuthConfig::new(SECRET), auth_middleware))
            .layer(from_fn(context_middleware))
    }

    async fn send(app: Router, auth: Option<&str>) -> (StatusCode, String) {
        let mut builder = HttpRequest::builder().uri("/whoami");
        if let Some(value) = auth {
            builder = builder.header(AUTHORIZATION, value);
        }
        let response = app
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, String::from_utf8_lossy(&bytes).into_owned())
    }

    #[tokio::test]
    async fn test_valid_token_reaches_handler_with_context() {
        let token = token_for("u42", 4_102_444_800);
        let (status, body) = send(app(), Some(&format!("Bearer {token}"))).await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "u42");
    }

    #[tokio::test]
    async fn test_missing_header_is_rejected() {
        let (status, body) = send(app(), None).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.contains("token not provided"));
    }

    #[tokio::test]
    async fn test_malformed_scheme_is_rejected() {
        let (status, _) = send(app(), Some("Basic dXNlcjpwYXNz")).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_garbage_token_is_rejected() {
        let (status, body) = send(app(), Some("Bearer not-a-jwt")).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert!(body.contains("invalid or expired token"));
    }

    #[tokio::test]
    async fn test_expired_token_is_rejected() {
        let token = token_for("u42", 1);
        let (status, _) = send(app(), Some(&format!("Bearer {token}"))).await;

        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_context_does_not_leak_across_requests() {
        let app = app();
        let token = token_for("first", 4_102_444_800);
        let (status, body) = send(app.clone(), Some(&format!("Bearer {token}"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "first");

        // The next request opens a fresh scope; without a token it never
        // sees the previous caller's identity.
        let (status, _) = send(app, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
