//! Identity plumbing for the medrec patient-EHR core.
//!
//! The remote security service is the source of truth for identities and
//! roles. This crate is everything that sits between medrec and that
//! service:
//!
//! - **context** — request-scoped bearer token and decoded claims,
//!   isolated per inbound request
//! - **client** — outbound HTTP with single-flight deduplication and
//!   retry with linear backoff
//! - **gateway** — cache-first reads and invalidate-on-write mutations
//!   against the security service
//! - **middleware** — axum layers that open a context scope and decode
//!   the bearer token
//!
//! ```text
//! request → middleware (token, claims) → context
//!                                          ↓
//! repositories → SecurityGateway → CacheService hit?
//!                                          ↓ miss
//!                               SecurityHttpClient (dedup, retry)
//!                                          ↓
//!                                 remote security service
//! ```

pub mod client;
pub mod context;
pub mod error;
pub mod gateway;
pub mod middleware;

pub use client::{CachedResponse, RequestOptions, SecurityHttpClient};
pub use error::{HttpError, SecurityError};
pub use gateway::SecurityGateway;
pub use middleware::{AuthConfig, auth_middleware, context_middleware};
