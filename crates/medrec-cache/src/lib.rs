//! Multi-namespace caching layer for the medrec patient-EHR core.
//!
//! ## Architecture
//!
//! - **Namespaces**: a fixed, enumerated set of cache regions, one per
//!   entity kind, each with its own TTL and capacity policy
//! - **Stores**: one bounded DashMap-backed TTL store per namespace
//! - **Service**: the injected facade exposing raw and typed accessors
//! - **Invalidation**: conservative fan-out eviction after local writes
//!
//! ## Lookup flow
//!
//! ```text
//! caller → CacheService → NamespaceStore → hit (Arc clone, <1µs)
//!                                    ↓
//!                                  miss → origin (security service / DB)
//! ```
//!
//! The cache is best-effort: a read or write failure here never prevents
//! the underlying operation from completing. The origin stays
//! authoritative; stale entries self-correct at TTL expiry at worst.

pub mod invalidation;
pub mod keys;
pub mod namespace;
pub mod service;
pub mod store;

pub use invalidation::InvalidationCoordinator;
pub use namespace::Namespace;
pub use service::{CacheService, UserLookup};
pub use store::{CacheStats, NamespaceStore};
