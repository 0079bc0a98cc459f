//! Cache-aware gateway to the security service.
//!
//! Reads are cache-first: a hit returns without touching the network, a
//! miss goes through [`SecurityHttpClient`] (dedup and retry apply) and
//! the result is written back before returning. Failed fetches never
//! populate the cache.
//!
//! Writes go to the security service first, then invalidate the affected
//! cache entries instead of patching them in place: the identity record,
//! its role entry and every patient listing page. The remote mutation is
//! the durable truth; a stale survivor self-corrects at TTL expiry at
//! worst.

use std::sync::Arc;

use futures::future::join_all;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use url::Url;

use medrec_cache::CacheService;
use medrec_core::types::{MutationResponse, NewPatient, PatientState, PatientUpdate, SecurityUser, UserPage};

use crate::client::{RequestOptions, SecurityHttpClient};
use crate::error::{HttpError, SecurityError};

/// Role the security service assigns to patient identities.
const PATIENT_ROLE: &str = "PACIENTE";

/// Identity operations backed by the cache and the security service.
pub struct SecurityGateway {
    client: Arc<SecurityHttpClient>,
    cache: Arc<CacheService>,
    base_url: Url,
}

impl SecurityGateway {
    pub fn new(
        client: Arc<SecurityHttpClient>,
        cache: Arc<CacheService>,
        base_url: &str,
    ) -> Result<Self, SecurityError> {
        // A trailing slash keeps Url::join from replacing the last path
        // segment of the base.
        let normalized = if base_url.ends_with('/') {
            base_url.to_string()
        } else {
            format!("{base_url}/")
        };
        let base_url = Url::parse(&normalized)
            .map_err(|e| SecurityError::Http(HttpError::InvalidUrl(e.to_string())))?;

        Ok(Self {
            client,
            cache,
            base_url,
        })
    }

    /// Fetch one identity, cache-first. A 404 becomes
    /// [`SecurityError::NotFound`] and is never cached.
    pub async fn user_by_id(&self, user_id: &str) -> Result<SecurityUser, SecurityError> {
        if let Some(user) = self.cache.user_by_id(user_id) {
            tracing::debug!(user_id, "user served from cache");
            return Ok(user);
        }

        let url = self.endpoint(&format!("users/{user_id}"))?;
        let value = self
            .client
            .get(&url)
            .await
            .map_err(|e| Self::user_error(user_id, e))?;

        let user: SecurityUser = decode(&value)?;
        self.cache.set_user(&user);
        Ok(user)
    }

    /// Fetch one page of the patient listing, cache-first.
    pub async fn all_patients(&self, page: u32, limit: u32) -> Result<UserPage, SecurityError> {
        if let Some(cached) = self.cache.patient_page(page, limit) {
            tracing::debug!(page, limit, "patient page served from cache");
            return Ok(cached);
        }

        let url = self.endpoint("users")?;
        let options = RequestOptions::default()
            .param("role", PATIENT_ROLE)
            .param("page", page.to_string())
            .param("limit", limit.to_string());
        let value = self.client.get_with(&url, options).await?;

        let listing: UserPage = decode(&value)?;
        let listing = listing.normalized(page, limit);
        self.cache.set_patient_page(page, limit, &listing);
        Ok(listing)
    }

    /// Test whether a user carries a role, against the cached role list
    /// when present.
    pub async fn validate_role(&self, user_id: &str, role: &str) -> Result<bool, SecurityError> {
        if let Some(roles) = self.cache.user_roles(user_id) {
            return Ok(roles.iter().any(|r| r == role));
        }

        let url = self.endpoint(&format!("users/{user_id}/roles"))?;
        let value = self
            .client
            .get(&url)
            .await
            .map_err(|e| Self::user_error(user_id, e))?;

        let roles: Vec<String> = decode(&value)?;
        self.cache.set_user_roles(user_id, &roles);
        Ok(roles.iter().any(|r| r == role))
    }

    /// Register a patient at the security service, then drop every cached
    /// listing page.
    pub async fn create_patient(&self, patient: &NewPatient) -> Result<MutationResponse, SecurityError> {
        let url = self.endpoint("users")?;
        let body = encode(patient)?;
        let value = self.client.post(&url, body).await?;

        let evicted = self.cache.invalidate_patient_pages();
        tracing::debug!(evicted, "patient listing pages invalidated after create");
        Ok(mutation_response(&value))
    }

    /// Update a patient identity, then drop its record, role entry and
    /// every cached listing page.
    pub async fn update_patient(
        &self,
        user_id: &str,
        update: &PatientUpdate,
    ) -> Result<MutationResponse, SecurityError> {
        let url = self.endpoint(&format!("users/{user_id}"))?;
        let body = encode(update)?;
        let value = self
            .client
            .put(&url, body)
            .await
            .map_err(|e| Self::user_error(user_id, e))?;

        let evicted = self.cache.invalidate_user_data(user_id);
        tracing::debug!(user_id, evicted, "user data invalidated after update");
        Ok(mutation_response(&value))
    }

    /// Change a patient's account state. Same invalidation as an update.
    pub async fn update_patient_state(
        &self,
        user_id: &str,
        state: PatientState,
    ) -> Result<MutationResponse, SecurityError> {
        let url = self.endpoint(&format!("users/{user_id}/state"))?;
        let value = self
            .client
            .patch(&url, json!({ "state": state }))
            .await
            .map_err(|e| Self::user_error(user_id, e))?;

        let evicted = self.cache.invalidate_user_data(user_id);
        tracing::debug!(user_id, evicted, "user data invalidated after state change");
        Ok(mutation_response(&value))
    }

    /// Bulk identity enrichment for list endpoints.
    ///
    /// Partitions `ids` through the cache, fetches only the missing
    /// subset concurrently and lets [`user_by_id`](Self::user_by_id)
    /// backfill. Unresolvable ids are skipped rather than failing the
    /// whole batch.
    pub async fn users_by_ids(&self, ids: &[String]) -> Vec<SecurityUser> {
        let lookup = self.cache.get_users(ids);
        let mut found = lookup.found;

        if !lookup.missing.is_empty() {
            tracing::debug!(
                cached = found.len(),
                missing = lookup.missing.len(),
                "bulk user lookup"
            );

            let fetches = lookup.missing.iter().map(|id| self.user_by_id(id));
            for result in join_all(fetches).await {
                match result {
                    Ok(user) => found.push(user),
                    Err(e) => {
                        tracing::debug!(error = %e, "skipping unavailable user in bulk lookup");
                    }
                }
            }
        }

        found
    }

    fn endpoint(&self, path: &str) -> Result<String, SecurityError> {
        self.base_url
            .join(path)
            .map(|url| url.to_string())
            .map_err(|e| SecurityError::Http(HttpError::InvalidUrl(e.to_string())))
    }

    fn user_error(user_id: &str, err: HttpError) -> SecurityError {
        if err.is_not_found() {
            SecurityError::NotFound(user_id.to_string())
        } else {
            SecurityError::Http(err)
        }
    }
}

fn decode<T: DeserializeOwned>(value: &Value) -> Result<T, SecurityError> {
    serde_json::from_value(value.clone())
        .map_err(|e| SecurityError::Http(HttpError::Decode(e.to_string())))
}

fn encode<T: serde::Serialize>(value: &T) -> Result<Value, SecurityError> {
    serde_json::to_value(value).map_err(|e| SecurityError::Http(HttpError::Decode(e.to_string())))
}

/// Mutation bodies vary across security-service versions; an unexpected
/// shape degrades to an empty envelope rather than failing a mutation
/// that already committed remotely.
fn mutation_response(value: &Value) -> MutationResponse {
    if value.is_null() {
        return MutationResponse::default();
    }
    serde_json::from_value(value.clone()).unwrap_or_else(|e| {
        tracing::warn!(error = %e, "unrecognized mutation response shape");
        MutationResponse::default()
    })
}
