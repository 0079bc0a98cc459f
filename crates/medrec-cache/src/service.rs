//! The injected cache facade.
//!
//! `CacheService` owns one [`NamespaceStore`] per [`Namespace`] and exposes
//! both a raw surface (`get`/`set`/`delete`/`delete_pattern`/`flush`) and
//! typed per-entity helpers whose key shapes live in [`crate::keys`].
//!
//! The service is constructed explicitly and shared via `Arc`; tests build
//! isolated instances instead of reaching for a global.

use std::sync::Arc;
use std::time::Duration;

use regex::Regex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use medrec_core::config::CacheSettings;
use medrec_core::types::{DiagnosticPageFilter, SecurityUser, UserPage};

use crate::keys;
use crate::namespace::Namespace;
use crate::store::{CacheStats, NamespaceStore};

/// Result of a bulk user lookup: the users already cached and the ids the
/// caller still has to fetch from the origin.
#[derive(Debug, Default)]
pub struct UserLookup {
    pub found: Vec<SecurityUser>,
    pub missing: Vec<String>,
}

/// Multi-namespace TTL cache for the medrec core.
pub struct CacheService {
    stores: [NamespaceStore; 8],
}

impl CacheService {
    pub fn new(config: &CacheSettings) -> Self {
        let stores = Namespace::ALL.map(|ns| {
            let settings = ns.settings(config);
            NamespaceStore::new(settings.ttl(), settings.max_entries)
        });
        Self { stores }
    }

    fn store(&self, namespace: Namespace) -> &NamespaceStore {
        &self.stores[namespace.index()]
    }

    /// Get a raw value. `None` means missing or expired.
    pub fn get(&self, namespace: Namespace, key: &str) -> Option<Arc<Value>> {
        self.store(namespace).get(key)
    }

    /// Insert or overwrite a raw value. `ttl` overrides the namespace
    /// default for this entry only; overwrites reset the TTL clock.
    pub fn set(&self, namespace: Namespace, key: &str, value: Arc<Value>, ttl: Option<Duration>) {
        match ttl {
            Some(ttl) => self.store(namespace).set_with_ttl(key, value, ttl),
            None => self.store(namespace).set(key, value),
        }
    }

    /// Remove a single key. Returns `true` if it was present.
    pub fn delete(&self, namespace: Namespace, key: &str) -> bool {
        self.store(namespace).remove(key)
    }

    /// Remove every key in the namespace matching the pattern.
    pub fn delete_pattern(&self, namespace: Namespace, pattern: &Regex) -> usize {
        let removed = self.store(namespace).remove_pattern(pattern);
        if removed > 0 {
            tracing::debug!(namespace = %namespace, pattern = %pattern, removed, "pattern eviction");
        }
        removed
    }

    /// Drop every entry in one namespace.
    pub fn flush(&self, namespace: Namespace) -> usize {
        self.store(namespace).flush()
    }

    /// Drop every entry in every namespace. Returns the total removed.
    pub fn flush_all(&self) -> usize {
        Namespace::ALL.iter().map(|ns| self.flush(*ns)).sum()
    }

    pub fn stats(&self, namespace: Namespace) -> CacheStats {
        self.store(namespace).stats()
    }

    pub fn all_stats(&self) -> Vec<(Namespace, CacheStats)> {
        Namespace::ALL.iter().map(|ns| (*ns, self.stats(*ns))).collect()
    }

    /// Remove expired entries from every namespace eagerly.
    pub fn cleanup_expired(&self) -> usize {
        Namespace::ALL
            .iter()
            .map(|ns| self.store(*ns).cleanup_expired())
            .sum()
    }

    // ------------------------------------------------------------------
    // Typed accessors
    // ------------------------------------------------------------------

    /// Get and deserialize a cached value. A value that no longer matches
    /// the expected shape is evicted and reported as a miss; the caller
    /// falls back to the origin.
    pub fn get_json<T: DeserializeOwned>(&self, namespace: Namespace, key: &str) -> Option<T> {
        let value = self.get(namespace, key)?;
        match serde_json::from_value((*value).clone()) {
            Ok(decoded) => Some(decoded),
            Err(e) => {
                tracing::warn!(namespace = %namespace, key = %key, error = %e, "failed to deserialize cached value");
                self.delete(namespace, key);
                None
            }
        }
    }

    /// Serialize and store a value. A serialization failure is logged and
    /// skipped; the cache is best-effort and must never fail the caller.
    pub fn set_json<T: Serialize>(
        &self,
        namespace: Namespace,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) {
        match serde_json::to_value(value) {
            Ok(encoded) => self.set(namespace, key, Arc::new(encoded), ttl),
            Err(e) => {
                tracing::warn!(namespace = %namespace, key = %key, error = %e, "failed to serialize value for cache");
            }
        }
    }

    // ------------------------------------------------------------------
    // Users and roles
    // ------------------------------------------------------------------

    pub fn user_by_id(&self, user_id: &str) -> Option<SecurityUser> {
        self.get_json(Namespace::Users, &keys::user(user_id))
    }

    /// Cache an identity record, mirroring its role into the roles
    /// namespace when present.
    pub fn set_user(&self, user: &SecurityUser) {
        self.set_json(Namespace::Users, &keys::user(&user.id), user, None);
        if let Some(role) = &user.role {
            self.set_user_roles(&user.id, std::slice::from_ref(role));
        }
    }

    pub fn invalidate_user(&self, user_id: &str) -> bool {
        self.delete(Namespace::Users, &keys::user(user_id))
    }

    pub fn user_roles(&self, user_id: &str) -> Option<Vec<String>> {
        self.get_json(Namespace::Roles, &keys::role(user_id))
    }

    pub fn set_user_roles(&self, user_id: &str, roles: &[String]) {
        self.set_json(Namespace::Roles, &keys::role(user_id), &roles, None);
    }

    pub fn invalidate_user_role(&self, user_id: &str) -> bool {
        self.delete(Namespace::Roles, &keys::role(user_id))
    }

    /// Evict everything derived from one identity: the record itself, its
    /// role entry and every patient listing page.
    pub fn invalidate_user_data(&self, user_id: &str) -> usize {
        let mut evicted = usize::from(self.invalidate_user(user_id));
        evicted += usize::from(self.invalidate_user_role(user_id));
        evicted += self.invalidate_patient_pages();
        evicted
    }

    // ------------------------------------------------------------------
    // Patient listing pages
    // ------------------------------------------------------------------

    pub fn patient_page(&self, page: u32, limit: u32) -> Option<UserPage> {
        self.get_json(Namespace::Patients, &keys::patient_page(page, limit))
    }

    pub fn set_patient_page(&self, page: u32, limit: u32, data: &UserPage) {
        self.set_json(Namespace::Patients, &keys::patient_page(page, limit), data, None);
    }

    /// Evict every cached patient listing page. A mutation anywhere in the
    /// patient set can change the contents of any page.
    pub fn invalidate_patient_pages(&self) -> usize {
        self.delete_pattern(Namespace::Patients, &keys::patterns::patient_pages())
    }

    // ------------------------------------------------------------------
    // Diagnostics
    // ------------------------------------------------------------------

    pub fn diagnostic_by_id(&self, diagnostic_id: &str) -> Option<Arc<Value>> {
        self.get(Namespace::Diagnostics, &keys::diagnostic(diagnostic_id))
    }

    pub fn set_diagnostic(&self, diagnostic_id: &str, data: Arc<Value>) {
        self.set(Namespace::Diagnostics, &keys::diagnostic(diagnostic_id), data, None);
    }

    pub fn patient_diagnostics(&self, patient_id: &str) -> Option<Arc<Value>> {
        self.get(Namespace::Diagnostics, &keys::patient_diagnostics(patient_id))
    }

    pub fn set_patient_diagnostics(&self, patient_id: &str, data: Arc<Value>) {
        self.set(
            Namespace::Diagnostics,
            &keys::patient_diagnostics(patient_id),
            data,
            None,
        );
    }

    pub fn patient_diagnostics_page(
        &self,
        patient_id: &str,
        page: u32,
        limit: u32,
        filter: &DiagnosticPageFilter,
    ) -> Option<Arc<Value>> {
        self.get(
            Namespace::Diagnostics,
            &keys::patient_diagnostics_page(patient_id, page, limit, filter),
        )
    }

    pub fn set_patient_diagnostics_page(
        &self,
        patient_id: &str,
        page: u32,
        limit: u32,
        filter: &DiagnosticPageFilter,
        data: Arc<Value>,
    ) {
        self.set(
            Namespace::Diagnostics,
            &keys::patient_diagnostics_page(patient_id, page, limit, filter),
            data,
            None,
        );
    }

    // ------------------------------------------------------------------
    // Relations
    // ------------------------------------------------------------------

    pub fn patient_relation(&self, patient_id: &str, relation_type: &str) -> Option<Arc<Value>> {
        self.get(
            Namespace::Relations,
            &keys::patient_relation(patient_id, relation_type),
        )
    }

    pub fn set_patient_relation(&self, patient_id: &str, relation_type: &str, data: Arc<Value>) {
        self.set(
            Namespace::Relations,
            &keys::patient_relation(patient_id, relation_type),
            data,
            None,
        );
    }

    // ------------------------------------------------------------------
    // Documents
    // ------------------------------------------------------------------

    pub fn document_by_id(&self, document_id: &str) -> Option<Arc<Value>> {
        self.get(Namespace::Documents, &keys::document(document_id))
    }

    pub fn set_document(&self, document_id: &str, data: Arc<Value>) {
        self.set(Namespace::Documents, &keys::document(document_id), data, None);
    }

    pub fn document_versions(&self, document_id: &str) -> Option<Arc<Value>> {
        self.get(Namespace::Documents, &keys::document_versions(document_id))
    }

    pub fn set_document_versions(&self, document_id: &str, versions: Arc<Value>) {
        self.set(
            Namespace::Documents,
            &keys::document_versions(document_id),
            versions,
            None,
        );
    }

    pub fn document_version(&self, document_id: &str, version: u32) -> Option<Arc<Value>> {
        self.get(
            Namespace::Documents,
            &keys::document_version(document_id, version),
        )
    }

    pub fn set_document_version(&self, document_id: &str, version: u32, data: Arc<Value>) {
        self.set(
            Namespace::Documents,
            &keys::document_version(document_id, version),
            data,
            None,
        );
    }

    pub fn patient_documents(&self, patient_id: &str) -> Option<Arc<Value>> {
        self.get(Namespace::Documents, &keys::patient_documents(patient_id))
    }

    pub fn set_patient_documents(&self, patient_id: &str, docs: Arc<Value>) {
        self.set(
            Namespace::Documents,
            &keys::patient_documents(patient_id),
            docs,
            None,
        );
    }

    // ------------------------------------------------------------------
    // Medical histories
    // ------------------------------------------------------------------

    pub fn medical_history_by_id(&self, medical_history_id: &str) -> Option<Arc<Value>> {
        self.get(
            Namespace::MedicalHistories,
            &keys::medical_history(medical_history_id),
        )
    }

    pub fn set_medical_history(&self, medical_history_id: &str, data: Arc<Value>) {
        self.set(
            Namespace::MedicalHistories,
            &keys::medical_history(medical_history_id),
            data,
            None,
        );
    }

    pub fn patient_medical_history_page(
        &self,
        patient_id: &str,
        page: u32,
        limit: u32,
    ) -> Option<Arc<Value>> {
        self.get(
            Namespace::MedicalHistories,
            &keys::patient_medical_history_page(patient_id, page, limit),
        )
    }

    pub fn set_patient_medical_history_page(
        &self,
        patient_id: &str,
        page: u32,
        limit: u32,
        data: Arc<Value>,
    ) {
        self.set(
            Namespace::MedicalHistories,
            &keys::patient_medical_history_page(patient_id, page, limit),
            data,
            None,
        );
    }

    pub fn all_medical_histories_page(&self, page: u32, limit: u32) -> Option<Arc<Value>> {
        self.get(
            Namespace::MedicalHistories,
            &keys::all_medical_histories_page(page, limit),
        )
    }

    pub fn set_all_medical_histories_page(&self, page: u32, limit: u32, data: Arc<Value>) {
        self.set(
            Namespace::MedicalHistories,
            &keys::all_medical_histories_page(page, limit),
            data,
            None,
        );
    }

    // ------------------------------------------------------------------
    // Timelines
    // ------------------------------------------------------------------

    pub fn patient_timeline(&self, patient_id: &str, page: u32, limit: u32) -> Option<Arc<Value>> {
        self.get(
            Namespace::Timelines,
            &keys::patient_timeline(patient_id, page, limit),
        )
    }

    pub fn set_patient_timeline(&self, patient_id: &str, page: u32, limit: u32, data: Arc<Value>) {
        self.set(
            Namespace::Timelines,
            &keys::patient_timeline(patient_id, page, limit),
            data,
            None,
        );
    }

    // ------------------------------------------------------------------
    // Bulk user helpers
    // ------------------------------------------------------------------

    /// Cache a batch of identity records. Returns the number cached.
    pub fn set_users(&self, users: &[SecurityUser]) -> usize {
        let mut count = 0;
        for user in users {
            if user.id.is_empty() {
                continue;
            }
            self.set_user(user);
            count += 1;
        }
        count
    }

    /// Partition a list of ids into cached users and missing ids, so batch
    /// callers fetch only the missing subset from the origin and backfill.
    pub fn get_users(&self, user_ids: &[String]) -> UserLookup {
        let mut lookup = UserLookup::default();
        for id in user_ids {
            match self.user_by_id(id) {
                Some(user) => lookup.found.push(user),
                None => lookup.missing.push(id.clone()),
            }
        }
        lookup
    }
}

impl Default for CacheService {
    fn default() -> Self {
        Self::new(&CacheSettings::default())
    }
}
