//! Fan-out invalidation after local writes.
//!
//! Repositories call into this coordinator once a write is durably
//! committed, never before: a failed write must not evict entries that are
//! still valid. Each fan-out evicts the entity's own entry, every
//! paginated/filtered view of its parent patient's collection, and the
//! patient timeline. The fan-out is deliberately conservative; a stale
//! read in a medical-record system is a correctness risk, so evicting too
//! much beats evicting too little.
//!
//! Eviction is pure in-memory work and cannot fail, which keeps the
//! propagation policy simple: invalidation never aborts a successful write.

use std::sync::Arc;

use crate::keys;
use crate::namespace::Namespace;
use crate::service::CacheService;

/// Evicts dependent cache entries after local mutations.
pub struct InvalidationCoordinator {
    cache: Arc<CacheService>,
}

impl InvalidationCoordinator {
    pub fn new(cache: Arc<CacheService>) -> Self {
        Self { cache }
    }

    /// Full fan-out for a created or updated diagnostic.
    pub fn diagnostic_written(&self, patient_id: &str, diagnostic_id: &str) -> usize {
        let mut evicted = self.invalidate_diagnostic(diagnostic_id);
        evicted += self.invalidate_all_patient_diagnostics(patient_id);
        evicted += usize::from(
            self.cache
                .delete(Namespace::Diagnostics, &keys::patient_diagnostics(patient_id)),
        );
        evicted += self.invalidate_patient_timeline(patient_id);
        tracing::debug!(patient_id, diagnostic_id, evicted, "diagnostic write fan-out");
        evicted
    }

    /// Full fan-out for a created, updated or re-versioned document.
    pub fn document_written(&self, patient_id: &str, document_id: &str) -> usize {
        let mut evicted = self.invalidate_document(document_id);
        evicted += self.invalidate_patient_documents(patient_id);
        evicted += self.invalidate_patient_timeline(patient_id);
        tracing::debug!(patient_id, document_id, evicted, "document write fan-out");
        evicted
    }

    /// Full fan-out for a changed medical-history record.
    pub fn medical_history_written(&self, patient_id: &str, medical_history_id: &str) -> usize {
        let mut evicted = usize::from(self.cache.delete(
            Namespace::MedicalHistories,
            &keys::medical_history(medical_history_id),
        ));
        evicted += self.invalidate_patient_medical_history(patient_id);
        evicted += self.invalidate_all_medical_histories_pages();
        evicted += self.invalidate_patient_timeline(patient_id);
        tracing::debug!(patient_id, medical_history_id, evicted, "medical history write fan-out");
        evicted
    }

    /// Evict one diagnostic's direct entry.
    pub fn invalidate_diagnostic(&self, diagnostic_id: &str) -> usize {
        usize::from(
            self.cache
                .delete(Namespace::Diagnostics, &keys::diagnostic(diagnostic_id)),
        )
    }

    /// Evict every filtered/paginated diagnostics view of one patient.
    pub fn invalidate_all_patient_diagnostics(&self, patient_id: &str) -> usize {
        self.cache.delete_pattern(
            Namespace::Diagnostics,
            &keys::patterns::patient_diagnostics_pages(patient_id),
        )
    }

    /// Evict every medical-history page of one patient.
    pub fn invalidate_patient_medical_history(&self, patient_id: &str) -> usize {
        self.cache.delete_pattern(
            Namespace::MedicalHistories,
            &keys::patterns::patient_medical_history_pages(patient_id),
        )
    }

    /// Evict every page of the global medical-histories listing.
    pub fn invalidate_all_medical_histories_pages(&self) -> usize {
        self.cache.delete_pattern(
            Namespace::MedicalHistories,
            &keys::patterns::all_medical_histories_pages(),
        )
    }

    /// Evict every timeline page of one patient. The timeline aggregates
    /// diagnostics and documents chronologically, so any write under the
    /// patient may reorder or extend it.
    pub fn invalidate_patient_timeline(&self, patient_id: &str) -> usize {
        self.cache.delete_pattern(
            Namespace::Timelines,
            &keys::patterns::patient_timeline(patient_id),
        )
    }

    /// Evict one document, its versions list and every cached version.
    pub fn invalidate_document(&self, document_id: &str) -> usize {
        let mut evicted = usize::from(
            self.cache
                .delete(Namespace::Documents, &keys::document(document_id)),
        );
        evicted += usize::from(
            self.cache
                .delete(Namespace::Documents, &keys::document_versions(document_id)),
        );
        evicted += self.cache.delete_pattern(
            Namespace::Documents,
            &keys::patterns::document_versions(document_id),
        );
        evicted
    }

    /// Evict one patient's document list.
    pub fn invalidate_patient_documents(&self, patient_id: &str) -> usize {
        usize::from(
            self.cache
                .delete(Namespace::Documents, &keys::patient_documents(patient_id)),
        )
    }

    /// Evict every cached relation of one patient.
    pub fn invalidate_patient_relations(&self, patient_id: &str) -> usize {
        self.cache.delete_pattern(
            Namespace::Relations,
            &keys::patterns::patient_relations(patient_id),
        )
    }

    /// Evict one identity's record, role entry and every patient page.
    pub fn invalidate_user_data(&self, user_id: &str) -> usize {
        self.cache.invalidate_user_data(user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use medrec_core::types::DiagnosticPageFilter;
    use serde_json::json;

    fn setup() -> (Arc<CacheService>, InvalidationCoordinator) {
        let cache = Arc::new(CacheService::default());
        let coordinator = InvalidationCoordinator::new(Arc::clone(&cache));
        (cache, coordinator)
    }

    #[test]
    fn test_diagnostics_fanout_is_total() {
        let (cache, coordinator) = setup();
        let unfiltered = DiagnosticPageFilter::default();
        let filtered = DiagnosticPageFilter {
            state: Some("ACTIVE".to_string()),
            date_from: Some("2024-01-01".to_string()),
            ..Default::default()
        };

        cache.set_diagnostic("d1", Arc::new(json!({"id": "d1"})));
        cache.set_patient_diagnostics("p1", Arc::new(json!(["d1"])));
        cache.set_patient_diagnostics_page("p1", 1, 20, &unfiltered, Arc::new(json!(["d1"])));
        cache.set_patient_diagnostics_page("p1", 2, 20, &unfiltered, Arc::new(json!([])));
        cache.set_patient_diagnostics_page("p1", 1, 20, &filtered, Arc::new(json!(["d1"])));
        cache.set_patient_timeline("p1", 1, 10, Arc::new(json!(["event"])));
        // Another patient's entries must survive.
        cache.set_patient_diagnostics_page("p2", 1, 20, &unfiltered, Arc::new(json!([])));

        let evicted = coordinator.diagnostic_written("p1", "d1");

        assert_eq!(evicted, 6);
        assert!(cache.diagnostic_by_id("d1").is_none());
        assert!(cache.patient_diagnostics("p1").is_none());
        assert!(cache.patient_diagnostics_page("p1", 1, 20, &unfiltered).is_none());
        assert!(cache.patient_diagnostics_page("p1", 2, 20, &unfiltered).is_none());
        assert!(cache.patient_diagnostics_page("p1", 1, 20, &filtered).is_none());
        assert!(cache.patient_timeline("p1", 1, 10).is_none());
        assert!(cache.patient_diagnostics_page("p2", 1, 20, &unfiltered).is_some());
    }

    #[test]
    fn test_invalidate_all_patient_diagnostics_forces_fresh_read() {
        let (cache, coordinator) = setup();
        let filter = DiagnosticPageFilter::default();
        cache.set_patient_diagnostics_page("p1", 1, 20, &filter, Arc::new(json!(["stale"])));

        assert_eq!(coordinator.invalidate_all_patient_diagnostics("p1"), 1);
        assert!(cache.patient_diagnostics_page("p1", 1, 20, &filter).is_none());
    }

    #[test]
    fn test_document_fanout_covers_versions() {
        let (cache, coordinator) = setup();
        cache.set_document("d1", Arc::new(json!({"id": "d1"})));
        cache.set_document_versions("d1", Arc::new(json!([1, 2])));
        cache.set_document_version("d1", 1, Arc::new(json!({"ver": 1})));
        cache.set_document_version("d1", 2, Arc::new(json!({"ver": 2})));
        cache.set_patient_documents("p1", Arc::new(json!(["d1"])));
        cache.set_patient_timeline("p1", 1, 10, Arc::new(json!(["event"])));

        let evicted = coordinator.document_written("p1", "d1");

        assert_eq!(evicted, 6);
        assert!(cache.document_by_id("d1").is_none());
        assert!(cache.document_versions("d1").is_none());
        assert!(cache.document_version("d1", 1).is_none());
        assert!(cache.patient_documents("p1").is_none());
        assert!(cache.patient_timeline("p1", 1, 10).is_none());
    }

    #[test]
    fn test_medical_history_fanout_covers_global_pages() {
        let (cache, coordinator) = setup();
        cache.set_medical_history("mh1", Arc::new(json!({"id": "mh1"})));
        cache.set_patient_medical_history_page("p1", 1, 10, Arc::new(json!([])));
        cache.set_all_medical_histories_page(1, 10, Arc::new(json!([])));
        cache.set_all_medical_histories_page(2, 10, Arc::new(json!([])));
        cache.set_patient_timeline("p1", 1, 10, Arc::new(json!([])));

        let evicted = coordinator.medical_history_written("p1", "mh1");

        assert_eq!(evicted, 5);
        assert!(cache.medical_history_by_id("mh1").is_none());
        assert!(cache.patient_medical_history_page("p1", 1, 10).is_none());
        assert!(cache.all_medical_histories_page(1, 10).is_none());
        assert!(cache.all_medical_histories_page(2, 10).is_none());
    }

    #[test]
    fn test_patient_relations_eviction() {
        let (cache, coordinator) = setup();
        cache.set_patient_relation("p1", "allergies", Arc::new(json!([])));
        cache.set_patient_relation("p1", "contacts", Arc::new(json!([])));
        cache.set_patient_relation("p2", "allergies", Arc::new(json!([])));

        assert_eq!(coordinator.invalidate_patient_relations("p1"), 2);
        assert!(cache.patient_relation("p2", "allergies").is_some());
    }

    #[test]
    fn test_fanout_on_empty_cache_evicts_nothing() {
        let (_, coordinator) = setup();
        assert_eq!(coordinator.diagnostic_written("p1", "d1"), 0);
        assert_eq!(coordinator.medical_history_written("p1", "mh1"), 0);
    }
}
