//! Cache key construction.
//!
//! ## Key Format
//!
//! Keys are deterministic, human-readable composites embedding every
//! parameter that affects the result. Absent filters are rendered as a
//! literal `null` token so distinct filter combinations never collide:
//!
//! `patient:p1:diags:page:1:limit:20:state:null:from:null:to:null`
//!
//! Pattern builders return anchored regexes for fan-out invalidation of
//! whole key families (every page of one patient's diagnostics, every
//! patient listing page, …). Interpolated ids are regex-escaped.

use medrec_core::types::DiagnosticPageFilter;

pub fn user(id: &str) -> String {
    format!("user:{id}")
}

pub fn role(id: &str) -> String {
    format!("role:{id}")
}

pub fn patient_page(page: u32, limit: u32) -> String {
    format!("patients:page:{page}:limit:{limit}")
}

pub fn diagnostic(id: &str) -> String {
    format!("diagnostic:{id}")
}

pub fn patient_diagnostics(patient_id: &str) -> String {
    format!("patient:{patient_id}:diagnostics")
}

pub fn patient_diagnostics_page(
    patient_id: &str,
    page: u32,
    limit: u32,
    filter: &DiagnosticPageFilter,
) -> String {
    let state = filter.state.as_deref().unwrap_or("null");
    let from = filter.date_from.as_deref().unwrap_or("null");
    let to = filter.date_to.as_deref().unwrap_or("null");
    format!(
        "patient:{patient_id}:diags:page:{page}:limit:{limit}:state:{state}:from:{from}:to:{to}"
    )
}

pub fn patient_relation(patient_id: &str, relation_type: &str) -> String {
    format!("patient:{patient_id}:{relation_type}")
}

pub fn document(id: &str) -> String {
    format!("doc:{id}")
}

pub fn document_versions(id: &str) -> String {
    format!("doc:{id}:versions")
}

pub fn document_version(id: &str, version: u32) -> String {
    format!("doc:{id}:ver:{version}")
}

pub fn patient_documents(patient_id: &str) -> String {
    format!("patient:{patient_id}:documents")
}

pub fn medical_history(id: &str) -> String {
    format!("mh:{id}")
}

pub fn patient_medical_history_page(patient_id: &str, page: u32, limit: u32) -> String {
    format!("mh:patient:{patient_id}:page:{page}:limit:{limit}")
}

pub fn all_medical_histories_page(page: u32, limit: u32) -> String {
    format!("mh:all:page:{page}:limit:{limit}")
}

pub fn patient_timeline(patient_id: &str, page: u32, limit: u32) -> String {
    format!("timeline:{patient_id}:page:{page}:limit:{limit}")
}

/// Key for a `cached_get` response. Method-independent: only the URL and
/// the serialized query parameters identify the payload.
pub fn http_response(url: &str, serialized_params: &str) -> String {
    format!("http:{url}:{serialized_params}")
}

/// Anchored patterns for fan-out invalidation.
pub mod patterns {
    use regex::Regex;

    fn anchored(prefix: String) -> Regex {
        Regex::new(&format!("^{prefix}")).expect("anchored literal pattern")
    }

    /// Every cached patient listing page.
    pub fn patient_pages() -> Regex {
        anchored("patients:page:".to_string())
    }

    /// Every filtered/paginated diagnostics view of one patient.
    pub fn patient_diagnostics_pages(patient_id: &str) -> Regex {
        anchored(format!("patient:{}:diags:", regex::escape(patient_id)))
    }

    /// Every cached relation of one patient.
    pub fn patient_relations(patient_id: &str) -> Regex {
        anchored(format!("patient:{}:", regex::escape(patient_id)))
    }

    /// Every cached version of one document.
    pub fn document_versions(document_id: &str) -> Regex {
        anchored(format!("doc:{}:ver:", regex::escape(document_id)))
    }

    /// Every medical-history page of one patient.
    pub fn patient_medical_history_pages(patient_id: &str) -> Regex {
        anchored(format!("mh:patient:{}:page:", regex::escape(patient_id)))
    }

    /// Every page of the global medical-histories listing.
    pub fn all_medical_histories_pages() -> Regex {
        anchored("mh:all:page:".to_string())
    }

    /// Every timeline page of one patient.
    pub fn patient_timeline(patient_id: &str) -> Regex {
        anchored(format!("timeline:{}:page:", regex::escape(patient_id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unfiltered_diagnostics_page_renders_null_tokens() {
        let key = patient_diagnostics_page("p1", 1, 20, &DiagnosticPageFilter::default());
        assert_eq!(
            key,
            "patient:p1:diags:page:1:limit:20:state:null:from:null:to:null"
        );
    }

    #[test]
    fn test_distinct_filters_never_collide() {
        let base = DiagnosticPageFilter::default();
        let filtered = DiagnosticPageFilter {
            state: Some("ACTIVE".to_string()),
            ..Default::default()
        };
        let dated = DiagnosticPageFilter {
            date_from: Some("2024-01-01".to_string()),
            date_to: Some("2024-06-30".to_string()),
            ..Default::default()
        };

        let keys = [
            patient_diagnostics_page("p1", 1, 20, &base),
            patient_diagnostics_page("p1", 1, 20, &filtered),
            patient_diagnostics_page("p1", 1, 20, &dated),
            patient_diagnostics_page("p1", 2, 20, &base),
        ];
        for (i, a) in keys.iter().enumerate() {
            for b in keys.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_identical_params_always_hit_the_same_key() {
        let filter = DiagnosticPageFilter {
            state: Some("ACTIVE".to_string()),
            ..Default::default()
        };
        assert_eq!(
            patient_diagnostics_page("p1", 3, 10, &filter),
            patient_diagnostics_page("p1", 3, 10, &filter),
        );
    }

    #[test]
    fn test_patterns_match_their_key_family() {
        let re = patterns::patient_diagnostics_pages("p1");
        assert!(re.is_match(&patient_diagnostics_page(
            "p1",
            1,
            20,
            &DiagnosticPageFilter::default()
        )));
        assert!(!re.is_match(&patient_diagnostics_page(
            "p2",
            1,
            20,
            &DiagnosticPageFilter::default()
        )));
        assert!(!re.is_match(&patient_diagnostics("p1")));

        assert!(patterns::patient_pages().is_match(&patient_page(4, 50)));
        assert!(patterns::document_versions("d1").is_match(&document_version("d1", 2)));
        assert!(!patterns::document_versions("d1").is_match(&document_versions("d1")));
        assert!(patterns::patient_timeline("p1").is_match(&patient_timeline("p1", 1, 10)));
    }

    #[test]
    fn test_pattern_ids_are_escaped() {
        // A dot in an id must not act as a regex wildcard.
        let re = patterns::patient_timeline("p.1");
        assert!(re.is_match(&patient_timeline("p.1", 1, 10)));
        assert!(!re.is_match(&patient_timeline("pX1", 1, 10)));
    }
}
