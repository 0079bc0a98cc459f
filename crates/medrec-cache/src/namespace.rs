//! The fixed set of cache namespaces.
//!
//! The original design keyed caches by free-form strings; here the
//! namespaces are a closed enum so a typoed region name is a compile
//! error, and each variant carries its own TTL/capacity policy.

use medrec_core::config::{CacheSettings, NamespaceSettings};

/// A logically partitioned cache region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// Identity records fetched from the security service.
    Users,
    /// Paginated patient listings.
    Patients,
    /// Role lookups.
    Roles,
    /// Diagnostics, by id and as filtered pages.
    Diagnostics,
    /// Cross-entity relations of a patient.
    Relations,
    /// Documents, their version lists and individual versions.
    Documents,
    /// Medical histories, by id and as pages.
    MedicalHistories,
    /// Chronological patient timelines.
    Timelines,
}

impl Namespace {
    /// Every namespace, in store-index order.
    pub const ALL: [Namespace; 8] = [
        Namespace::Users,
        Namespace::Patients,
        Namespace::Roles,
        Namespace::Diagnostics,
        Namespace::Relations,
        Namespace::Documents,
        Namespace::MedicalHistories,
        Namespace::Timelines,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Users => "users",
            Self::Patients => "patients",
            Self::Roles => "roles",
            Self::Diagnostics => "diagnostics",
            Self::Relations => "relations",
            Self::Documents => "documents",
            Self::MedicalHistories => "medical_histories",
            Self::Timelines => "timelines",
        }
    }

    /// The TTL/capacity policy for this namespace under the given settings.
    pub fn settings(&self, config: &CacheSettings) -> NamespaceSettings {
        match self {
            Self::Users => config.users,
            Self::Patients => config.patients,
            Self::Roles => config.roles,
            Self::Diagnostics => config.diagnostics,
            Self::Relations => config.relations,
            Self::Documents => config.documents,
            Self::MedicalHistories => config.medical_histories,
            Self::Timelines => config.timelines,
        }
    }

    pub(crate) fn index(&self) -> usize {
        *self as usize
    }
}

impl std::fmt::Display for Namespace {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_covers_every_variant_once() {
        for (i, ns) in Namespace::ALL.iter().enumerate() {
            assert_eq!(ns.index(), i);
        }
    }

    #[test]
    fn test_settings_resolve_per_namespace() {
        let config = CacheSettings::default();
        assert_eq!(Namespace::Roles.settings(&config).ttl_secs, 600);
        assert_eq!(Namespace::Patients.settings(&config).max_entries, 100);
    }

    #[test]
    fn test_display_matches_as_str() {
        assert_eq!(Namespace::MedicalHistories.to_string(), "medical_histories");
    }
}
