//! Shared foundation for the medrec patient-EHR core.
//!
//! This crate carries what every other medrec crate needs: the domain
//! types exchanged with the remote security service, the error taxonomy,
//! and the configuration surface (cache TTLs and capacities, HTTP client
//! tuning, security-service endpoint).

pub mod config;
pub mod error;
pub mod types;

pub use config::{CacheSettings, HttpSettings, MedrecSettings, NamespaceSettings, SecuritySettings};
pub use error::{CoreError, ErrorCategory, Result};
pub use types::{
    AuthClaims, DiagnosticPageFilter, MutationResponse, NewPatient, PageParams, PatientState,
    PatientUpdate, SecurityUser, UserPage,
};
