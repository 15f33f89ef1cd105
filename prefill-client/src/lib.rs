//! prefill-client - async orchestration for CDS Hooks prefetch hydration
//! and CQL-driven questionnaire prepopulation.
//!
//! The pipeline: a hook generator builds a hook, `hydrate` fills its
//! prefetch from the FHIR server, `fetch_artifacts` pulls the
//! questionnaire package and classifies its libraries, and `execute_elm`
//! fetches each library's data requirements and runs the CQL executor
//! against the assembled bundle.

pub mod artifacts;
pub mod client;
pub mod config;
pub mod executor;
pub mod hydrate;
pub mod populate;
#[cfg(test)]
mod testutil;

pub use artifacts::{
    fetch_artifacts, fetch_from_questionnaire_response, search_by_order, ArtifactBundle,
    RelaunchContext,
};
pub use client::{FhirRequest, HttpFhirClient};
pub use config::{ClientConfig, EhrVariant};
pub use executor::{execute_elm, CqlExecutor, ElmResults, ExecutionInputs, FhirVersion};
pub use hydrate::hydrate;
pub use populate::build_populated_resource_bundle;
