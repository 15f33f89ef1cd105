//! prefill-core - building blocks for CDS Hooks prefetch hydration and
//! CQL prepopulation.
//!
//! Everything here is synchronous and pure: token resolution, the hook
//! model, prefetch satisfaction, data-requirement extraction, ELM
//! attachment decoding, and bundle assembly. Network orchestration lives
//! in `prefill-client`.

pub mod bundle;
pub mod data_requirements;
pub mod elm;
pub mod error;
pub mod hook;
pub mod operation_outcome;
pub mod path;
pub mod prefetch;

pub use bundle::{is_reference, next_link, page_resources, resource_key, BundleCollector};
pub use data_requirements::needed_resource_types;
pub use elm::{decode_elm_attachment, elm_identifier_id, ELM_CONTENT_TYPE};
pub use error::{PrefillError, Result};
pub use hook::{
    EncounterStartHook, Hook, HookGenerator, HookKind, OrderSelectHook, OrderSignHook,
    PatientViewHook,
};
pub use operation_outcome::{IssueSeverity, OperationOutcome, OperationOutcomeIssue};
pub use path::{resolve_path, substitute_tokens};
pub use prefetch::{unfulfilled_keys, PrefetchTemplates};
