use crate::client::FhirRequest;
use crate::config::ClientConfig;
use crate::populate::build_populated_resource_bundle;
use prefill_core::{elm_identifier_id, needed_resource_types, PrefillError, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::str::FromStr;

/// FHIR releases the pipeline knows about. The patient-data source only
/// exists for DSTU2 and R4; anything else is a hard failure, never a
/// fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FhirVersion {
    Dstu2,
    Stu3,
    R4,
}

impl FhirVersion {
    pub fn supports_patient_source(&self) -> bool {
        matches!(self, FhirVersion::Dstu2 | FhirVersion::R4)
    }

    pub fn as_str(&self) -> &str {
        match self {
            FhirVersion::Dstu2 => "1.0.2",
            FhirVersion::Stu3 => "3.0.1",
            FhirVersion::R4 => "4.0.1",
        }
    }
}

impl FromStr for FhirVersion {
    type Err = PrefillError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "1.0.2" | "DSTU2" | "dstu2" => Ok(FhirVersion::Dstu2),
            "3.0.1" | "STU3" | "stu3" => Ok(FhirVersion::Stu3),
            "4.0.0" | "4.0.1" | "R4" | "r4" => Ok(FhirVersion::R4),
            other => Err(PrefillError::UnsupportedFhirVersion(other.to_string())),
        }
    }
}

/// The external CQL execution capability.
///
/// Implementations wrap an actual CQL/ELM engine; the pipeline hands them
/// a library, the dependent libraries it may include, the value-set
/// database backing its code filters, a parameter object, and the patient
/// data bundle, and expects results keyed per patient id (or a flat
/// result set for single-patient sources).
pub trait CqlExecutor {
    fn execute(
        &self,
        library_elm: &Value,
        dependent_elms: &[Value],
        value_set_db: &Value,
        parameters: &Value,
        patient_bundle: &Value,
        fhir_version: FhirVersion,
    ) -> Result<Value>;
}

/// Everything `execute_elm` needs besides the network: the ELM to run,
/// the dependent ELMs it may include, the Library resources main ELMs
/// were decoded from (for their dataRequirement declarations), the
/// value-set database, and execution parameters.
#[derive(Debug, Clone)]
pub struct ExecutionInputs {
    pub elm: Value,
    pub dependent_elms: Vec<Value>,
    pub main_library_maps: HashMap<String, Value>,
    pub value_set_db: Value,
    pub parameters: Value,
}

#[derive(Debug)]
pub struct ElmResults {
    pub library_name: String,
    /// The collection bundle the execution ran against.
    pub bundle: Value,
    /// The single patient's result set.
    pub elm_results: Value,
}

/// Run one ELM library against freshly fetched patient data.
///
/// Computes the library's needed resource types, builds the populated
/// bundle (Patient-anchored, partial-failure tolerant), and invokes the
/// executor capability. Bundle-build failure and unsupported FHIR
/// versions are fatal.
pub async fn execute_elm<C, E>(
    client: &C,
    executor: &E,
    fhir_version: FhirVersion,
    patient_id: &str,
    order: &Value,
    inputs: &ExecutionInputs,
    config: &ClientConfig,
) -> Result<ElmResults>
where
    C: FhirRequest + ?Sized,
    E: CqlExecutor + ?Sized,
{
    if !fhir_version.supports_patient_source() {
        return Err(PrefillError::UnsupportedFhirVersion(
            fhir_version.as_str().to_string(),
        ));
    }

    let library_name = elm_identifier_id(&inputs.elm).unwrap_or("").to_string();
    let library_resource = inputs.main_library_maps.get(&library_name);
    let needed = needed_resource_types(library_resource, &config.cql.excluded_resource_types);

    tracing::info!(
        library = %library_name,
        needed = ?needed,
        "Executing ELM library"
    );

    let bundle = build_populated_resource_bundle(
        client,
        &needed,
        fhir_version,
        patient_id,
        order,
        config,
    )
    .await?;

    let results = executor.execute(
        &inputs.elm,
        &inputs.dependent_elms,
        &inputs.value_set_db,
        &inputs.parameters,
        &bundle,
        fhir_version,
    )?;

    // Results keyed per patient: take this patient's entry (or the first
    // one — single-patient sources only ever produce one).
    let elm_results = match &results {
        Value::Object(map) => map
            .get(patient_id)
            .cloned()
            .or_else(|| map.values().next().cloned())
            .unwrap_or(Value::Null),
        other => other.clone(),
    };

    Ok(ElmResults {
        library_name,
        bundle,
        elm_results,
    })
}
