use crate::client::FhirRequest;
use crate::config::ClientConfig;
use crate::executor::FhirVersion;
use prefill_core::{
    next_link, page_resources, BundleCollector, OperationOutcome, PrefillError, Result,
};
use serde_json::Value;
use std::collections::BTreeSet;

/// Fetch every needed resource type and assemble the collection Bundle a
/// CQL execution runs against.
///
/// The Patient read is the mandatory anchor: its failure rejects the whole
/// build. Each remaining type is then fetched one at a time (bounded load
/// on the server; pagination bookkeeping stays simple), and a per-type
/// failure is logged and skipped — the bundle still resolves with
/// whatever could be fetched.
pub async fn build_populated_resource_bundle<C: FhirRequest + ?Sized>(
    client: &C,
    needed: &BTreeSet<String>,
    fhir_version: FhirVersion,
    patient_id: &str,
    order: &Value,
    config: &ClientConfig,
) -> Result<Value> {
    let patient = client
        .request(&format!("Patient/{}", patient_id))
        .await
        .map_err(|e| PrefillError::PatientRead {
            message: e.to_string(),
        })?;

    let mut collector = BundleCollector::new();
    collector.push(patient);

    for resource_type in needed {
        if resource_type == "Patient" {
            continue;
        }
        match fetch_resource_type(client, resource_type, fhir_version, patient_id, order, config)
            .await
        {
            Ok(resources) => {
                tracing::info!(
                    resource_type = %resource_type,
                    count = resources.len(),
                    "Fetched resources for CQL execution"
                );
                collector.extend(resources);
            }
            Err(e) => log_type_failure(resource_type, &e),
        }
    }

    Ok(collector.into_collection_bundle())
}

/// Per-type search strategy. Practitioner and Coverage data hang off the
/// order rather than the patient compartment; everything else is a
/// patient-scoped search.
async fn fetch_resource_type<C: FhirRequest + ?Sized>(
    client: &C,
    resource_type: &str,
    fhir_version: FhirVersion,
    patient_id: &str,
    order: &Value,
    config: &ClientConfig,
) -> Result<Vec<Value>> {
    match resource_type {
        "Practitioner" | "PractitionerRole" => fetch_order_performer(client, order).await,
        "Coverage" => fetch_order_coverage(client, fhir_version, order).await,
        "MedicationStatement" => fetch_medication_statements(client, patient_id, config).await,
        _ => search_patient_scoped(client, resource_type, patient_id, config).await,
    }
}

fn log_type_failure(resource_type: &str, error: &PrefillError) {
    let message = error.to_string();
    match OperationOutcome::from_error_text(&message) {
        Some(outcome) => tracing::warn!(
            resource_type,
            diagnostics = outcome.first_diagnostics().unwrap_or("(none)"),
            "Resource fetch failed, continuing without this type"
        ),
        None => tracing::warn!(
            resource_type,
            error = %message,
            "Resource fetch failed, continuing without this type"
        ),
    }
}

/// The ordering clinician, read directly via the order's performer or
/// requester reference. The field differs per order type.
async fn fetch_order_performer<C: FhirRequest + ?Sized>(
    client: &C,
    order: &Value,
) -> Result<Vec<Value>> {
    let Some(reference) = performer_reference(order) else {
        tracing::debug!("Order carries no performer reference");
        return Ok(Vec::new());
    };
    Ok(vec![client.request(reference).await?])
}

fn performer_reference(order: &Value) -> Option<&str> {
    let field = match order.get("resourceType")?.as_str()? {
        "DeviceRequest" | "ServiceRequest" => order.get("performer")?,
        "MedicationRequest" => order.get("requester")?,
        "MedicationDispense" => order.get("performer")?.as_array()?.first()?.get("actor")?,
        _ => return None,
    };
    first_reference(field)
}

/// A Reference field may be a single object or an array of them.
fn first_reference(field: &Value) -> Option<&str> {
    let reference = match field {
        Value::Array(items) => items.first()?.get("reference")?,
        other => other.get("reference")?,
    };
    reference.as_str()
}

/// The order's coverage, read directly. R4-era profiles put the reference
/// in `insurance`; the DSTU2-era profile used a coverage extension.
async fn fetch_order_coverage<C: FhirRequest + ?Sized>(
    client: &C,
    fhir_version: FhirVersion,
    order: &Value,
) -> Result<Vec<Value>> {
    let Some(reference) = coverage_reference(order, fhir_version) else {
        tracing::debug!("Order carries no coverage reference");
        return Ok(Vec::new());
    };
    Ok(vec![client.request(&reference).await?])
}

fn coverage_reference(order: &Value, fhir_version: FhirVersion) -> Option<String> {
    match fhir_version {
        FhirVersion::R4 => order
            .get("insurance")
            .and_then(first_reference)
            .map(str::to_string),
        _ => order
            .get("extension")?
            .as_array()?
            .iter()
            .find(|e| {
                e.get("url")
                    .and_then(Value::as_str)
                    .is_some_and(|u| u.contains("coverage"))
            })?
            .get("valueReference")?
            .get("reference")?
            .as_str()
            .map(str::to_string),
    }
}

/// Patient-scoped MedicationStatement search, plus resolution of each
/// statement's medicationReference so the executor sees the Medication
/// resources too. A reference that fails to resolve is logged and
/// skipped.
async fn fetch_medication_statements<C: FhirRequest + ?Sized>(
    client: &C,
    patient_id: &str,
    config: &ClientConfig,
) -> Result<Vec<Value>> {
    let mut resources =
        search_patient_scoped(client, "MedicationStatement", patient_id, config).await?;

    let references: Vec<String> = resources
        .iter()
        .filter_map(|statement| {
            statement
                .get("medicationReference")
                .and_then(|r| r.get("reference"))
                .and_then(Value::as_str)
                .map(str::to_string)
        })
        .collect();

    for reference in references {
        match client.request(&reference).await {
            Ok(medication) => resources.push(medication),
            Err(e) => {
                tracing::warn!(reference = %reference, error = %e, "Failed to resolve medicationReference")
            }
        }
    }
    Ok(resources)
}

async fn search_patient_scoped<C: FhirRequest + ?Sized>(
    client: &C,
    resource_type: &str,
    patient_id: &str,
    config: &ClientConfig,
) -> Result<Vec<Value>> {
    let mut query = format!(
        "{}?patient={}",
        resource_type,
        urlencoding::encode(patient_id)
    );
    if let Some(extra) = config.ehr.variant.extra_search_params(resource_type) {
        query.push('&');
        query.push_str(extra);
    }
    search_all_pages(client, query).await
}

/// Follow `next` links until the search set is exhausted, accumulating
/// every page's resources.
async fn search_all_pages<C: FhirRequest + ?Sized>(
    client: &C,
    first_query: String,
) -> Result<Vec<Value>> {
    let mut resources = Vec::new();
    let mut next = Some(first_query);

    while let Some(url) = next {
        let page = client.request(&url).await?;
        resources.extend(page_resources(&page));
        next = next_link(&page).map(str::to_string);
    }
    Ok(resources)
}
