use crate::client::FhirRequest;
use prefill_core::{
    decode_elm_attachment, elm_identifier_id, is_reference, page_resources, PrefillError, Result,
    ELM_CONTENT_TYPE,
};
use serde_json::{json, Map, Value};
use std::collections::HashMap;

const CQF_LIBRARY_EXT: &str = "cqf-library";
const INITIAL_EXPRESSION_EXT: &str = "sdc-questionnaire-initialExpression";

/// Everything the $questionnaire-package operation yields, sorted into
/// typed buckets ready for CQL execution.
#[derive(Debug, Default)]
pub struct ArtifactBundle {
    pub questionnaire: Value,
    pub order: Value,
    /// ELM documents of the libraries the Questionnaire names via its
    /// cqf-library extensions, plus any embedded per-item libraries.
    pub main_library_elms: Vec<Value>,
    pub dependent_elms: Vec<Value>,
    pub value_sets: Vec<Value>,
    /// ELM library id → the Library resource it was decoded from.
    pub main_library_maps: HashMap<String, Value>,
}

/// Relaunch context reconstructed from a prior QuestionnaireResponse.
#[derive(Debug)]
pub struct RelaunchContext {
    pub order_ref: Option<String>,
    pub coverage_ref: Option<String>,
    pub questionnaire: Option<String>,
    pub response: Value,
}

/// Fetch the order, coverage, and questionnaire package, then classify
/// every artifact the package carries.
///
/// `order` may be a literal reference (`MedicationRequest/123`) or an
/// inline serialized resource. Any fetch or parse failure rejects the
/// whole call; the artifact set is all-or-nothing.
pub async fn fetch_artifacts<C: FhirRequest + ?Sized>(
    client: &C,
    order: &str,
    coverage_ref: &str,
    questionnaire_url: &str,
    contained_questionnaire: Option<Value>,
) -> Result<ArtifactBundle> {
    let order = if is_reference(order) {
        client.request(order).await?
    } else {
        serde_json::from_str(order)?
    };

    let coverage = client.request(coverage_ref).await?;

    let parameters = json!({
        "resourceType": "Parameters",
        "parameter": [
            {"name": "order", "resource": order.clone()},
            {"name": "coverage", "resource": coverage},
        ]
    });
    let operation_url = format!(
        "{}/$questionnaire-package",
        questionnaire_url.trim_end_matches('/')
    );
    tracing::info!(url = %operation_url, "Requesting questionnaire package");
    let package = client.post(&operation_url, &parameters).await?;

    let bundle = package
        .get("parameter")
        .and_then(Value::as_array)
        .and_then(|params| params.first())
        .and_then(|p| p.get("resource"))
        .cloned()
        .ok_or_else(|| PrefillError::MissingArtifact {
            what: "package bundle".to_string(),
        })?;

    let entries = page_resources(&bundle);

    let questionnaire = contained_questionnaire
        .or_else(|| {
            entries
                .iter()
                .find(|r| r.get("resourceType").and_then(Value::as_str) == Some("Questionnaire"))
                .cloned()
        })
        .ok_or_else(|| PrefillError::MissingArtifact {
            what: "Questionnaire".to_string(),
        })?;

    let main_refs = cqf_library_refs(&questionnaire);
    let mut result = ArtifactBundle {
        questionnaire,
        order,
        ..ArtifactBundle::default()
    };

    for resource in entries {
        match resource.get("resourceType").and_then(Value::as_str) {
            Some("Library") => classify_library(resource, &main_refs, &mut result)?,
            Some("ValueSet") => result.value_sets.push(resource),
            _ => {}
        }
    }

    if let Some(items) = result.questionnaire.get("item").and_then(Value::as_array) {
        let embedded = collect_embedded_cql(items)?;
        result.main_library_elms.extend(embedded);
    }

    tracing::info!(
        main = result.main_library_elms.len(),
        dependent = result.dependent_elms.len(),
        value_sets = result.value_sets.len(),
        "Questionnaire package classified"
    );
    Ok(result)
}

/// Canonical URLs of the questionnaire's cqf-library extensions.
fn cqf_library_refs(questionnaire: &Value) -> Vec<String> {
    questionnaire
        .get("extension")
        .and_then(Value::as_array)
        .map(|exts| {
            exts.iter()
                .filter(|e| {
                    e.get("url")
                        .and_then(Value::as_str)
                        .is_some_and(|u| u.ends_with(CQF_LIBRARY_EXT))
                })
                .filter_map(|e| {
                    e.get("valueCanonical")
                        .or_else(|| e.get("valueReference").and_then(|r| r.get("reference")))
                        .and_then(Value::as_str)
                })
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// A Library whose canonical URL matches a cqf-library reference is a
/// "main" library (indexed by its ELM identifier); everything else the
/// package shipped is a dependency.
fn classify_library(
    resource: Value,
    main_refs: &[String],
    result: &mut ArtifactBundle,
) -> Result<()> {
    let Some(elm) = decode_elm_attachment(&resource)? else {
        tracing::warn!(
            id = resource.get("id").and_then(serde_json::Value::as_str).unwrap_or("?"),
            "Library carries no ELM attachment, skipping"
        );
        return Ok(());
    };

    let url = resource.get("url").and_then(Value::as_str).unwrap_or("");
    if main_refs.iter().any(|r| r == url) {
        if let Some(id) = elm_identifier_id(&elm) {
            result.main_library_maps.insert(id.to_string(), resource);
        }
        result.main_library_elms.push(elm);
    } else {
        result.dependent_elms.push(elm);
    }
    Ok(())
}

/// Recursively scan questionnaire items for initialExpression extensions
/// carrying inline ELM. Each one becomes a self-contained main library
/// named `LibraryLinkId<linkId>`, so a single question can ship its own
/// logic without a server-hosted Library resource.
fn collect_embedded_cql(items: &[Value]) -> Result<Vec<Value>> {
    let mut found = Vec::new();

    for item in items {
        let extensions = item
            .get("extension")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
            .unwrap_or(&[]);

        for ext in extensions {
            let is_initial = ext
                .get("url")
                .and_then(Value::as_str)
                .is_some_and(|u| u.ends_with(INITIAL_EXPRESSION_EXT));
            let expression = ext.get("valueExpression");
            let language = expression
                .and_then(|e| e.get("language"))
                .and_then(Value::as_str);

            if !(is_initial && language == Some(ELM_CONTENT_TYPE)) {
                continue;
            }
            let Some(source) = expression
                .and_then(|e| e.get("expression"))
                .and_then(Value::as_str)
            else {
                continue;
            };

            let mut elm: Value = serde_json::from_str(source)?;
            let link_id = item.get("linkId").and_then(Value::as_str).unwrap_or("");
            set_elm_identifier(&mut elm, &format!("LibraryLinkId{}", link_id));
            found.push(elm);
        }

        if let Some(children) = item.get("item").and_then(Value::as_array) {
            found.extend(collect_embedded_cql(children)?);
        }
    }
    Ok(found)
}

fn set_elm_identifier(elm: &mut Value, name: &str) {
    let identifier = member_object(member_object(elm, "library"), "identifier");
    if let Value::Object(map) = identifier {
        map.insert("id".to_string(), json!(name));
    }
}

/// `value.key` as a mutable object, creating it (or replacing a non-object
/// occupant) along the way.
fn member_object<'a>(value: &'a mut Value, key: &str) -> &'a mut Value {
    if !value.is_object() {
        *value = Value::Object(Map::new());
    }
    match value {
        Value::Object(map) => {
            let entry = map
                .entry(key.to_string())
                .or_insert_with(|| Value::Object(Map::new()));
            if !entry.is_object() {
                *entry = Value::Object(Map::new());
            }
            entry
        }
        other => other,
    }
}

/// Reconstruct relaunch context (order/coverage references, questionnaire
/// canonical) from a prior QuestionnaireResponse's context extensions.
pub async fn fetch_from_questionnaire_response<C: FhirRequest + ?Sized>(
    client: &C,
    response_ref: &str,
) -> Result<RelaunchContext> {
    let response = client.request(response_ref).await?;

    let mut order_ref = None;
    let mut coverage_ref = None;
    if let Some(extensions) = response.get("extension").and_then(Value::as_array) {
        for ext in extensions {
            let in_context = ext
                .get("url")
                .and_then(Value::as_str)
                .is_some_and(|u| u.ends_with("context"));
            if !in_context {
                continue;
            }
            let Some(reference) = ext
                .get("valueReference")
                .and_then(|r| r.get("reference"))
                .and_then(Value::as_str)
            else {
                continue;
            };
            if reference.starts_with("Coverage/") {
                coverage_ref = Some(reference.to_string());
            } else {
                order_ref = Some(reference.to_string());
            }
        }
    }

    let questionnaire = response
        .get("questionnaire")
        .and_then(Value::as_str)
        .map(str::to_string);

    Ok(RelaunchContext {
        order_ref,
        coverage_ref,
        questionnaire,
        response,
    })
}

/// In-progress QuestionnaireResponses tied to an order, for resuming a
/// previously started session.
pub async fn search_by_order<C: FhirRequest + ?Sized>(
    client: &C,
    order_ref: &str,
) -> Result<Vec<Value>> {
    let query = format!(
        "QuestionnaireResponse?context={}&status=in-progress",
        urlencoding::encode(order_ref)
    );
    let bundle = client.request(&query).await?;
    Ok(page_resources(&bundle))
}
