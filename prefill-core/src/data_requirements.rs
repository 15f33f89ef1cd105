use serde_json::Value;
use std::collections::BTreeSet;

/// Compute the FHIR resource types a CQL library execution needs, from the
/// Library resource's `dataRequirement` list.
///
/// An absent library or one that declares no requirements needs no new
/// data — that is an empty set, not an error. Requirement types on the
/// exclusion list are dropped, as is any type whose name contains
/// "ValueSet" (those represent codes used for filtering, not resources to
/// fetch from the server).
pub fn needed_resource_types(
    library: Option<&Value>,
    exclusions: &[String],
) -> BTreeSet<String> {
    let Some(requirements) = library
        .and_then(|lib| lib.get("dataRequirement"))
        .and_then(Value::as_array)
    else {
        return BTreeSet::new();
    };

    requirements
        .iter()
        .filter_map(|req| req.get("type").and_then(Value::as_str))
        .filter(|t| !t.contains("ValueSet"))
        .filter(|t| !exclusions.iter().any(|e| e == t))
        .map(str::to_string)
        .collect()
}
