use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// A CDS service's declared prefetch templates: prefetch-key → FHIR query
/// template with `{{token}}` placeholders. Declared statically by the
/// service descriptor and never mutated.
///
/// Ordered map so hydration issues requests in a deterministic order.
pub type PrefetchTemplates = BTreeMap<String, String>;

/// The prefetch-satisfaction contract: a template key already present in
/// the hook's prefetch map was supplied upstream and must not be fetched
/// again (or overwritten). Returns the keys the hydrator still owes.
pub fn unfulfilled_keys<'a>(
    templates: &'a PrefetchTemplates,
    existing: &Map<String, Value>,
) -> Vec<(&'a str, &'a str)> {
    templates
        .iter()
        .filter(|(key, _)| !existing.contains_key(*key))
        .map(|(key, template)| (key.as_str(), template.as_str()))
        .collect()
}
