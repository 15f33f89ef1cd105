use serde_json::{json, Value};
use std::collections::HashSet;

/// Does a string look like a literal FHIR reference (`ResourceType/id`)?
///
/// Distinguishes a reference argument from an inline serialized resource:
/// an uppercase-led alphabetic type, a slash, and a 1..=64 character id of
/// `[A-Za-z0-9.-]`.
pub fn is_reference(s: &str) -> bool {
    let Some((resource_type, id)) = s.split_once('/') else {
        return false;
    };

    let type_ok = resource_type
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_uppercase())
        && resource_type.chars().all(|c| c.is_ascii_alphabetic());

    let id_ok = (1..=64).contains(&id.len())
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.');

    type_ok && id_ok
}

/// The de-duplication key for a resource: `"ResourceType/id"`.
/// Resources without an id have no key.
pub fn resource_key(resource: &Value) -> Option<String> {
    let resource_type = resource.get("resourceType")?.as_str()?;
    let id = resource.get("id")?.as_str()?;
    Some(format!("{}/{}", resource_type, id))
}

/// Extract `entry[].resource` from one search-result page.
pub fn page_resources(bundle: &Value) -> Vec<Value> {
    bundle
        .get("entry")
        .and_then(Value::as_array)
        .map(|entries| {
            entries
                .iter()
                .filter_map(|e| e.get("resource"))
                .cloned()
                .collect()
        })
        .unwrap_or_default()
}

/// The URL of the next page of a paged search response, if any.
pub fn next_link(bundle: &Value) -> Option<&str> {
    bundle
        .get("link")?
        .as_array()?
        .iter()
        .find(|l| l.get("relation").and_then(Value::as_str) == Some("next"))?
        .get("url")?
        .as_str()
}

/// Accumulates resources for a CQL execution bundle.
///
/// Insertion order is preserved (callers seed the Patient first). Every
/// merge path de-duplicates by `resourceType/id`; resources without an id
/// are always appended.
#[derive(Debug, Default)]
pub struct BundleCollector {
    seen: HashSet<String>,
    resources: Vec<Value>,
}

impl BundleCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append one resource unless an identical `resourceType/id` was
    /// already collected. Returns whether the resource was kept.
    pub fn push(&mut self, resource: Value) -> bool {
        if let Some(key) = resource_key(&resource)
            && !self.seen.insert(key)
        {
            return false;
        }
        self.resources.push(resource);
        true
    }

    pub fn extend(&mut self, resources: impl IntoIterator<Item = Value>) {
        for resource in resources {
            self.push(resource);
        }
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Wrap everything collected so far into a `collection` Bundle.
    pub fn into_collection_bundle(self) -> Value {
        json!({
            "resourceType": "Bundle",
            "type": "collection",
            "entry": self
                .resources
                .into_iter()
                .map(|resource| json!({"resource": resource}))
                .collect::<Vec<_>>(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_reference() {
        assert!(is_reference("Patient/123"));
        assert!(is_reference("MedicationRequest/abc-DEF.9"));
        assert!(!is_reference("Patient"));
        assert!(!is_reference("patient/123"));
        assert!(!is_reference("Patient/"));
        assert!(!is_reference("{\"resourceType\":\"Patient\"}"));
        assert!(!is_reference("Patient/has space"));
    }

    #[test]
    fn test_is_reference_rejects_overlong_id() {
        let long = format!("Patient/{}", "a".repeat(65));
        assert!(!is_reference(&long));
    }

    #[test]
    fn test_resource_key() {
        let obs = json!({"resourceType": "Observation", "id": "o1"});
        assert_eq!(resource_key(&obs), Some("Observation/o1".to_string()));
        assert_eq!(resource_key(&json!({"resourceType": "Observation"})), None);
    }

    #[test]
    fn test_page_resources() {
        let page = json!({
            "resourceType": "Bundle",
            "entry": [
                {"resource": {"resourceType": "Observation", "id": "a"}},
                {"fullUrl": "urn:x"},
                {"resource": {"resourceType": "Observation", "id": "b"}},
            ]
        });
        let resources = page_resources(&page);
        assert_eq!(resources.len(), 2);
        assert_eq!(resources[1]["id"], "b");
    }

    #[test]
    fn test_next_link() {
        let page = json!({
            "resourceType": "Bundle",
            "link": [
                {"relation": "self", "url": "http://fhir/Observation?patient=p"},
                {"relation": "next", "url": "http://fhir/Observation?patient=p&page=2"},
            ]
        });
        assert_eq!(
            next_link(&page),
            Some("http://fhir/Observation?patient=p&page=2")
        );

        let last = json!({"link": [{"relation": "self", "url": "x"}]});
        assert_eq!(next_link(&last), None);
    }

    #[test]
    fn test_collector_deduplicates_by_type_and_id() {
        let mut collector = BundleCollector::new();
        assert!(collector.push(json!({"resourceType": "Patient", "id": "p"})));
        assert!(collector.push(json!({"resourceType": "Observation", "id": "o"})));
        assert!(!collector.push(json!({"resourceType": "Observation", "id": "o"})));
        // Same id under a different type is a different resource.
        assert!(collector.push(json!({"resourceType": "Condition", "id": "o"})));
        assert_eq!(collector.len(), 3);
    }

    #[test]
    fn test_collector_keeps_id_less_resources() {
        let mut collector = BundleCollector::new();
        assert!(collector.push(json!({"resourceType": "Observation"})));
        assert!(collector.push(json!({"resourceType": "Observation"})));
        assert_eq!(collector.len(), 2);
    }

    #[test]
    fn test_collection_bundle_preserves_insertion_order() {
        let mut collector = BundleCollector::new();
        collector.push(json!({"resourceType": "Patient", "id": "p"}));
        collector.push(json!({"resourceType": "Observation", "id": "o"}));

        let bundle = collector.into_collection_bundle();
        assert_eq!(bundle["resourceType"], "Bundle");
        assert_eq!(bundle["type"], "collection");
        assert_eq!(bundle["entry"][0]["resource"]["resourceType"], "Patient");
        assert_eq!(bundle["entry"][1]["resource"]["resourceType"], "Observation");
    }
}
