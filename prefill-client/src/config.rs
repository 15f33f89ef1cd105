use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Client configuration loaded once at startup from YAML, with env
/// overrides (PREFILL_*). Lookup tables that drive query adaptation and
/// REMS endpoint resolution are immutable fields here and passed by
/// reference to the components that need them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    pub fhir: FhirSettings,
    pub ehr: EhrSettings,
    pub cql: CqlSettings,
    pub rems: RemsSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FhirSettings {
    pub base_url: String,
    /// Declared FHIR release of the target server, e.g. "4.0.1".
    pub version: String,
}

/// Known EHR targets whose default search behavior needs query-parameter
/// adaptation.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum EhrVariant {
    #[default]
    Generic,
    Epic,
}

impl EhrVariant {
    /// Extra query parameters a patient-scoped search needs on this EHR.
    ///
    /// Epic's default Observation search returns nothing without a
    /// category, and its medication searches omit non-active entries
    /// unless statuses are spelled out.
    pub fn extra_search_params(&self, resource_type: &str) -> Option<&'static str> {
        match (self, resource_type) {
            (EhrVariant::Epic, "Observation") => {
                Some("category=laboratory,social-history,vital-signs")
            }
            (EhrVariant::Epic, "MedicationStatement" | "MedicationRequest" | "MedicationOrder") => {
                Some("status=active,completed,stopped")
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EhrSettings {
    pub variant: EhrVariant,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CqlSettings {
    /// Resource types never fetched for CQL execution even when a library
    /// declares a requirement on them.
    pub excluded_resource_types: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RemsSettings {
    /// Medication code → REMS administrator base URL.
    pub admin_urls: HashMap<String, String>,
}

impl Default for FhirSettings {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".to_string(),
            version: "4.0.1".to_string(),
        }
    }
}

impl Default for CqlSettings {
    fn default() -> Self {
        Self {
            excluded_resource_types: vec!["Organization".to_string()],
        }
    }
}

impl ClientConfig {
    /// Load configuration from a YAML file.
    pub fn load_from_file(path: &str) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        Ok(Self::from_yaml(&content)?)
    }

    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(content)
    }

    /// Load configuration with priority: env vars > config file > defaults.
    pub fn load(config_path: Option<&str>) -> Result<Self, Box<dyn std::error::Error>> {
        let mut config = if let Some(path) = config_path {
            Self::load_from_file(path)?
        } else {
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides<F>(&mut self, var: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(base_url) = var("PREFILL_FHIR_BASE_URL") {
            self.fhir.base_url = base_url;
        }
        if let Some(version) = var("PREFILL_FHIR_VERSION") {
            self.fhir.version = version;
        }
        if let Some(variant) = var("PREFILL_EHR_VARIANT") {
            match variant.to_lowercase().as_str() {
                "epic" => self.ehr.variant = EhrVariant::Epic,
                "generic" => self.ehr.variant = EhrVariant::Generic,
                other => tracing::warn!(variant = other, "Unknown EHR variant, keeping configured value"),
            }
        }
    }

    /// The REMS administrator endpoint registered for a medication code.
    pub fn rems_admin_url(&self, medication_code: &str) -> Option<&str> {
        self.rems.admin_urls.get(medication_code).map(String::as_str)
    }

    /// Resolve the REMS administrator for a draft order by its medication
    /// code (`medicationCodeableConcept.coding[].code`). Used to pick the
    /// CDS service endpoint a hook gets sent to.
    pub fn rems_admin_url_for_order(&self, order: &serde_json::Value) -> Option<&str> {
        let codings = order
            .get("medicationCodeableConcept")?
            .get("coding")?
            .as_array()?;
        codings
            .iter()
            .filter_map(|c| c.get("code").and_then(serde_json::Value::as_str))
            .find_map(|code| self.rems_admin_url(code))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ClientConfig::default();
        assert_eq!(config.fhir.version, "4.0.1");
        assert_eq!(config.ehr.variant, EhrVariant::Generic);
        assert_eq!(config.cql.excluded_resource_types, vec!["Organization"]);
        assert!(config.rems.admin_urls.is_empty());
    }

    #[test]
    fn test_from_yaml() {
        let yaml = r#"
fhir:
  base_url: "https://fhir.example.org/r4"
  version: "4.0.1"
ehr:
  variant: epic
rems:
  admin_urls:
    "6064": "https://rems.example.org/turalio"
"#;
        let config = ClientConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.fhir.base_url, "https://fhir.example.org/r4");
        assert_eq!(config.ehr.variant, EhrVariant::Epic);
        assert_eq!(
            config.rems_admin_url("6064"),
            Some("https://rems.example.org/turalio")
        );
        assert_eq!(config.rems_admin_url("9999"), None);
        // Section absent from the file keeps its default.
        assert_eq!(config.cql.excluded_resource_types, vec!["Organization"]);
    }

    #[test]
    fn test_rems_admin_url_for_order() {
        let yaml = r#"
rems:
  admin_urls:
    "2183126": "https://rems.example.org/turalio"
"#;
        let config = ClientConfig::from_yaml(yaml).unwrap();
        let order = serde_json::json!({
            "resourceType": "MedicationRequest",
            "medicationCodeableConcept": {
                "coding": [
                    {"system": "http://www.nlm.nih.gov/research/umls/rxnorm", "code": "2183126"}
                ]
            }
        });
        assert_eq!(
            config.rems_admin_url_for_order(&order),
            Some("https://rems.example.org/turalio")
        );

        let unknown = serde_json::json!({
            "medicationCodeableConcept": {"coding": [{"code": "0000"}]}
        });
        assert_eq!(config.rems_admin_url_for_order(&unknown), None);
    }

    #[test]
    fn test_env_overrides_win_over_file() {
        let yaml = r#"
fhir:
  base_url: "https://file.example.org/r4"
ehr:
  variant: generic
"#;
        let mut config = ClientConfig::from_yaml(yaml).unwrap();
        let vars = HashMap::from([
            (
                "PREFILL_FHIR_BASE_URL".to_string(),
                "https://env.example.org/r4".to_string(),
            ),
            ("PREFILL_EHR_VARIANT".to_string(), "Epic".to_string()),
        ]);

        config.apply_overrides(|key| vars.get(key).cloned());
        assert_eq!(config.fhir.base_url, "https://env.example.org/r4");
        assert_eq!(config.ehr.variant, EhrVariant::Epic);
        // Settings without an override keep their file/default values.
        assert_eq!(config.fhir.version, "4.0.1");
    }

    #[test]
    fn test_unknown_ehr_variant_override_keeps_configured_value() {
        let mut config = ClientConfig::from_yaml("ehr:\n  variant: epic\n").unwrap();
        config.apply_overrides(|key| {
            (key == "PREFILL_EHR_VARIANT").then(|| "cerner".to_string())
        });
        assert_eq!(config.ehr.variant, EhrVariant::Epic);
    }

    #[test]
    fn test_epic_search_adaptation() {
        let epic = EhrVariant::Epic;
        assert!(epic.extra_search_params("Observation").unwrap().contains("category="));
        assert!(epic
            .extra_search_params("MedicationStatement")
            .unwrap()
            .contains("status="));
        assert_eq!(epic.extra_search_params("Condition"), None);

        let generic = EhrVariant::Generic;
        assert_eq!(generic.extra_search_params("Observation"), None);
    }
}
