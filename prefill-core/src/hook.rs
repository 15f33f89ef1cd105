use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Supported CDS Hooks hook types.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum HookKind {
    #[serde(rename = "order-sign")]
    OrderSign,
    #[serde(rename = "order-select")]
    OrderSelect,
    #[serde(rename = "patient-view")]
    PatientView,
    #[serde(rename = "encounter-start")]
    EncounterStart,
}

impl HookKind {
    pub fn as_str(&self) -> &str {
        match self {
            HookKind::OrderSign => "order-sign",
            HookKind::OrderSelect => "order-select",
            HookKind::PatientView => "patient-view",
            HookKind::EncounterStart => "encounter-start",
        }
    }
}

/// A CDS Hooks request payload.
///
/// Field names follow the CDS Hooks wire shape exactly; this struct is
/// what gets serialized and sent to a decision-support service, and also
/// what prefetch tokens are resolved against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hook {
    pub hook: HookKind,

    #[serde(rename = "hookInstance")]
    pub hook_instance: String,

    #[serde(rename = "fhirServer", skip_serializing_if = "Option::is_none")]
    pub fhir_server: Option<String>,

    #[serde(rename = "fhirAuthorization", skip_serializing_if = "Option::is_none")]
    pub fhir_authorization: Option<Value>,

    pub context: Value,

    #[serde(default)]
    pub prefetch: Map<String, Value>,
}

/// Builds a concrete hook instance from domain objects.
///
/// Each supported hook kind gets its own generator; `generate` assigns a
/// fresh hookInstance id and an empty prefetch map.
pub trait HookGenerator {
    fn kind(&self) -> HookKind;

    fn generate_context(&self) -> Value;

    fn generate(&self) -> Hook {
        Hook {
            hook: self.kind(),
            hook_instance: uuid::Uuid::new_v4().to_string(),
            fhir_server: None,
            fhir_authorization: None,
            context: self.generate_context(),
            prefetch: Map::new(),
        }
    }
}

/// order-sign: the user is signing one or more draft orders.
#[derive(Debug, Clone)]
pub struct OrderSignHook {
    pub user_id: String,
    pub patient_id: String,
    pub draft_orders: Value,
}

impl HookGenerator for OrderSignHook {
    fn kind(&self) -> HookKind {
        HookKind::OrderSign
    }

    fn generate_context(&self) -> Value {
        json!({
            "userId": self.user_id,
            "patientId": self.patient_id,
            "draftOrders": self.draft_orders,
        })
    }
}

/// order-select: an order was selected but not yet signed.
#[derive(Debug, Clone)]
pub struct OrderSelectHook {
    pub user_id: String,
    pub patient_id: String,
    pub draft_orders: Value,
    /// Ids of the draft-order entries currently selected.
    pub selections: Vec<String>,
}

impl HookGenerator for OrderSelectHook {
    fn kind(&self) -> HookKind {
        HookKind::OrderSelect
    }

    fn generate_context(&self) -> Value {
        json!({
            "userId": self.user_id,
            "patientId": self.patient_id,
            "draftOrders": self.draft_orders,
            "selections": self.selections,
        })
    }
}

/// patient-view: a patient chart was opened.
#[derive(Debug, Clone)]
pub struct PatientViewHook {
    pub user_id: String,
    pub patient_id: String,
}

impl HookGenerator for PatientViewHook {
    fn kind(&self) -> HookKind {
        HookKind::PatientView
    }

    fn generate_context(&self) -> Value {
        json!({
            "userId": self.user_id,
            "patientId": self.patient_id,
        })
    }
}

/// encounter-start: an encounter has begun.
#[derive(Debug, Clone)]
pub struct EncounterStartHook {
    pub user_id: String,
    pub patient_id: String,
    pub encounter_id: String,
}

impl HookGenerator for EncounterStartHook {
    fn kind(&self) -> HookKind {
        HookKind::EncounterStart
    }

    fn generate_context(&self) -> Value {
        json!({
            "userId": self.user_id,
            "patientId": self.patient_id,
            "encounterId": self.encounter_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order_sign() -> OrderSignHook {
        OrderSignHook {
            user_id: "Practitioner/dr-1".to_string(),
            patient_id: "pat-1".to_string(),
            draft_orders: json!({"resourceType": "Bundle", "entry": []}),
        }
    }

    #[test]
    fn test_order_sign_context_fields() {
        let hook = order_sign().generate();
        assert_eq!(hook.hook, HookKind::OrderSign);
        assert_eq!(hook.context["userId"], "Practitioner/dr-1");
        assert_eq!(hook.context["patientId"], "pat-1");
        assert_eq!(hook.context["draftOrders"]["resourceType"], "Bundle");
        assert!(hook.prefetch.is_empty());
    }

    #[test]
    fn test_hook_instances_are_unique() {
        let builder = order_sign();
        let a = builder.generate();
        let b = builder.generate();
        assert_ne!(a.hook_instance, b.hook_instance);
    }

    #[test]
    fn test_wire_field_names() {
        let hook = order_sign().generate();
        let wire = serde_json::to_value(&hook).unwrap();
        assert_eq!(wire["hook"], "order-sign");
        assert!(wire["hookInstance"].is_string());
        assert!(wire.get("fhirServer").is_none());
        assert!(wire["prefetch"].is_object());
    }

    #[test]
    fn test_encounter_start_context() {
        let hook = EncounterStartHook {
            user_id: "u".to_string(),
            patient_id: "p".to_string(),
            encounter_id: "enc-9".to_string(),
        }
        .generate();
        assert_eq!(hook.hook.as_str(), "encounter-start");
        assert_eq!(hook.context["encounterId"], "enc-9");
    }

    #[test]
    fn test_order_select_carries_selections() {
        let hook = OrderSelectHook {
            user_id: "u".to_string(),
            patient_id: "p".to_string(),
            draft_orders: json!({"resourceType": "Bundle"}),
            selections: vec!["MedicationRequest/m1".to_string()],
        }
        .generate();
        assert_eq!(hook.context["selections"][0], "MedicationRequest/m1");
    }
}
