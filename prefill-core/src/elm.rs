use crate::error::Result;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::Value;

pub const ELM_CONTENT_TYPE: &str = "application/elm+json";

/// Decode the ELM JSON attachment carried inline on a Library resource.
///
/// FHIR Library resources ship compiled CQL as a base64 attachment in
/// `content[]`. Returns `Ok(None)` when no attachment has the
/// `application/elm+json` content type; decode or parse failures are
/// errors (the package operation promised executable content).
pub fn decode_elm_attachment(library_resource: &Value) -> Result<Option<Value>> {
    let Some(contents) = library_resource.get("content").and_then(Value::as_array) else {
        return Ok(None);
    };

    for attachment in contents {
        let content_type = attachment.get("contentType").and_then(Value::as_str);
        if content_type != Some(ELM_CONTENT_TYPE) {
            continue;
        }
        let Some(data) = attachment.get("data").and_then(Value::as_str) else {
            continue;
        };
        let decoded = STANDARD.decode(data)?;
        let elm: Value = serde_json::from_slice(&decoded)?;
        return Ok(Some(elm));
    }

    Ok(None)
}

/// The library name an ELM document declares (`library.identifier.id`).
pub fn elm_identifier_id(elm: &Value) -> Option<&str> {
    elm.get("library")?
        .get("identifier")?
        .get("id")?
        .as_str()
}
