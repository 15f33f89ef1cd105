use serde_json::Value;

/// Resolve a dotted path against a JSON tree.
///
/// Array indexing uses `[n]` syntax (`draftOrders.entry[0].resource.id`);
/// the brackets are rewritten to dot segments before traversal. Resolution
/// stops the moment any segment is absent and returns `None` — a present
/// key holding `false`, `0` or `""` still resolves.
pub fn resolve_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let normalized = path.replace('[', ".").replace(']', "");

    let mut current = root;
    for segment in normalized.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Replace every `{{token}}` occurrence in a template with the value the
/// token resolves to against `context`.
///
/// Tokens contain word characters and dots only. An unresolvable token is
/// replaced with the literal text `undefined` (the outgoing query then
/// carries it verbatim — callers rely on this permissive behavior).
/// Replacements are not re-scanned, so substitution never recurses.
pub fn substitute_tokens(template: &str, context: &Value) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];

        match after.find("}}") {
            Some(end) if is_token(&after[..end]) => {
                let token = &after[..end];
                let resolved = resolve_path(context, token);
                if resolved.is_none() {
                    tracing::debug!(token, "Token did not resolve, substituting literal undefined");
                }
                out.push_str(&coerce(resolved));
                rest = &after[end + 2..];
            }
            // Not a token; emit the braces untouched and keep scanning.
            _ => {
                out.push_str("{{");
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

fn is_token(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '.')
}

fn coerce(value: Option<&Value>) -> String {
    match value {
        None => "undefined".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(v) => v.to_string(),
    }
}
