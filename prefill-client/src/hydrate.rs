use crate::client::FhirRequest;
use futures::future;
use prefill_core::{substitute_tokens, unfulfilled_keys, Hook, PrefetchTemplates, PrefillError, Result};
use serde_json::{Map, Value};

/// Fill in the prefetch keys the calling system did not already satisfy.
///
/// Tokens are resolved against the whole Hook object, so templates can
/// reach both `context.*` and previously supplied `prefetch.*` values.
/// Keys already present in the hook's prefetch are never re-fetched or
/// overwritten. All owed keys are fetched concurrently; one rejection
/// fails the aggregate and no partial result is surfaced.
pub async fn hydrate<C: FhirRequest + ?Sized>(
    client: &C,
    templates: &PrefetchTemplates,
    hook: &Hook,
) -> Result<Map<String, Value>> {
    let context = serde_json::to_value(hook)?;
    let mut prefetch = hook.prefetch.clone();

    let pending: Vec<(String, String)> = unfulfilled_keys(templates, &prefetch)
        .into_iter()
        .map(|(key, template)| (key.to_string(), substitute_tokens(template, &context)))
        .collect();

    let fetched = future::try_join_all(pending.into_iter().map(|(key, query)| async move {
        tracing::debug!(key = %key, query = %query, "Hydrating prefetch key");
        let resource = client.request(&query).await?;
        Ok::<_, PrefillError>((key, resource))
    }))
    .await?;

    for (key, resource) in fetched {
        prefetch.insert(key, resource);
    }
    Ok(prefetch)
}
