use async_trait::async_trait;
use prefill_core::{PrefillError, Result};
use serde_json::Value;

/// The FHIR request capability the pipeline runs against.
///
/// `path` may be relative to the client's base URL (`Patient/123`,
/// `Observation?patient=p1`) or absolute (pagination next links come back
/// absolute). Implementations return the parsed response body.
#[async_trait]
pub trait FhirRequest: Send + Sync {
    /// GET a resource or search set.
    async fn request(&self, path: &str) -> Result<Value>;

    /// POST a JSON body, e.g. a Parameters resource to an operation
    /// endpoint.
    async fn post(&self, url: &str, body: &Value) -> Result<Value>;
}

/// reqwest-backed client bound to one FHIR server (and optionally one
/// SMART access token).
pub struct HttpFhirClient {
    base_url: String,
    access_token: Option<String>,
    client: reqwest::Client,
}

impl HttpFhirClient {
    pub fn new(base_url: impl Into<String>, access_token: Option<String>) -> Self {
        Self {
            base_url: base_url.into(),
            access_token,
            client: reqwest::Client::new(),
        }
    }

    fn absolute(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!(
                "{}/{}",
                self.base_url.trim_end_matches('/'),
                path.trim_start_matches('/')
            )
        }
    }

    fn apply_auth(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.access_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn handle(url: String, response: reqwest::Response) -> Result<Value> {
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            tracing::warn!(url = %url, status = %status, "FHIR request failed");
            return Err(PrefillError::Http {
                url,
                status: status.as_u16(),
                detail,
            });
        }

        response.json().await.map_err(|e| PrefillError::Request {
            url,
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl FhirRequest for HttpFhirClient {
    async fn request(&self, path: &str) -> Result<Value> {
        let url = self.absolute(path);
        let request = self
            .client
            .get(&url)
            .header("Accept", "application/fhir+json");

        let response = self
            .apply_auth(request)
            .send()
            .await
            .map_err(|e| PrefillError::Request {
                url: url.clone(),
                message: e.to_string(),
            })?;

        Self::handle(url, response).await
    }

    async fn post(&self, url: &str, body: &Value) -> Result<Value> {
        let url = self.absolute(url);
        let request = self
            .client
            .post(&url)
            .header("Accept", "application/fhir+json")
            .json(body);

        let response = self
            .apply_auth(request)
            .send()
            .await
            .map_err(|e| PrefillError::Request {
                url: url.clone(),
                message: e.to_string(),
            })?;

        Self::handle(url, response).await
    }
}
