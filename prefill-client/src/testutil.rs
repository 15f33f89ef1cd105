//! In-memory FhirRequest implementation for unit tests.

use crate::client::FhirRequest;
use async_trait::async_trait;
use prefill_core::{PrefillError, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Default)]
pub struct MockFhir {
    routes: HashMap<String, Value>,
    errors: HashMap<String, (u16, String)>,
    log: Mutex<Vec<String>>,
    delay_ms: u64,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl MockFhir {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_route(mut self, path: &str, response: Value) -> Self {
        self.routes.insert(path.to_string(), response);
        self
    }

    pub fn with_error(mut self, path: &str, status: u16, detail: &str) -> Self {
        self.errors.insert(path.to_string(), (status, detail.to_string()));
        self
    }

    /// Delay every request so overlapping calls are observable.
    pub fn with_delay_ms(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    pub fn requests(&self) -> Vec<String> {
        self.log.lock().unwrap().clone()
    }

    /// Highest number of requests that were in flight simultaneously.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn serve(&self, key: &str) -> Result<Value> {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        if self.delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        if let Some((status, detail)) = self.errors.get(key) {
            return Err(PrefillError::Http {
                url: key.to_string(),
                status: *status,
                detail: detail.clone(),
            });
        }
        match self.routes.get(key) {
            Some(response) => Ok(response.clone()),
            None => Err(PrefillError::Http {
                url: key.to_string(),
                status: 404,
                detail: "no mock route".to_string(),
            }),
        }
    }
}

#[async_trait]
impl FhirRequest for MockFhir {
    async fn request(&self, path: &str) -> Result<Value> {
        self.log.lock().unwrap().push(path.to_string());
        self.serve(path).await
    }

    async fn post(&self, url: &str, _body: &Value) -> Result<Value> {
        let key = format!("POST {}", url);
        self.log.lock().unwrap().push(key.clone());
        self.serve(&key).await
    }
}
