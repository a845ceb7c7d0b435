use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::Deserialize;
use serde_json::{Value, json};
use url::Url;

use super::{DeleteStatus, StoreError, VectorStore};
use crate::config::{ConfigError, VectorStoreConfig};

const CONNECT_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(5);

/// Weaviate schema API client.
///
/// Every request carries the configured timeout; a timeout is reported as a
/// connectivity failure.
pub struct HttpVectorStore {
    client: Client,
    base_url: Url,
    api_key: Option<String>,
}

impl HttpVectorStore {
    pub fn new(config: &VectorStoreConfig) -> Result<Self, ConfigError> {
        let base_url = Url::parse(config.endpoint.trim()).map_err(|e| {
            ConfigError::Invalid(format!("vector_store.endpoint is not a URL: {e}"))
        })?;
        if base_url.cannot_be_a_base() {
            return Err(ConfigError::Invalid(format!(
                "vector_store.endpoint '{base_url}' cannot be used as a base URL"
            )));
        }
        let client = Client::builder()
            .connect_timeout(CONNECT_TIMEOUT.min(config.timeout()))
            .timeout(config.timeout())
            .build()
            .map_err(|e| ConfigError::Invalid(format!("failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            base_url,
            api_key: config.resolve_api_key()?,
        })
    }

    fn url(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        url
    }

    fn request(&self, method: Method, segments: &[&str]) -> RequestBuilder {
        let builder = self.client.request(method, self.url(segments));
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response, StoreError> {
        builder.send().await.map_err(transport_error)
    }
}

fn transport_error(e: reqwest::Error) -> StoreError {
    if e.is_timeout() {
        StoreError::Connectivity(format!("request timed out: {e}"))
    } else {
        StoreError::Connectivity(e.to_string())
    }
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: Vec<ErrorMessage>,
}

#[derive(Deserialize)]
struct ErrorMessage {
    message: String,
}

/// Turn a non-success response into a `Rejected` error, preferring the
/// store's own error message over the raw body.
async fn rejection(response: Response) -> StoreError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();
    map_error_status(status, &body)
}

fn map_error_status(status: u16, body: &str) -> StoreError {
    let message = serde_json::from_str::<ErrorResponse>(body)
        .ok()
        .map(|r| {
            r.error
                .into_iter()
                .map(|m| m.message)
                .collect::<Vec<_>>()
                .join("; ")
        })
        .filter(|m| !m.is_empty())
        .unwrap_or_else(|| body.trim().to_string());
    StoreError::Rejected { status, message }
}

async fn json_body(response: Response) -> Result<Value, StoreError> {
    response
        .json::<Value>()
        .await
        .map_err(|e| StoreError::Malformed(e.to_string()))
}

#[derive(Deserialize)]
struct SchemaDump {
    #[serde(default)]
    classes: Option<Vec<Value>>,
}

impl VectorStore for HttpVectorStore {
    async fn ready(&self) -> Result<(), StoreError> {
        let response = self
            .send(self.request(Method::GET, &["v1", ".well-known", "ready"]))
            .await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(StoreError::Connectivity(format!(
                "store at {} is not ready (HTTP {})",
                self.base_url,
                response.status().as_u16()
            )))
        }
    }

    async fn list_definitions(&self) -> Result<Vec<Value>, StoreError> {
        let response = self.send(self.request(Method::GET, &["v1", "schema"])).await?;
        if !response.status().is_success() {
            return Err(rejection(response).await);
        }
        let dump: SchemaDump = serde_json::from_value(json_body(response).await?)
            .map_err(|e| StoreError::Malformed(format!("schema listing: {e}")))?;
        Ok(dump.classes.unwrap_or_default())
    }

    async fn get_definition(&self, name: &str) -> Result<Option<Value>, StoreError> {
        let response = self
            .send(self.request(Method::GET, &["v1", "schema", name]))
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            status if status.is_success() => json_body(response).await.map(Some),
            _ => Err(rejection(response).await),
        }
    }

    async fn delete_collection(&self, name: &str) -> Result<DeleteStatus, StoreError> {
        let response = self
            .send(self.request(Method::DELETE, &["v1", "schema", name]))
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(DeleteStatus::AlreadyAbsent),
            status if status.is_success() => Ok(DeleteStatus::Deleted),
            _ => Err(rejection(response).await),
        }
    }

    async fn create_collection(&self, definition: &Value) -> Result<(), StoreError> {
        let response = self
            .send(self.request(Method::POST, &["v1", "schema"]).json(definition))
            .await?;
        if response.status().is_success() {
            Ok(())
        } else {
            Err(rejection(response).await)
        }
    }

    async fn object_count(&self, name: &str) -> Result<u64, StoreError> {
        let query = format!("{{ Aggregate {{ {name} {{ meta {{ count }} }} }} }}");
        let response = self
            .send(
                self.request(Method::POST, &["v1", "graphql"])
                    .json(&json!({ "query": query })),
            )
            .await?;
        if !response.status().is_success() {
            return Err(rejection(response).await);
        }
        let body = json_body(response).await?;
        if let Some(errors) = body.get("errors").and_then(Value::as_array) {
            let messages: Vec<&str> = errors
                .iter()
                .filter_map(|e| e.get("message").and_then(Value::as_str))
                .collect();
            return Err(StoreError::Rejected {
                status: 200,
                message: messages.join("; "),
            });
        }
        body.pointer(&format!("/data/Aggregate/{name}/0/meta/count"))
            .and_then(Value::as_u64)
            .ok_or_else(|| StoreError::Malformed(format!("no object count for '{name}'")))
    }
}
