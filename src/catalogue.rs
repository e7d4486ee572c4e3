use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Duration;

use reqwest::blocking::{Body, Client, RequestBuilder, Response};
use reqwest::header::{ACCEPT, CONTENT_TYPE, HeaderMap, HeaderValue, USER_AGENT};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::error::SyncError;
use crate::resource::ResourceKind;

const JSON_API: &str = "application/vnd.api+json";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchHit {
    pub id: String,
    pub title: String,
    pub description: String,
}

/// Bytes for one content blob.
pub enum UploadBody<'a> {
    /// Opened only when the request is sent.
    Stream {
        size: u64,
        open: Box<dyn FnOnce() -> Result<Box<dyn Read + Send>, SyncError> + 'a>,
    },
    File(&'a Path),
}

pub trait CatalogueClient: Send + Sync {
    /// Returns the `data` member of the response document.
    fn create(&self, kind: ResourceKind, payload: &Value) -> Result<Value, SyncError>;
    fn update(&self, kind: ResourceKind, id: &str, payload: &Value) -> Result<Value, SyncError>;
    fn read(&self, kind: ResourceKind, id: &str) -> Result<Value, SyncError>;
    fn search(&self, kind: ResourceKind, query: &str) -> Result<Vec<SearchHit>, SyncError>;
    fn list(&self, kind: ResourceKind) -> Result<Vec<SearchHit>, SyncError>;
    /// Sends the bytes and returns the canonical URL of the owning asset.
    fn upload(&self, blob_endpoint: &str, body: UploadBody<'_>) -> Result<String, SyncError>;
    fn resource_url(&self, kind: ResourceKind, id: &str) -> String;
}

/// `https://host/data_files/12/content_blobs/34` -> `https://host/data_files/12`
pub fn asset_url_from_blob(blob_endpoint: &str) -> String {
    blob_endpoint
        .split("content_blobs")
        .next()
        .unwrap_or(blob_endpoint)
        .trim_end_matches('/')
        .to_string()
}

/// Blob endpoint of the first content blob in a freshly created asset.
pub fn blob_endpoint_of(data: &Value) -> Option<String> {
    data.pointer("/attributes/content_blobs/0/link")
        .and_then(Value::as_str)
        .map(str::to_string)
}

pub fn hits_from(document: &Value) -> Result<Vec<SearchHit>, SyncError> {
    let items = document
        .get("data")
        .and_then(Value::as_array)
        .ok_or_else(|| SyncError::MalformedResponse("expected a `data` array".to_string()))?;
    Ok(items
        .iter()
        .filter_map(|item| {
            let id = id_of(item)?;
            let text = |pointer: &str| {
                item.pointer(pointer)
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string()
            };
            Some(SearchHit {
                id,
                title: text("/attributes/title"),
                description: text("/attributes/description"),
            })
        })
        .collect())
}

/// Ids arrive as strings or numbers depending on the endpoint.
pub fn id_of(item: &Value) -> Option<String> {
    match item.get("id")? {
        Value::String(id) => Some(id.clone()),
        Value::Number(id) => Some(id.to_string()),
        _ => None,
    }
}

#[derive(Clone)]
pub struct CatalogueHttpClient {
    client: Client,
    base_url: String,
    user: String,
    password: String,
}

impl CatalogueHttpClient {
    pub fn new(base_url: &str, user: &str, password: &str) -> Result<Self, SyncError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("lims-sync/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| SyncError::CatalogueHttp(err.to_string()))?,
        );
        headers.insert(ACCEPT, HeaderValue::from_static(JSON_API));
        // No overall timeout: uploads of large files run for minutes.
        let client = Client::builder()
            .default_headers(headers)
            .connect_timeout(Duration::from_secs(30))
            .timeout(None)
            .build()
            .map_err(|err| SyncError::CatalogueHttp(err.to_string()))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            user: user.to_string(),
            password: password.to_string(),
        })
    }

    fn collection_url(&self, kind: ResourceKind) -> String {
        format!("{}/{}", self.base_url, kind.endpoint())
    }

    fn authorized(&self, request: RequestBuilder) -> RequestBuilder {
        request.basic_auth(&self.user, Some(&self.password))
    }

    fn send_json(&self, request: RequestBuilder) -> Result<Value, SyncError> {
        let response = self
            .authorized(request)
            .timeout(Duration::from_secs(60))
            .send()
            .map_err(|err| SyncError::CatalogueHttp(err.to_string()))?;
        let response = Self::handle_status(response)?;
        response
            .json::<Value>()
            .map_err(|err| SyncError::MalformedResponse(err.to_string()))
    }

    fn handle_status(response: Response) -> Result<Response, SyncError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let message = response
            .text()
            .unwrap_or_else(|_| "catalogue request failed".to_string());
        Err(SyncError::CatalogueStatus { status, message })
    }

    fn data_of(document: Value) -> Result<Value, SyncError> {
        match document {
            Value::Object(mut map) => map
                .remove("data")
                .ok_or_else(|| SyncError::MalformedResponse("missing `data` member".to_string())),
            _ => Err(SyncError::MalformedResponse(
                "expected a JSON object".to_string(),
            )),
        }
    }
}

impl CatalogueClient for CatalogueHttpClient {
    fn create(&self, kind: ResourceKind, payload: &Value) -> Result<Value, SyncError> {
        debug!("POST {}", self.collection_url(kind));
        let request = self
            .client
            .post(self.collection_url(kind))
            .header(CONTENT_TYPE, JSON_API)
            .body(payload.to_string());
        Self::data_of(self.send_json(request)?)
    }

    fn update(&self, kind: ResourceKind, id: &str, payload: &Value) -> Result<Value, SyncError> {
        let url = format!("{}/{id}", self.collection_url(kind));
        debug!("PATCH {url}");
        let request = self
            .client
            .patch(url)
            .header(CONTENT_TYPE, JSON_API)
            .body(payload.to_string());
        Self::data_of(self.send_json(request)?)
    }

    fn read(&self, kind: ResourceKind, id: &str) -> Result<Value, SyncError> {
        let url = format!("{}/{id}", self.collection_url(kind));
        debug!("GET {url}");
        Self::data_of(self.send_json(self.client.get(url))?)
    }

    fn search(&self, kind: ResourceKind, query: &str) -> Result<Vec<SearchHit>, SyncError> {
        let url = format!("{}/search", self.base_url);
        debug!("GET {url} q={query} search_type={kind}");
        let request = self
            .client
            .get(url)
            .query(&[("q", query), ("search_type", kind.endpoint())]);
        hits_from(&self.send_json(request)?)
    }

    fn list(&self, kind: ResourceKind) -> Result<Vec<SearchHit>, SyncError> {
        debug!("GET {}", self.collection_url(kind));
        hits_from(&self.send_json(self.client.get(self.collection_url(kind)))?)
    }

    fn upload(&self, blob_endpoint: &str, body: UploadBody<'_>) -> Result<String, SyncError> {
        let body = match body {
            UploadBody::Stream { size, open } => Body::sized(open()?, size),
            UploadBody::File(path) => {
                let file = File::open(path).map_err(|err| SyncError::Upload {
                    file: path.display().to_string(),
                    message: err.to_string(),
                })?;
                Body::from(file)
            }
        };
        debug!("PUT {blob_endpoint}");
        let response = self
            .authorized(self.client.put(blob_endpoint))
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(body)
            .send()
            .map_err(|err| SyncError::CatalogueHttp(err.to_string()))?;
        Self::handle_status(response)?;
        Ok(asset_url_from_blob(blob_endpoint))
    }

    fn resource_url(&self, kind: ResourceKind, id: &str) -> String {
        format!("{}/{id}", self.collection_url(kind))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn asset_url_drops_blob_path() {
        assert_eq!(
            asset_url_from_blob("https://cat.example/data_files/12/content_blobs/34"),
            "https://cat.example/data_files/12"
        );
    }

    #[test]
    fn hits_accept_numeric_ids() {
        let document = json!({
            "data": [
                { "id": 3, "type": "assays", "attributes": { "title": "EXP1", "description": "notes" } },
                { "id": "4", "type": "assays", "attributes": {} }
            ]
        });
        let hits = hits_from(&document).unwrap();
        assert_eq!(hits[0].id, "3");
        assert_eq!(hits[0].description, "notes");
        assert_eq!(hits[1].title, "");
        assert_eq!(hits[1].description, "");
    }
}
