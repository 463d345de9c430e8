//! Concrete [`Backend`] over a REST page API.
//!
//! Handles base URL, bearer token and wire formats; everything above it only
//! sees the trait and typed [`BackendError`]s. Status codes map to error
//! variants here, once, so no caller ever inspects messages: 429 and 5xx are
//! transient, 404 is gone, 401/403 is auth.

use async_trait::async_trait;
use serde::Deserialize;

use docsync_core::contract::{Backend, BackendError, Resource, UploadedAsset};

/// Connection settings for one backend target.
#[derive(Debug)]
pub struct BackendConfig {
    pub base_url: String,
    pub api_token: String,
}

pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    api_token: String,
}

#[derive(Deserialize)]
struct IdResponse {
    id: String,
}

#[derive(Deserialize)]
struct ResourceResponse {
    id: String,
    #[serde(default)]
    name: String,
    #[serde(default)]
    trashed: bool,
    #[serde(default)]
    mime_type: Option<String>,
}

#[derive(Deserialize)]
struct AssetResponse {
    id: String,
    public_url: String,
}

impl HttpBackend {
    pub fn new(config: BackendConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_token: config.api_token,
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn check(
        &self,
        response: Result<reqwest::Response, reqwest::Error>,
        what: &str,
    ) -> Result<reqwest::Response, BackendError> {
        let response = response.map_err(|e| BackendError::Transient {
            status: None,
            message: format!("{what}: {e}"),
        })?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let code = status.as_u16();
        Err(match code {
            401 | 403 => BackendError::Auth(format!("{what}: status {status}")),
            404 => BackendError::Gone(what.to_string()),
            429 | 500..=599 => BackendError::Transient {
                status: Some(code),
                message: what.to_string(),
            },
            _ => BackendError::Other(format!("{what}: status {status}")),
        })
    }

    async fn parse<T: serde::de::DeserializeOwned>(
        &self,
        response: reqwest::Response,
        what: &str,
    ) -> Result<T, BackendError> {
        response
            .json::<T>()
            .await
            .map_err(|e| BackendError::Other(format!("{what}: malformed response: {e}")))
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn create_container(
        &self,
        parent_id: &str,
        name: &str,
    ) -> Result<String, BackendError> {
        let what = format!("create_container '{name}'");
        let response = self
            .client
            .post(self.url("/api/containers"))
            .bearer_auth(&self.api_token)
            .json(&serde_json::json!({ "parent_id": parent_id, "name": name }))
            .send()
            .await;
        let response = self.check(response, &what).await?;
        let body: IdResponse = self.parse(response, &what).await?;
        Ok(body.id)
    }

    async fn get_resource(&self, id: &str) -> Result<Resource, BackendError> {
        let what = format!("get_resource {id}");
        let response = self
            .client
            .get(self.url(&format!("/api/resources/{id}")))
            .bearer_auth(&self.api_token)
            .send()
            .await;
        let response = self.check(response, &what).await?;
        let body: ResourceResponse = self.parse(response, &what).await?;
        Ok(Resource {
            id: body.id,
            name: body.name,
            trashed: body.trashed,
            mime_type: body.mime_type,
        })
    }

    async fn create_page(
        &self,
        parent_id: &str,
        title: &str,
        content: &serde_json::Value,
    ) -> Result<String, BackendError> {
        let what = format!("create_page '{title}'");
        let response = self
            .client
            .post(self.url("/api/pages"))
            .bearer_auth(&self.api_token)
            .json(&serde_json::json!({
                "parent_id": parent_id,
                "title": title,
                "content": content,
            }))
            .send()
            .await;
        let response = self.check(response, &what).await?;
        let body: IdResponse = self.parse(response, &what).await?;
        Ok(body.id)
    }

    async fn replace_page_content(
        &self,
        id: &str,
        title: &str,
        content: &serde_json::Value,
    ) -> Result<(), BackendError> {
        let what = format!("replace_page_content {id}");
        let response = self
            .client
            .put(self.url(&format!("/api/pages/{id}")))
            .bearer_auth(&self.api_token)
            .json(&serde_json::json!({ "title": title, "content": content }))
            .send()
            .await;
        self.check(response, &what).await?;
        Ok(())
    }

    async fn delete_page(&self, id: &str) -> Result<(), BackendError> {
        let what = format!("delete_page {id}");
        let response = self
            .client
            .delete(self.url(&format!("/api/pages/{id}")))
            .bearer_auth(&self.api_token)
            .send()
            .await;
        self.check(response, &what).await?;
        Ok(())
    }

    async fn upload_asset(
        &self,
        parent_id: &str,
        file_name: &str,
        mime_type: &str,
        bytes: Vec<u8>,
    ) -> Result<UploadedAsset, BackendError> {
        let what = format!("upload_asset '{file_name}'");
        let response = self
            .client
            .post(self.url("/api/assets"))
            .bearer_auth(&self.api_token)
            .query(&[("parent_id", parent_id), ("file_name", file_name)])
            .header(reqwest::header::CONTENT_TYPE, mime_type)
            .body(bytes)
            .send()
            .await;
        let response = self.check(response, &what).await?;
        let body: AssetResponse = self.parse(response, &what).await?;
        Ok(UploadedAsset {
            id: body.id,
            public_url: body.public_url,
        })
    }

    async fn set_public(&self, id: &str) -> Result<(), BackendError> {
        let what = format!("set_public {id}");
        let response = self
            .client
            .post(self.url(&format!("/api/resources/{id}/permissions/public")))
            .bearer_auth(&self.api_token)
            .send()
            .await;
        self.check(response, &what).await?;
        Ok(())
    }

    fn accepts_mime(&self, mime_type: &str) -> bool {
        // The page API embeds raster images only; vector formats go through
        // the converter first.
        mime_type != "image/svg+xml"
    }
}
