//! Bearer-token HTTP session against the event platform.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use reqwest::multipart::{Form, Part};
use reqwest::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::{debug, error, warn};

use crate::contract::{
    EditableKind, FileTypeDescriptor, RemoteApi, RemoteFileType, RemoteTag, RevisionReplace,
    SessionFactory, TagDescriptor, UploadedFile,
};
use crate::error::RemoteError;

/// HTTP client that sends `Authorization: Bearer <token>` on every request.
pub struct RemoteSession {
    client: Client,
}

impl RemoteSession {
    /// Build a session for `token`.
    ///
    /// With `debug` set, TLS certificates are not verified so the service can
    /// talk to a development instance with a self-signed certificate.
    pub fn new(token: &str, debug: bool) -> Result<Self, RemoteError> {
        let mut auth = HeaderValue::from_str(&format!("Bearer {token}"))
            .map_err(|e| RemoteError::Client(format!("invalid bearer token: {e}")))?;
        auth.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, auth);

        if debug {
            warn!("Debug mode: TLS certificate verification disabled for remote session");
        }

        let client = Client::builder()
            .default_headers(headers)
            .danger_accept_invalid_certs(debug)
            .build()
            .map_err(|e| RemoteError::Client(e.to_string()))?;

        Ok(Self { client })
    }

    async fn send(&self, url: &str, request: RequestBuilder) -> Result<Response, RemoteError> {
        let response = request.send().await.map_err(|e| {
            error!(url, error = %e, "Remote request failed before a response arrived");
            RemoteError::Transport {
                url: url.to_string(),
                message: e.to_string(),
            }
        })?;

        let status = response.status();
        if status.is_success() {
            debug!(url, status = status.as_u16(), "Remote call succeeded");
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        error!(url, status = status.as_u16(), body = %body, "Remote call returned an error status");
        Err(RemoteError::Status {
            url: url.to_string(),
            status: status.as_u16(),
            body,
        })
    }

    async fn send_json<T: DeserializeOwned>(
        &self,
        url: &str,
        request: RequestBuilder,
    ) -> Result<T, RemoteError> {
        let response = self.send(url, request).await?;
        response.json::<T>().await.map_err(|e| RemoteError::Decode {
            url: url.to_string(),
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl RemoteApi for RemoteSession {
    async fn list_tags(&self, url: &str) -> Result<Vec<RemoteTag>, RemoteError> {
        self.send_json(url, self.client.get(url)).await
    }

    async fn create_tag(&self, url: &str, tag: &TagDescriptor) -> Result<(), RemoteError> {
        self.send(url, self.client.post(url).json(tag)).await?;
        Ok(())
    }

    async fn list_file_types(&self, url: &str) -> Result<Vec<RemoteFileType>, RemoteError> {
        self.send_json(url, self.client.get(url)).await
    }

    async fn create_file_type(
        &self,
        url: &str,
        file_type: &FileTypeDescriptor,
    ) -> Result<(), RemoteError> {
        self.send(url, self.client.post(url).json(file_type)).await?;
        Ok(())
    }

    async fn delete(&self, url: &str) -> Result<(), RemoteError> {
        self.send(url, self.client.delete(url)).await?;
        Ok(())
    }

    async fn declare_editable_types(
        &self,
        url: &str,
        kinds: &[EditableKind],
    ) -> Result<(), RemoteError> {
        let body = serde_json::json!({ "editable_types": kinds });
        self.send(url, self.client.post(url).json(&body)).await?;
        Ok(())
    }

    async fn download(&self, url: &str) -> Result<Vec<u8>, RemoteError> {
        let response = self.send(url, self.client.get(url)).await?;
        let bytes = response.bytes().await.map_err(|e| RemoteError::Transport {
            url: url.to_string(),
            message: e.to_string(),
        })?;
        debug!(url, size = bytes.len(), "Downloaded file content");
        Ok(bytes.to_vec())
    }

    async fn upload_file(
        &self,
        url: &str,
        filename: &str,
        content_type: Option<String>,
        content: Vec<u8>,
    ) -> Result<UploadedFile, RemoteError> {
        let mut part = Part::bytes(content).file_name(filename.to_string());
        if let Some(mime) = content_type.as_deref() {
            part = part.mime_str(mime).map_err(|e| RemoteError::Client(e.to_string()))?;
        }
        let form = Form::new().part("file", part);
        self.send_json(url, self.client.post(url).multipart(form))
            .await
    }

    async fn replace_revision(
        &self,
        url: &str,
        revision: &RevisionReplace,
    ) -> Result<(), RemoteError> {
        self.send(url, self.client.post(url).json(revision)).await?;
        Ok(())
    }
}

/// Opens real [`RemoteSession`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct HttpSessionFactory {
    pub debug: bool,
}

impl HttpSessionFactory {
    pub fn new(debug: bool) -> Self {
        Self { debug }
    }
}

impl SessionFactory for HttpSessionFactory {
    fn open(&self, token: &str) -> Result<Box<dyn RemoteApi>, RemoteError> {
        Ok(Box::new(RemoteSession::new(token, self.debug)?))
    }
}
