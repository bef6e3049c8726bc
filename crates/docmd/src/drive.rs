//! Google Drive v3 remote store.
//!
//! Documents are uploaded as HTML and converted by Drive into native Google
//! Docs. Drive's `version` counter serves as the revision marker.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use docmd_core::{DocInfo, RemoteError, RemoteStore};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::auth::TokenFile;

const API_BASE: &str = "https://www.googleapis.com/drive/v3";
const UPLOAD_BASE: &str = "https://www.googleapis.com/upload/drive/v3";
const DOC_MIME_TYPE: &str = "application/vnd.google-apps.document";
const FILE_FIELDS: &str = "id,name,webViewLink,modifiedTime,version,lastModifyingUser(emailAddress)";

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveUser {
    email_address: Option<String>,
}

/// The subset of a Drive `File` resource docmd asks for.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    #[serde(default)]
    name: String,
    web_view_link: Option<String>,
    modified_time: DateTime<Utc>,
    version: Option<String>,
    last_modifying_user: Option<DriveUser>,
}

impl From<DriveFile> for DocInfo {
    fn from(file: DriveFile) -> Self {
        let url = file
            .web_view_link
            .unwrap_or_else(|| format!("https://docs.google.com/document/d/{}/edit", file.id));
        DocInfo {
            url,
            title: file.name,
            modified_time: file.modified_time,
            modified_by: file
                .last_modifying_user
                .and_then(|user| user.email_address)
                .filter(|email| !email.is_empty()),
            revision_id: file.version,
            id: file.id,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateMetadata<'a> {
    name: &'a str,
    mime_type: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    parents: Option<[&'a str; 1]>,
}

/// Drive REST client authorized by the stored token.
pub struct DriveClient {
    http: reqwest::Client,
    tokens: Arc<TokenFile>,
}

impl DriveClient {
    pub fn new(tokens: Arc<TokenFile>) -> Self {
        Self {
            http: reqwest::Client::new(),
            tokens,
        }
    }

    async fn request(&self, method: Method, url: &str) -> Result<RequestBuilder, RemoteError> {
        let token = self.tokens.access_token(&self.http).await?;
        Ok(self.http.request(method, url).bearer_auth(token))
    }

    async fn send(&self, id: &str, request: RequestBuilder) -> Result<Response, RemoteError> {
        let response = request
            .send()
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()))?;
        check_status(id, response).await
    }

    async fn send_for_file(&self, id: &str, request: RequestBuilder) -> Result<DocInfo, RemoteError> {
        let file: DriveFile = self
            .send(id, request)
            .await?
            .json()
            .await
            .map_err(|e| RemoteError::InvalidResponse(e.to_string()))?;
        Ok(file.into())
    }
}

#[async_trait]
impl RemoteStore for DriveClient {
    async fn create(
        &self,
        title: &str,
        content: &str,
        folder: Option<&str>,
    ) -> Result<DocInfo, RemoteError> {
        let metadata = CreateMetadata {
            name: title,
            mime_type: DOC_MIME_TYPE,
            parents: folder.map(|f| [f]),
        };
        let metadata =
            serde_json::to_string(&metadata).map_err(|e| RemoteError::InvalidResponse(e.to_string()))?;
        let boundary = new_boundary();
        let body = multipart_related(&boundary, &metadata, content);

        let url = format!("{UPLOAD_BASE}/files?uploadType=multipart&fields={FILE_FIELDS}");
        let request = self
            .request(Method::POST, &url)
            .await?
            .header(
                reqwest::header::CONTENT_TYPE,
                format!("multipart/related; boundary={boundary}"),
            )
            .body(body);
        let info = self.send_for_file(title, request).await?;
        debug!("Created Drive document {}", info.id);
        Ok(info)
    }

    async fn update(&self, id: &str, content: &str) -> Result<DocInfo, RemoteError> {
        let url = format!("{UPLOAD_BASE}/files/{id}?uploadType=media&fields={FILE_FIELDS}");
        let request = self
            .request(Method::PATCH, &url)
            .await?
            .header(reqwest::header::CONTENT_TYPE, "text/html; charset=UTF-8")
            .body(content.to_string());
        self.send_for_file(id, request).await
    }

    async fn get_info(&self, id: &str) -> Result<DocInfo, RemoteError> {
        let url = format!("{API_BASE}/files/{id}?fields={FILE_FIELDS}");
        let request = self.request(Method::GET, &url).await?;
        self.send_for_file(id, request).await
    }

    async fn delete(&self, id: &str) -> Result<(), RemoteError> {
        let url = format!("{API_BASE}/files/{id}");
        let request = self.request(Method::DELETE, &url).await?;
        self.send(id, request).await?;
        Ok(())
    }

    async fn exists(&self, id: &str) -> Result<bool, RemoteError> {
        let url = format!("{API_BASE}/files/{id}?fields=id");
        let request = self.request(Method::GET, &url).await?;
        match self.send(id, request).await {
            Ok(_) => Ok(true),
            Err(RemoteError::NotFound(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

async fn check_status(id: &str, response: Response) -> Result<Response, RemoteError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().await.unwrap_or_default();
    Err(status_error(id, status, &body))
}

fn status_error(id: &str, status: StatusCode, body: &str) -> RemoteError {
    match status {
        StatusCode::NOT_FOUND => RemoteError::NotFound(id.to_string()),
        StatusCode::UNAUTHORIZED => RemoteError::Auth(api_message(body)),
        _ => RemoteError::Http {
            status: status.as_u16(),
            message: api_message(body),
        },
    }
}

/// Pull `error.message` out of a Google API error body.
fn api_message(body: &str) -> String {
    #[derive(Deserialize)]
    struct ErrorBody {
        error: ErrorDetail,
    }
    #[derive(Deserialize)]
    struct ErrorDetail {
        message: String,
    }

    match serde_json::from_str::<ErrorBody>(body) {
        Ok(parsed) => parsed.error.message,
        Err(_) => body.trim().to_string(),
    }
}

fn new_boundary() -> String {
    let bytes: [u8; 12] = rand::random();
    format!("docmd-{}", hex::encode(bytes))
}

/// Body for a `multipart/related` upload: JSON metadata, then the HTML media.
fn multipart_related(boundary: &str, metadata: &str, html: &str) -> String {
    format!(
        "--{boundary}\r\n\
         Content-Type: application/json; charset=UTF-8\r\n\r\n\
         {metadata}\r\n\
         --{boundary}\r\n\
         Content-Type: text/html; charset=UTF-8\r\n\r\n\
         {html}\r\n\
         --{boundary}--\r\n"
    )
}
