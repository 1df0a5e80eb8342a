use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use tracing::{debug, info};

use crate::auth::AuthMethod;
use crate::endpoint::endpoints;
use crate::error::{ProtocolError, ProtocolResult};
use crate::form::DeployForm;

/// Status and body of the deploy service's answer.
///
/// The client only reports these; a non-2xx status is not an error.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadReceipt {
    pub status: u16,
    pub body: String,
}

impl UploadReceipt {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Ships a deploy form to a remote.
#[async_trait]
pub trait UploadTransport: Send + Sync {
    async fn upload(&self, form: DeployForm) -> ProtocolResult<UploadReceipt>;
}

/// `reqwest`-backed transport posting to `{host}/app/deploy`.
#[derive(Clone, Debug)]
pub struct HttpUploadTransport {
    endpoint: String,
    auth: AuthMethod,
    client: reqwest::Client,
}

impl HttpUploadTransport {
    pub fn new(host: &str, auth: AuthMethod) -> ProtocolResult<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("dit/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            endpoint: deploy_url(host)?,
            auth,
            client,
        })
    }

    /// Full URL requests are posted to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    pub fn auth(&self) -> &AuthMethod {
        &self.auth
    }
}

#[async_trait]
impl UploadTransport for HttpUploadTransport {
    async fn upload(&self, form: DeployForm) -> ProtocolResult<UploadReceipt> {
        let archive_bytes = form.archive.as_ref().map_or(0, Vec::len);
        info!(
            endpoint = %self.endpoint,
            name = %form.name,
            tag = %form.tag,
            deleted = form.deleted.len(),
            archive_bytes,
            "uploading sources"
        );

        let mut request = self.client.post(&self.endpoint).multipart(form.into_multipart()?);
        if let Some(value) = self.auth.header_value() {
            request = request.header(AUTHORIZATION, value);
        }

        let response = request.send().await?;
        let status = response.status().as_u16();
        let body = response.text().await?;
        debug!(status, body = %body, "deploy response");
        Ok(UploadReceipt { status, body })
    }
}

/// `{host}/app/deploy`, tolerating a trailing slash on `host`.
pub fn deploy_url(host: &str) -> ProtocolResult<String> {
    let host = host.trim();
    if !(host.starts_with("http://") || host.starts_with("https://")) {
        return Err(ProtocolError::InvalidHost(host.to_string()));
    }
    Ok(format!("{}{}", host.trim_end_matches('/'), endpoints::DEPLOY))
}
