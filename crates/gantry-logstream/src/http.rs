//! HTTP log-service backend
//!
//! Streams live lines to the remote log service and uploads the final blob,
//! either directly (`/blob`) or through a short-lived signed link
//! (`/blob/link/upload`). Redirects are never followed: the signed-link
//! response must reach us, not be chased by the transport.

use crate::client::{encode_ndjson, LogClient};
use crate::error::{LogStreamError, Result};
use crate::retry::{Backoff, OPEN_BUDGET};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use gantry_api::{LogConfig, RemoteLine};
use reqwest::redirect::Policy;
use reqwest::Response;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;

/// Auth header expected by the log service.
const TOKEN_HEADER: &str = "X-Harness-Token";

/// Budget for the signed-link request itself.
const LINK_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Per-attempt cap for the signed-link PUT.
const LINK_UPLOAD_TIMEOUT: Duration = Duration::from_secs(60);

/// Error body shape the service returns on failures.
#[derive(Debug, Deserialize)]
struct ErrorBody {
    error_msg: Option<String>,
}

/// Signed upload link issued by the service.
#[derive(Debug, Deserialize)]
struct UploadLink {
    link: String,
    #[allow(dead_code)]
    expires: Option<String>,
}

/// Log-service client over HTTP.
pub struct HttpLogClient {
    http: reqwest::Client,
    base_url: String,
    account_id: String,
    token: String,
    indirect_upload: bool,
}

impl HttpLogClient {
    /// Build a client from the request-carried config.
    ///
    /// A TLS identity is only constructed when both the base64 PEM cert and
    /// key are present; `insecure_skip_verify` disables server verification.
    pub fn new(config: &LogConfig) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .user_agent(concat!("gantry-logstream/", env!("CARGO_PKG_VERSION")))
            .redirect(Policy::none());

        if config.insecure_skip_verify {
            builder = builder.danger_accept_invalid_certs(true);
        }

        if !config.client_cert.is_empty() && !config.client_key.is_empty() {
            let mut pem = STANDARD
                .decode(config.client_cert.trim().as_bytes())
                .map_err(|e| LogStreamError::Tls(format!("client cert: {e}")))?;
            let key = STANDARD
                .decode(config.client_key.trim().as_bytes())
                .map_err(|e| LogStreamError::Tls(format!("client key: {e}")))?;
            pem.extend_from_slice(&key);
            let identity = reqwest::Identity::from_pem(&pem)
                .map_err(|e| LogStreamError::Tls(e.to_string()))?;
            builder = builder.identity(identity);
        }

        Ok(HttpLogClient {
            http: builder.build()?,
            base_url: config.url.trim_end_matches('/').to_string(),
            account_id: config.account_id.clone(),
            token: config.token.clone(),
            indirect_upload: config.indirect_upload,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path)
    }

    fn query(&self, key: &str) -> [(&'static str, String); 2] {
        [
            ("accountID", self.account_id.clone()),
            ("key", key.to_string()),
        ]
    }

    /// Map a response to `Ok` on 2xx, otherwise decode the service error.
    async fn check(resp: Response) -> Result<Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&body)
            .ok()
            .and_then(|b| b.error_msg)
            .unwrap_or(body);
        Err(LogStreamError::Service {
            status: status.as_u16(),
            message,
        })
    }

    /// Request a signed upload link.
    async fn upload_link(&self, key: &str) -> Result<String> {
        let resp = self
            .http
            .post(self.endpoint("blob/link/upload"))
            .query(&self.query(key))
            .header(TOKEN_HEADER, &self.token)
            .timeout(LINK_REQUEST_TIMEOUT)
            .send()
            .await?;

        // The link arrives either as a redirect Location or a JSON body.
        if resp.status().is_redirection() {
            let location = resp
                .headers()
                .get(reqwest::header::LOCATION)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string);
            return location.ok_or_else(|| LogStreamError::Service {
                status: resp.status().as_u16(),
                message: "redirect without location".to_string(),
            });
        }

        let resp = Self::check(resp).await?;
        let link: UploadLink = resp.json().await?;
        Ok(link.link)
    }

    async fn put_to_link(&self, link: &str, body: Vec<u8>) -> Result<()> {
        Backoff::unbounded()
            .retry("signed-link upload", || {
                let body = body.clone();
                async move {
                    let resp = self
                        .http
                        .put(link)
                        .timeout(LINK_UPLOAD_TIMEOUT)
                        .body(body)
                        .send()
                        .await?;
                    Self::check(resp).await?;
                    Ok(())
                }
            })
            .await
    }
}

#[async_trait]
impl LogClient for HttpLogClient {
    async fn open(&self, key: &str) -> Result<()> {
        Backoff::with_budget(OPEN_BUDGET)
            .retry("stream open", || async move {
                let resp = self
                    .http
                    .post(self.endpoint("stream"))
                    .query(&self.query(key))
                    .header(TOKEN_HEADER, &self.token)
                    .send()
                    .await?;
                Self::check(resp).await?;
                Ok(())
            })
            .await?;
        debug!(key, "log stream opened");
        Ok(())
    }

    async fn write(&self, key: &str, lines: &[RemoteLine]) -> Result<()> {
        Backoff::unbounded()
            .retry("stream write", || async move {
                let resp = self
                    .http
                    .put(self.endpoint("stream"))
                    .query(&self.query(key))
                    .header(TOKEN_HEADER, &self.token)
                    .json(lines)
                    .send()
                    .await?;
                Self::check(resp).await?;
                Ok(())
            })
            .await
    }

    async fn upload(&self, key: &str, lines: &[RemoteLine]) -> Result<()> {
        let body = encode_ndjson(lines)?;
        self.upload_raw(key, body).await
    }

    async fn upload_raw(&self, key: &str, body: Vec<u8>) -> Result<()> {
        if self.indirect_upload {
            return Backoff::unbounded()
                .retry("blob upload", || {
                    let body = body.clone();
                    async move {
                        let resp = self
                            .http
                            .post(self.endpoint("blob"))
                            .query(&self.query(key))
                            .header(TOKEN_HEADER, &self.token)
                            .body(body)
                            .send()
                            .await?;
                        Self::check(resp).await?;
                        Ok(())
                    }
                })
                .await;
        }

        let link = self.upload_link(key).await?;
        debug!(key, "uploading blob via signed link");
        self.put_to_link(&link, body).await
    }

    async fn close(&self, key: &str) -> Result<()> {
        let resp = self
            .http
            .delete(self.endpoint("stream"))
            .query(&self.query(key))
            .header(TOKEN_HEADER, &self.token)
            .send()
            .await?;
        Self::check(resp).await?;
        debug!(key, "log stream closed");
        Ok(())
    }
}
