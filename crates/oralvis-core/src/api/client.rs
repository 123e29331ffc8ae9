//! HTTP client for the OralVis backend.
//!
//! Every outbound request goes through [`HttpClient`]: it attaches the
//! session's bearer token, turns every failure into an [`HttpError`], and on
//! a 401 drops the session and tells the UI to go back to the login page.

use std::sync::Arc;

use futures::StreamExt;
use reqwest::multipart::{Form, Part};
use reqwest::{header, Body, Client, RequestBuilder, Response};
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::auth::guard::LOGIN_PATH;
use crate::auth::SessionManager;
use crate::config::Config;

use super::HttpError;

/// Upload bodies are handed to the transport in chunks of this size.
const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

/// Buffered redirect signals per subscriber.
const REDIRECT_CHANNEL_CAPACITY: usize = 16;

/// Receives the running total of body bytes handed to the transport.
pub type ProgressFn = Arc<dyn Fn(u64) + Send + Sync>;

/// Instruction for the UI layer to navigate elsewhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Redirect {
    pub to: String,
}

impl Redirect {
    pub fn login() -> Self {
        Self {
            to: LOGIN_PATH.to_string(),
        }
    }
}

/// API client.
/// Clone is cheap - reqwest::Client and the session are shared.
#[derive(Clone)]
pub struct HttpClient {
    client: Client,
    config: Arc<Config>,
    session: Arc<SessionManager>,
    redirects: broadcast::Sender<Redirect>,
}

impl HttpClient {
    pub fn new(config: Config, session: Arc<SessionManager>) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        let (redirects, _) = broadcast::channel(REDIRECT_CHANNEL_CAPACITY);

        Ok(Self {
            client,
            config: Arc::new(config),
            session,
            redirects,
        })
    }

    pub fn session(&self) -> &Arc<SessionManager> {
        &self.session
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Redirects emitted when the backend rejects the session.
    pub fn subscribe_redirects(&self) -> broadcast::Receiver<Redirect> {
        self.redirects.subscribe()
    }

    fn auth_headers(&self) -> Result<header::HeaderMap, HttpError> {
        let mut headers = header::HeaderMap::new();
        if let Some(token) = self.session.current().token() {
            let mut value = header::HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|_| HttpError::send_failed())?;
            value.set_sensitive(true);
            headers.insert(header::AUTHORIZATION, value);
        }
        Ok(headers)
    }

    /// Send a request and classify the outcome.
    async fn execute(&self, request: RequestBuilder) -> Result<Response, HttpError> {
        let response = match request.headers(self.auth_headers()?).send().await {
            Ok(response) => response,
            Err(e) => {
                let err = HttpError::from_transport(&e);
                warn!(error = %e, kind = ?err.kind, "Request failed without a response");
                return Err(err);
            }
        };

        let status = response.status();
        if status.is_success() {
            debug!(status = status.as_u16(), url = %response.url(), "Request succeeded");
            return Ok(response);
        }

        let url = response.url().clone();
        let body = response.text().await.unwrap_or_default();
        let err = HttpError::from_status(status, &body);
        warn!(status = status.as_u16(), url = %url, kind = ?err.kind, "Request rejected");

        if err.is_unauthorized() {
            self.handle_unauthorized();
        }
        Err(err)
    }

    /// Drop the session and tell the UI to show the login page.
    fn handle_unauthorized(&self) {
        self.session.logout();
        // No subscribers just means no UI is listening
        let _ = self.redirects.send(Redirect::login());
    }

    async fn read_json<T: DeserializeOwned>(response: Response) -> Result<T, HttpError> {
        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| HttpError::invalid_response(status, e))?;
        serde_json::from_str(&text).map_err(|e| HttpError::invalid_response(status, e))
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, HttpError> {
        let url = self.config.endpoint(path);
        debug!(method = "GET", url = %url, "Sending request");
        let response = self.execute(self.client.get(&url)).await?;
        Self::read_json(response).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, HttpError> {
        let url = self.config.endpoint(path);
        debug!(method = "POST", url = %url, "Sending request");
        let response = self.execute(self.client.post(&url).json(body)).await?;
        Self::read_json(response).await
    }

    /// DELETE, ignoring any response body.
    pub async fn delete(&self, path: &str) -> Result<(), HttpError> {
        self.delete_url(&self.config.endpoint(path)).await
    }

    /// DELETE an already-built absolute URL.
    pub async fn delete_url(&self, url: &str) -> Result<(), HttpError> {
        debug!(method = "DELETE", url = %url, "Sending request");
        self.execute(self.client.delete(url)).await?;
        Ok(())
    }

    /// POST a multipart form, ignoring any response body.
    pub async fn post_multipart(&self, path: &str, form: Form) -> Result<(), HttpError> {
        let url = self.config.endpoint(path);
        debug!(method = "POST", url = %url, "Sending multipart request");
        self.execute(self.client.post(&url).multipart(form)).await?;
        Ok(())
    }
}

/// File part whose bytes are streamed in chunks, reporting progress as the
/// transport pulls each one.
pub fn progress_part(
    bytes: Vec<u8>,
    file_name: &str,
    content_type: &str,
    progress: Option<ProgressFn>,
) -> Result<Part, HttpError> {
    let total = bytes.len() as u64;
    let chunks: Vec<Vec<u8>> = bytes.chunks(UPLOAD_CHUNK_SIZE).map(<[u8]>::to_vec).collect();

    let mut sent = 0u64;
    let stream = futures::stream::iter(chunks).map(move |chunk| {
        sent += chunk.len() as u64;
        if let Some(ref progress) = progress {
            progress(sent);
        }
        Ok::<_, std::io::Error>(chunk)
    });

    Part::stream_with_length(Body::wrap_stream(stream), total)
        .file_name(file_name.to_string())
        .mime_str(content_type)
        .map_err(|e| {
            warn!(error = %e, content_type, "Invalid upload content type");
            HttpError::send_failed()
        })
}
