//! Typed calls for the backend endpoints.

use std::sync::Arc;

use reqwest::multipart::Form;
use thiserror::Error;
use tracing::info;

use crate::auth::{AuthState, LoginError, Role};
use crate::models::{
    LoginRequest, LoginResponse, Scan, ScanImage, ScanUpload, SignupRequest, SignupResponse,
};

use super::client::{progress_part, HttpClient, ProgressFn};
use super::HttpError;

const SCANS_PATH: &str = "/api/scans";

/// A failed login attempt, with a message suitable for display.
#[derive(Error, Debug)]
pub enum AuthError {
    #[error(transparent)]
    Http(#[from] HttpError),

    #[error(transparent)]
    Session(#[from] LoginError),
}

impl HttpClient {
    /// Exchange email and password for a credential and start a session.
    pub async fn login(&self, email: &str, password: &str) -> Result<AuthState, AuthError> {
        let response: LoginResponse = self
            .post("/api/login", &LoginRequest { email, password })
            .await?;
        Ok(self.session().login(&response.token)?)
    }

    /// Create an account. Returns the new account id.
    pub async fn signup(&self, email: &str, password: &str, role: Role) -> Result<String, HttpError> {
        let response: SignupResponse = self
            .post("/api/signup", &SignupRequest { email, password, role })
            .await?;
        info!(id = %response.id, role = %role, "Account created");
        Ok(response.id)
    }

    pub async fn list_scans(&self) -> Result<Vec<Scan>, HttpError> {
        self.get(SCANS_PATH).await
    }

    /// Upload one image with its scan metadata.
    pub async fn upload_scan(
        &self,
        scan: &ScanUpload,
        image: ScanImage,
        progress: Option<ProgressFn>,
    ) -> Result<(), HttpError> {
        let mut form = Form::new();
        for (name, value) in scan.fields() {
            form = form.text(name, value.to_string());
        }
        let part = progress_part(image.bytes, &image.file_name, &image.content_type, progress)?;
        form = form.part("image", part);

        self.post_multipart("/api/upload", form).await?;
        info!(file = %image.file_name, "Scan uploaded");
        Ok(())
    }

    /// Upload several images sharing the same metadata, one request each.
    /// Progress counts bytes across the whole batch. Stops at the first failure.
    pub async fn upload_scans(
        &self,
        scan: &ScanUpload,
        images: Vec<ScanImage>,
        progress: Option<ProgressFn>,
    ) -> Result<usize, HttpError> {
        let mut uploaded = 0;
        let mut offset = 0u64;
        for image in images {
            let len = image.bytes.len() as u64;
            let running = progress.as_ref().map(|progress| {
                let progress = progress.clone();
                let base = offset;
                Arc::new(move |sent: u64| progress(base + sent)) as ProgressFn
            });
            self.upload_scan(scan, image, running).await?;
            offset += len;
            uploaded += 1;
        }
        Ok(uploaded)
    }

    pub async fn delete_scan(&self, id: &str) -> Result<(), HttpError> {
        let url = self
            .config()
            .resource_endpoint(SCANS_PATH, id)
            .ok_or_else(|| HttpError::invalid_request(format!("scan id {:?}", id)))?;
        self.delete_url(url.as_str()).await?;
        info!(id, "Scan deleted");
        Ok(())
    }
}
