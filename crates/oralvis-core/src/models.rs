//! Wire types for the scan endpoints.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::auth::Role;

/// Accept `"42"` or `42` for identifiers.
fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Value::deserialize(deserializer)? {
        Value::String(s) => Ok(s),
        Value::Number(n) => Ok(n.to_string()),
        other => Err(serde::de::Error::custom(format!(
            "expected string or number id, got {}",
            other
        ))),
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct LoginRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoginResponse {
    pub token: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct SignupRequest<'a> {
    pub email: &'a str,
    pub password: &'a str,
    pub role: Role,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SignupResponse {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
}

/// A stored scan as listed for dentists.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scan {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub patient_name: Option<String>,
    #[serde(default)]
    pub patient_id: Option<String>,
    #[serde(default)]
    pub scan_type: Option<String>,
    #[serde(default)]
    pub region: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub upload_date: Option<String>,
}

impl Scan {
    pub fn uploaded_at(&self) -> Option<DateTime<Utc>> {
        let raw = self.upload_date.as_deref()?;
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

/// Metadata sent alongside each uploaded image.
#[derive(Debug, Clone, Default)]
pub struct ScanUpload {
    pub patient_name: String,
    pub patient_id: String,
    pub scan_type: String,
    pub region: String,
}

impl ScanUpload {
    /// Multipart field names and values, in form order.
    pub fn fields(&self) -> [(&'static str, &str); 4] {
        [
            ("patientName", self.patient_name.as_str()),
            ("patientId", self.patient_id.as_str()),
            ("scanType", self.scan_type.as_str()),
            ("region", self.region.as_str()),
        ]
    }
}

/// An image file ready to upload.
#[derive(Debug, Clone)]
pub struct ScanImage {
    pub file_name: String,
    pub content_type: String,
    pub bytes: Vec<u8>,
}

impl ScanImage {
    /// Guess the content type from the file extension.
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        let file_name = file_name.into();
        let extension = file_name
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();
        let content_type = match extension.as_str() {
            "jpg" | "jpeg" => "image/jpeg",
            "png" => "image/png",
            "gif" => "image/gif",
            "webp" => "image/webp",
            "bmp" => "image/bmp",
            "tif" | "tiff" => "image/tiff",
            _ => "application/octet-stream",
        };
        Self {
            file_name,
            content_type: content_type.to_string(),
            bytes,
        }
    }
}
