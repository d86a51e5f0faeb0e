use std::future::Future;
use std::time::Duration;

use dni_capture_common::config::UploadConfig;
use dni_capture_common::extracted::ExtractedData;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use tracing::{debug, info, warn};

use crate::error::CaptureError;

const FIELD_NAME: &str = "imagen";
const FILE_NAME: &str = "dni.jpg";
const MIME_JPEG: &str = "image/jpeg";

/// Hands a captured JPEG to the OCR backend. One request per capture session.
pub trait Uploader {
    fn upload(
        &self,
        jpeg: Vec<u8>,
    ) -> impl Future<Output = Result<ExtractedData, CaptureError>> + Send;
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    #[serde(default)]
    exito: bool,
    #[serde(default)]
    datos: Option<ExtractedData>,
    #[serde(default)]
    mensaje: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    codigo: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    #[serde(default)]
    pub servicio: Option<String>,
    #[serde(default)]
    pub version: Option<String>,
}

impl HealthStatus {
    pub fn is_ok(&self) -> bool {
        self.status.eq_ignore_ascii_case("ok")
    }
}

/// HTTP client for the DNI reading backend.
pub struct OcrClient {
    client: reqwest::Client,
    upload_url: String,
    health_url: String,
}

impl OcrClient {
    pub fn new(config: &UploadConfig) -> Result<Self, CaptureError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(CaptureError::NetworkFailure)?;
        Ok(Self {
            client,
            upload_url: config.upload_url(),
            health_url: config.health_url(),
        })
    }

    pub async fn health(&self) -> Result<HealthStatus, CaptureError> {
        let resp = self
            .client
            .get(&self.health_url)
            .send()
            .await
            .map_err(CaptureError::NetworkFailure)?;
        if !resp.status().is_success() {
            return Err(CaptureError::BackendRejected {
                status: resp.status().as_u16(),
                message: None,
                code: None,
            });
        }
        resp.json().await.map_err(CaptureError::MalformedResponse)
    }
}

impl Uploader for OcrClient {
    async fn upload(&self, jpeg: Vec<u8>) -> Result<ExtractedData, CaptureError> {
        let bytes = jpeg.len();
        let part = Part::bytes(jpeg)
            .file_name(FILE_NAME)
            .mime_str(MIME_JPEG)
            .map_err(CaptureError::NetworkFailure)?;
        let form = Form::new().part(FIELD_NAME, part);

        info!(url = self.upload_url, bytes, "uploading capture");
        let resp = self
            .client
            .post(&self.upload_url)
            .multipart(form)
            .send()
            .await
            .map_err(CaptureError::NetworkFailure)?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            let body: ErrorBody = serde_json::from_str(&text).unwrap_or_else(|e| {
                debug!(error = %e, "error response has no JSON body");
                ErrorBody::default()
            });
            warn!(
                status = status.as_u16(),
                error = body.error.as_deref(),
                code = body.codigo.as_deref(),
                "backend rejected capture"
            );
            return Err(CaptureError::BackendRejected {
                status: status.as_u16(),
                message: body.error,
                code: body.codigo,
            });
        }

        let body: UploadResponse = resp.json().await.map_err(CaptureError::MalformedResponse)?;
        match body.datos {
            Some(datos) if body.exito => {
                info!(
                    fields = datos.filled_fields(),
                    message = body.mensaje.as_deref(),
                    "document data extracted"
                );
                Ok(datos)
            }
            _ => {
                warn!(exito = body.exito, "backend answered without extracted data");
                Err(CaptureError::ExtractionIncomplete)
            }
        }
    }
}
