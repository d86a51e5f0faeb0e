use dni_capture_common::handoff::HandoffError;

use crate::camera::CameraError;

const CODE_NOT_DETECTED: &str = "DNI_NOT_DETECTED";
const CODE_INSUFFICIENT_DATA: &str = "INSUFFICIENT_DATA";

#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    #[error("camera unavailable: {0}")]
    CameraAccessDenied(#[from] CameraError),
    #[error("video stream has no frame available")]
    StreamNotReady,
    #[error("upload request failed: {0}")]
    NetworkFailure(#[source] reqwest::Error),
    #[error("backend rejected the image (HTTP {status}): {}", .message.as_deref().unwrap_or("no error message"))]
    BackendRejected {
        status: u16,
        message: Option<String>,
        code: Option<String>,
    },
    #[error("backend response carried no extracted data")]
    ExtractionIncomplete,
    #[error("backend response is not valid JSON: {0}")]
    MalformedResponse(#[source] reqwest::Error),
    #[error("failed to encode capture as JPEG: {0}")]
    Encoding(#[from] image::ImageError),
    #[error("failed to hand off extracted data: {0}")]
    Handoff(#[from] HandoffError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    CameraAccessDenied,
    StreamNotReady,
    NetworkFailure,
    BackendRejected,
    ExtractionIncomplete,
    MalformedResponse,
    Encoding,
    Handoff,
}

/// Which user-facing message a failure maps to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageCategory {
    CameraAccess,
    DocumentNotDetected,
    InsufficientData,
    Connectivity,
    /// Backend message passed through to the user.
    Backend,
    Generic,
}

/// A classified failure, as surfaced to the user and kept in the controller state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Failure {
    pub kind: ErrorKind,
    pub category: MessageCategory,
    pub message: String,
}

impl CaptureError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            CaptureError::CameraAccessDenied(_) => ErrorKind::CameraAccessDenied,
            CaptureError::StreamNotReady => ErrorKind::StreamNotReady,
            CaptureError::NetworkFailure(_) => ErrorKind::NetworkFailure,
            CaptureError::BackendRejected { .. } => ErrorKind::BackendRejected,
            CaptureError::ExtractionIncomplete => ErrorKind::ExtractionIncomplete,
            CaptureError::MalformedResponse(_) => ErrorKind::MalformedResponse,
            CaptureError::Encoding(_) => ErrorKind::Encoding,
            CaptureError::Handoff(_) => ErrorKind::Handoff,
        }
    }

    pub fn category(&self) -> MessageCategory {
        match self {
            CaptureError::CameraAccessDenied(_) => MessageCategory::CameraAccess,
            CaptureError::NetworkFailure(_) => MessageCategory::Connectivity,
            CaptureError::ExtractionIncomplete => MessageCategory::InsufficientData,
            CaptureError::BackendRejected { message, code, .. } => {
                let mentions = |needle: &str| {
                    [message, code]
                        .into_iter()
                        .flatten()
                        .any(|s| s.contains(needle))
                };
                if mentions(CODE_NOT_DETECTED) {
                    MessageCategory::DocumentNotDetected
                } else if mentions(CODE_INSUFFICIENT_DATA) {
                    MessageCategory::InsufficientData
                } else {
                    MessageCategory::Backend
                }
            }
            CaptureError::StreamNotReady
            | CaptureError::MalformedResponse(_)
            | CaptureError::Encoding(_)
            | CaptureError::Handoff(_) => MessageCategory::Generic,
        }
    }

    pub fn user_message(&self) -> String {
        match self.category() {
            MessageCategory::CameraAccess => format!("Error al acceder a la cámara: {self}"),
            MessageCategory::DocumentNotDetected => "No se detectó el DNI en la imagen.\n\
                 Asegúrate de que el documento sea visible y esté bien iluminado."
                .to_string(),
            MessageCategory::InsufficientData => "No se pudieron extraer suficientes datos.\n\
                 Intenta capturar la imagen con mejor calidad e iluminación."
                .to_string(),
            MessageCategory::Connectivity => "Error de conexión con el servidor.\n\
                 Verifica que el servidor esté en funcionamiento."
                .to_string(),
            MessageCategory::Backend => match self {
                CaptureError::BackendRejected {
                    message: Some(message),
                    ..
                } if !message.trim().is_empty() => message.clone(),
                _ => "Error al procesar la imagen.".to_string(),
            },
            MessageCategory::Generic => "Error al procesar el documento.".to_string(),
        }
    }

    pub fn to_failure(&self) -> Failure {
        Failure {
            kind: self.kind(),
            category: self.category(),
            message: self.user_message(),
        }
    }
}
