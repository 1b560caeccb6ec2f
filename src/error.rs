use thiserror::Error;

/// Failures surfaced by the detection pipeline.
///
/// Every variant except [`DetectionError::Internal`] is caused by the client's
/// input and is terminal for the request.
#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("unsupported image format: {0:?}")]
    UnsupportedFormat(String),

    #[error("empty image payload")]
    EmptyPayload,

    #[error("invalid image data")]
    InvalidImageData,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InputValidation,
    Decode,
    Internal,
}

impl DetectionError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnsupportedFormat(_) | Self::EmptyPayload => ErrorKind::InputValidation,
            Self::InvalidImageData => ErrorKind::Decode,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn is_client_error(&self) -> bool {
        self.kind() != ErrorKind::Internal
    }
}
