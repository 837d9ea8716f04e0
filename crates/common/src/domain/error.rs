use thiserror::Error;

/// Why a scan envelope was rejected by the decoder.
///
/// Every variant is rooted at "invalid scan data": the message is dropped and
/// never redelivered, because malformed input cannot become valid later.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScanError {
    #[error("invalid scan data: malformed envelope: {0}")]
    MalformedEnvelope(String),

    #[error("invalid scan data: invalid IP address: {0:?}")]
    InvalidAddress(String),

    #[error("invalid scan data: port {0} out of range")]
    InvalidPort(String),

    #[error("invalid scan data: unsupported data version {0}")]
    UnsupportedVersion(i64),

    #[error("invalid scan data: payload shape does not match data version {version}")]
    PayloadTypeMismatch { version: i64 },

    #[error("invalid scan data: {0}")]
    PayloadEncoding(#[from] PayloadEncodingError),
}

impl ScanError {
    /// Stable classification used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            ScanError::MalformedEnvelope(_) => "malformed_envelope",
            ScanError::InvalidAddress(_) => "invalid_address",
            ScanError::InvalidPort(_) => "invalid_port",
            ScanError::UnsupportedVersion(_) => "unsupported_version",
            ScanError::PayloadTypeMismatch { .. } => "payload_type_mismatch",
            ScanError::PayloadEncoding(_) => "payload_encoding_error",
        }
    }
}

/// Finer sub-code for version 1 payload encoding failures.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PayloadEncodingError {
    #[error("payload is not valid base64: {0}")]
    Base64(String),

    #[error("decoded payload is not valid UTF-8")]
    Utf8,
}

/// Failure of the durable backend's connection or write path.
///
/// Not recoverable inside the worker: the message is rejected for
/// redelivery and the process exits so that supervision can restart it.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    #[error("backend connection failed: {0}")]
    Connect(String),

    #[error("backend write failed: {0}")]
    Write(String),

    #[error("backend is closed")]
    Closed,
}

impl BackendError {
    pub fn connect(err: &anyhow::Error) -> Self {
        BackendError::Connect(format!("{:#}", err))
    }

    pub fn write(err: &anyhow::Error) -> Self {
        BackendError::Write(format!("{:#}", err))
    }
}

pub type ScanResult<T> = Result<T, ScanError>;
pub type ProcessResult<T> = Result<T, BackendError>;
