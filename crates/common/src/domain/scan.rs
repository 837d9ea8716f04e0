use crate::domain::{PayloadEncodingError, ScanError, ScanResult};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::net::IpAddr;

/// Payload field carried by version 1 envelopes (base64 of UTF-8 bytes).
pub const V1_PAYLOAD_FIELD: &str = "response_bytes_utf8";
/// Payload field carried by version 2 envelopes (plain string).
pub const V2_PAYLOAD_FIELD: &str = "response_str";

/// Raw scan result as received from the broker. Untrusted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScanEnvelope {
    pub ip: String,
    /// Any JSON number; range is checked during validation.
    pub port: serde_json::Number,
    pub service: String,
    pub timestamp: i64,
    pub data_version: i64,
    pub data: serde_json::Value,
}

/// Known payload schema versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataVersion {
    V1 = 1,
    V2 = 2,
}

impl TryFrom<i64> for DataVersion {
    type Error = ScanError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(DataVersion::V1),
            2 => Ok(DataVersion::V2),
            other => Err(ScanError::UnsupportedVersion(other)),
        }
    }
}

/// Validated, normalized scan result handed to the processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRecord {
    pub address: IpAddr,
    pub port: u16,
    pub service: String,
    pub timestamp: DateTime<Utc>,
    pub payload: String,
}

impl ScanRecord {
    /// Decode and validate one raw message.
    ///
    /// Checks run in a fixed order and the first failure wins: envelope
    /// structure (including a representable timestamp), address, port, data
    /// version, payload shape, then (version 1 only) base64 and UTF-8 validity. Holds no state; safe to call from any
    /// number of workers at once.
    pub fn decode(bytes: &[u8]) -> ScanResult<ScanRecord> {
        let envelope: ScanEnvelope = serde_json::from_slice(bytes)
            .map_err(|e| ScanError::MalformedEnvelope(e.to_string()))?;
        ScanRecord::try_from(envelope)
    }
}

impl TryFrom<ScanEnvelope> for ScanRecord {
    type Error = ScanError;

    fn try_from(envelope: ScanEnvelope) -> Result<Self, Self::Error> {
        let timestamp = DateTime::<Utc>::from_timestamp(envelope.timestamp, 0).ok_or_else(|| {
            ScanError::MalformedEnvelope(format!(
                "timestamp {} is out of range",
                envelope.timestamp
            ))
        })?;
        let address = parse_address(&envelope.ip)?;
        let port = parse_port(&envelope.port)?;
        let version = DataVersion::try_from(envelope.data_version)?;
        let payload = decode_payload(version, &envelope.data)?;

        Ok(ScanRecord {
            address,
            port,
            service: envelope.service,
            timestamp,
            payload,
        })
    }
}

impl fmt::Display for ScanRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {}:{}/{}: {}",
            self.timestamp.format("%m/%d %H:%M:%S"),
            self.address,
            self.port,
            self.service,
            self.payload
        )
    }
}

fn parse_address(ip: &str) -> ScanResult<IpAddr> {
    ip.parse::<IpAddr>()
        .map_err(|_| ScanError::InvalidAddress(ip.to_string()))
}

fn parse_port(port: &serde_json::Number) -> ScanResult<u16> {
    port.as_u64()
        .and_then(|p| u16::try_from(p).ok())
        .ok_or_else(|| ScanError::InvalidPort(port.to_string()))
}

fn decode_payload(version: DataVersion, data: &serde_json::Value) -> ScanResult<String> {
    let mismatch = || ScanError::PayloadTypeMismatch {
        version: version as i64,
    };

    let field = match version {
        DataVersion::V1 => V1_PAYLOAD_FIELD,
        DataVersion::V2 => V2_PAYLOAD_FIELD,
    };
    let value = data
        .as_object()
        .and_then(|map| map.get(field))
        .and_then(|value| value.as_str())
        .ok_or_else(mismatch)?;

    match version {
        DataVersion::V1 => {
            let bytes = STANDARD
                .decode(value)
                .map_err(|e| PayloadEncodingError::Base64(e.to_string()))?;
            String::from_utf8(bytes).map_err(|_| PayloadEncodingError::Utf8.into())
        }
        DataVersion::V2 => Ok(value.to_string()),
    }
}
