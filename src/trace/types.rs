use crate::core::{Result, VigilError};
use rand::Rng;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::HashMap;
use std::fmt;
use std::time::{Duration, SystemTime};

/// Identifier shared by all spans of one trace (16 bytes, never zero)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TraceId(u128);

/// Identifier of a span within a trace (8 bytes, never zero)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SpanId(u64);

impl TraceId {
    /// Generates a fresh random trace id
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        loop {
            let id: u128 = rng.gen();
            if id != 0 {
                return TraceId(id);
            }
        }
    }

    /// Creates a TraceId from raw bytes after validation
    pub fn from_bytes(bytes: [u8; 16]) -> Result<Self> {
        let id = u128::from_be_bytes(bytes);
        if id == 0 {
            return Err(VigilError::config("TraceId cannot be all zeros"));
        }
        Ok(TraceId(id))
    }

    /// Parses the 32 character lowercase hex form
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s)
            .map_err(|e| VigilError::config(format!("Invalid TraceId '{}': {}", s, e)))?;
        let bytes: [u8; 16] = bytes.try_into().map_err(|_| {
            VigilError::config(format!("TraceId must be 16 bytes, got '{}'", s))
        })?;
        Self::from_bytes(bytes)
    }

    /// Big-endian byte representation
    pub fn to_bytes(self) -> [u8; 16] {
        self.0.to_be_bytes()
    }
}

impl fmt::Display for TraceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.to_bytes()))
    }
}

impl SpanId {
    /// Generates a fresh random span id
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        loop {
            let id: u64 = rng.gen();
            if id != 0 {
                return SpanId(id);
            }
        }
    }

    /// Creates a SpanId from raw bytes after validation
    pub fn from_bytes(bytes: [u8; 8]) -> Result<Self> {
        let id = u64::from_be_bytes(bytes);
        if id == 0 {
            return Err(VigilError::config("SpanId cannot be all zeros"));
        }
        Ok(SpanId(id))
    }

    /// Parses the 16 character lowercase hex form
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s)
            .map_err(|e| VigilError::config(format!("Invalid SpanId '{}': {}", s, e)))?;
        let bytes: [u8; 8] = bytes
            .try_into()
            .map_err(|_| VigilError::config(format!("SpanId must be 8 bytes, got '{}'", s)))?;
        Self::from_bytes(bytes)
    }

    /// Big-endian byte representation
    pub fn to_bytes(self) -> [u8; 8] {
        self.0.to_be_bytes()
    }
}

impl fmt::Display for SpanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.to_bytes()))
    }
}

macro_rules! hex_serde {
    ($ty:ty) => {
        impl Serialize for $ty {
            fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
                serializer.collect_str(self)
            }
        }

        impl<'de> Deserialize<'de> for $ty {
            fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
                let s = String::deserialize(deserializer)?;
                <$ty>::from_hex(&s).map_err(serde::de::Error::custom)
            }
        }
    };
}

hex_serde!(TraceId);
hex_serde!(SpanId);

/// Identity of a live span, the part children and samplers need.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpanContext {
    /// Trace the span belongs to
    pub trace_id: TraceId,
    /// The span itself
    pub span_id: SpanId,
    /// Head sampling decision, fixed at creation
    pub sampled: bool,
}

/// Status of a span execution
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub enum SpanStatus {
    /// No status set yet; finalized spans never carry it
    #[default]
    Unset,
    /// Span completed successfully
    Ok,
    /// Span completed with an error
    Error(String),
    /// Span was cancelled before completion
    Cancelled,
}

impl SpanStatus {
    /// Returns true if the span status indicates an error
    pub fn is_error(&self) -> bool {
        matches!(self, SpanStatus::Error(_))
    }

    /// Returns true if the span completed successfully
    pub fn is_ok(&self) -> bool {
        matches!(self, SpanStatus::Ok)
    }

    /// Returns the error message if this is an error status
    pub fn error_message(&self) -> Option<&str> {
        match self {
            SpanStatus::Error(msg) => Some(msg),
            _ => None,
        }
    }
}

/// Role of a span in the interaction it records
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SpanKind {
    /// Not specified by the caller
    #[default]
    Unspecified,
    /// Work internal to the process
    Internal,
    /// Handling of an inbound request
    Server,
    /// An outbound request
    Client,
}

/// Lifecycle of a span
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpanState {
    /// Identity assigned, not yet current
    Created,
    /// Open and current in its context
    Active,
    /// Finalized
    Ended,
}

/// A finalized span, as handed to the export coordinator
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Span {
    /// Trace this span belongs to
    pub trace_id: TraceId,
    /// Unique identifier for this span
    pub span_id: SpanId,
    /// Parent span ID if this is a child span
    pub parent_span_id: Option<SpanId>,
    /// Name of the operation this span represents
    pub name: String,
    /// Role of the span
    pub kind: SpanKind,
    /// When the span started
    pub start_time: SystemTime,
    /// When the span ended
    pub end_time: SystemTime,
    /// Status of the span execution
    pub status: SpanStatus,
    /// Key-value attributes associated with the span
    pub attributes: HashMap<String, String>,
}

impl Span {
    /// Returns true if this span is a root span (has no parent)
    pub fn is_root(&self) -> bool {
        self.parent_span_id.is_none()
    }

    /// Wall-clock duration, zero if the clock went backwards
    pub fn duration(&self) -> Duration {
        self.end_time
            .duration_since(self.start_time)
            .unwrap_or(Duration::ZERO)
    }

    /// Gets an attribute value by key
    pub fn get_attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_ids_are_nonzero_and_distinct() {
        let a = TraceId::generate();
        let b = TraceId::generate();
        assert_ne!(a, b);
        assert_ne!(a.to_bytes(), [0u8; 16]);
        assert_ne!(SpanId::generate().to_bytes(), [0u8; 8]);
    }

    #[test]
    fn test_hex_round_trip_and_validation() {
        let id = TraceId::from_hex("4bf92f3577b34da6a3ce929d0e0e4736").unwrap();
        assert_eq!(id.to_string(), "4bf92f3577b34da6a3ce929d0e0e4736");

        assert!(TraceId::from_hex("00000000000000000000000000000000").is_err());
        assert!(TraceId::from_hex("abc").is_err());
        assert!(SpanId::from_hex("00f067aa0ba902b7").is_ok());
        assert!(SpanId::from_hex("zz").is_err());
    }

    #[test]
    fn test_span_serializes_ids_as_hex() {
        let span = Span {
            trace_id: TraceId::from_hex("4bf92f3577b34da6a3ce929d0e0e4736").unwrap(),
            span_id: SpanId::from_hex("00f067aa0ba902b7").unwrap(),
            parent_span_id: None,
            name: "main".to_string(),
            kind: SpanKind::Internal,
            start_time: SystemTime::UNIX_EPOCH,
            end_time: SystemTime::UNIX_EPOCH + Duration::from_millis(5),
            status: SpanStatus::Ok,
            attributes: HashMap::new(),
        };

        let json = serde_json::to_value(&span).unwrap();
        assert_eq!(json["trace_id"], "4bf92f3577b34da6a3ce929d0e0e4736");
        assert_eq!(json["span_id"], "00f067aa0ba902b7");
        assert_eq!(span.duration(), Duration::from_millis(5));
        assert!(span.is_root());
    }
}
