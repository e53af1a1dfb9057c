use thiserror::Error;

#[derive(Error, Debug)]
pub enum VigilError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid tag: {0}")]
    InvalidTag(String),

    #[error("Measure '{name}' already defined as {existing}, cannot redefine as {requested}")]
    DuplicateMeasure {
        name: String,
        existing: &'static str,
        requested: &'static str,
    },

    #[error("Unknown measure: {0}")]
    UnknownMeasure(String),

    #[error("View '{0}' is already registered with a different definition")]
    ViewConflict(String),

    #[error("Invalid aggregation: {0}")]
    InvalidAggregation(String),

    #[error("Sampling rate must be between 0.0 and 1.0, got {0}")]
    InvalidSamplingRate(f64),

    #[error("Export error: {0}")]
    Export(String),

    #[error("Shutdown timed out after {timeout_ms}ms with {undelivered} spans undelivered")]
    ShutdownTimeout { undelivered: usize, timeout_ms: u64 },

    #[error("Exporter is shut down")]
    ShutDown,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Async task join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Result type alias for Vigil operations
pub type Result<T> = std::result::Result<T, VigilError>;

impl VigilError {
    /// Creates a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a new invalid tag error
    pub fn invalid_tag<S: Into<String>>(msg: S) -> Self {
        Self::InvalidTag(msg.into())
    }

    /// Creates a new invalid aggregation error
    pub fn invalid_aggregation<S: Into<String>>(msg: S) -> Self {
        Self::InvalidAggregation(msg.into())
    }

    /// Creates a new export error
    pub fn export<S: Into<String>>(msg: S) -> Self {
        Self::Export(msg.into())
    }

    /// Returns true if this error is a startup-time configuration problem
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Config(_)
                | Self::InvalidTag(_)
                | Self::DuplicateMeasure { .. }
                | Self::UnknownMeasure(_)
                | Self::ViewConflict(_)
                | Self::InvalidAggregation(_)
                | Self::InvalidSamplingRate(_)
        )
    }

    /// Returns true if this error is recoverable
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Export(_) | Self::Io(_))
    }

    /// Returns the error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::InvalidTag(_) => "tag",
            Self::DuplicateMeasure { .. } | Self::UnknownMeasure(_) => "measure",
            Self::ViewConflict(_) | Self::InvalidAggregation(_) => "view",
            Self::InvalidSamplingRate(_) => "sampling",
            Self::Export(_) => "export",
            Self::ShutdownTimeout { .. } => "timeout",
            Self::ShutDown => "lifecycle",
            Self::Io(_) => "io",
            Self::Serialization(_) => "serialization",
            Self::Join(_) => "async",
        }
    }
}
