use thiserror::Error;

/// Main error type for the calibration workspace
#[derive(Error, Debug)]
pub enum ScError {
    #[error("Range error: {0}")]
    Range(#[from] RangeError),

    #[error("Simulator error: {0}")]
    Simulator(#[from] SimulatorError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Validation error: {0}")]
    Validation(String),
}

/// Calibration-range and parameter-space errors
#[derive(Error, Debug)]
pub enum RangeError {
    /// Recovered by dropping the parameter; surfaced only by strict callers.
    #[error("No calibration range for parameter {parameter} (key {key})")]
    MissingCalibrationRange { parameter: String, key: String },

    #[error("Invalid range for {key}: {message}")]
    InvalidRange { key: String, message: String },

    #[error("Malformed calibration-ranges document: {message}")]
    MalformedDocument { message: String },

    #[error("Unknown scale '{scale}' (expected \"linear\" or \"log2\")")]
    UnknownScale { scale: String },

    #[error("Duplicate parameter name: {name}")]
    DuplicateParameter { name: String },

    #[error("Cannot encode value '{value}' for {parameter}: {message}")]
    Unencodable {
        parameter: String,
        value: String,
        message: String,
    },
}

/// Failures of one simulator invocation
#[derive(Error, Debug)]
pub enum SimulatorError {
    #[error("Simulator exited with status {status:?}: {stderr}")]
    InvocationFailed { status: Option<i32>, stderr: String },

    #[error("Simulator timed out after {timeout:?}")]
    Timeout { timeout: std::time::Duration },

    #[error("Simulator produced no output")]
    EmptyOutput,

    #[error("Malformed simulator output '{output}': {message}")]
    MalformedOutput { output: String, message: String },

    #[error("Failed to spawn {program}: {message}")]
    Spawn { program: String, message: String },

    #[error("Simulator {program} is not runnable: {message}")]
    NotRunnable { program: String, message: String },
}

/// Experiment cache and calibration store errors
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Cached calibration {scheme_kind} scheme '{cached}' does not match current '{current}'")]
    InconsistentCalibrationScheme {
        scheme_kind: String,
        cached: String,
        current: String,
    },

    #[error("Unsupported calibration record version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },
}

/// Result type alias for calibration operations
pub type ScResult<T> = Result<T, ScError>;

/// Macro for creating validation errors
#[macro_export]
macro_rules! validation_error {
    ($($arg:tt)*) => {
        $crate::errors::ScError::Validation(format!($($arg)*))
    };
}

/// Macro for creating internal errors
#[macro_export]
macro_rules! internal_error {
    ($($arg:tt)*) => {
        $crate::errors::ScError::Internal(format!($($arg)*))
    };
}

/// Macro for creating configuration errors
#[macro_export]
macro_rules! config_error {
    ($($arg:tt)*) => {
        $crate::errors::ScError::Config(format!($($arg)*))
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let error = RangeError::InvalidRange {
            key: "BUFFER_SIZE".to_string(),
            message: "min == max with infinity allowed".to_string(),
        };

        assert!(error.to_string().contains("BUFFER_SIZE"));
        assert!(error.to_string().contains("infinity"));
    }

    #[test]
    fn test_error_conversion() {
        let sim_error = SimulatorError::Timeout {
            timeout: std::time::Duration::from_secs(30),
        };
        let sc_error: ScError = sim_error.into();

        match sc_error {
            ScError::Simulator(SimulatorError::Timeout { timeout }) => {
                assert_eq!(timeout.as_secs(), 30)
            }
            _ => panic!("Expected Simulator error"),
        }
    }

    #[test]
    fn test_sub_second_timeout_message() {
        let error = SimulatorError::Timeout {
            timeout: std::time::Duration::from_millis(300),
        };
        assert_eq!(error.to_string(), "Simulator timed out after 300ms");
    }

    #[test]
    fn test_macros() {
        let validation_err = validation_error!("Invalid value: {}", 42);
        assert!(matches!(validation_err, ScError::Validation(_)));
        let _internal_err = internal_error!("Something went wrong");
        let config_err = config_error!("Missing required field: {}", "simulator");
        assert!(config_err.to_string().contains("simulator"));
    }
}
