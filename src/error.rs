use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum NutritionError {
    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Navigation failed: {0}")]
    Navigation(String),

    #[error("Content marker did not appear within {0:?}")]
    ExtractionTimeout(Duration),

    #[error("Malformed field: {0}")]
    MalformedField(String),

    #[error("Invalid scale input: {0}")]
    InvalidScaleInput(String),

    #[error("Timeout after {0:?}")]
    Timeout(Duration),

    #[error("Browser launch failed: {0}")]
    BrowserLaunchFailed(String),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Page error: {0}")]
    Page(String),

    #[error("Nutrition panel not found: {0}")]
    PanelMissing(String),

    #[error("Invalid selector: {0}")]
    InvalidSelector(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("IO error: {0}")]
    Io(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl NutritionError {
    /// Short label used in log fields and the failure counter.
    pub fn kind(&self) -> &'static str {
        match self {
            NutritionError::Storage(_) => "storage",
            NutritionError::Navigation(_) => "navigation",
            NutritionError::ExtractionTimeout(_) => "extraction_timeout",
            NutritionError::MalformedField(_) => "malformed_field",
            NutritionError::InvalidScaleInput(_) => "invalid_scale_input",
            NutritionError::Timeout(_) => "timeout",
            NutritionError::BrowserLaunchFailed(_) => "browser_launch",
            NutritionError::Browser(_) => "browser",
            NutritionError::Page(_) => "page",
            NutritionError::PanelMissing(_) => "panel_missing",
            NutritionError::InvalidSelector(_) => "invalid_selector",
            NutritionError::InvalidUrl(_) => "invalid_url",
            NutritionError::InvalidRequest(_) => "invalid_request",
            NutritionError::ConfigurationError(_) => "configuration",
            NutritionError::Io(_) => "io",
            NutritionError::Serialization(_) => "serialization",
        }
    }

    /// Errors caused by the caller's input rather than the pipeline.
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            NutritionError::InvalidRequest(_) | NutritionError::InvalidUrl(_)
        )
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            NutritionError::InvalidRequest(_) | NutritionError::InvalidUrl(_) => ErrorSeverity::Low,
            NutritionError::MalformedField(_) | NutritionError::InvalidScaleInput(_) => {
                ErrorSeverity::Low
            }
            NutritionError::ConfigurationError(_) | NutritionError::InvalidSelector(_) => {
                ErrorSeverity::High
            }
            NutritionError::BrowserLaunchFailed(_) => ErrorSeverity::Critical,
            _ => ErrorSeverity::Medium,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl From<sqlx::Error> for NutritionError {
    fn from(err: sqlx::Error) -> Self {
        NutritionError::Storage(err.to_string())
    }
}

impl From<sqlx::migrate::MigrateError> for NutritionError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        NutritionError::Storage(format!("migration failed: {err}"))
    }
}

impl From<chromiumoxide::error::CdpError> for NutritionError {
    fn from(err: chromiumoxide::error::CdpError) -> Self {
        NutritionError::Page(err.to_string())
    }
}

impl From<url::ParseError> for NutritionError {
    fn from(err: url::ParseError) -> Self {
        NutritionError::InvalidUrl(err.to_string())
    }
}

impl From<std::io::Error> for NutritionError {
    fn from(err: std::io::Error) -> Self {
        NutritionError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for NutritionError {
    fn from(err: serde_json::Error) -> Self {
        NutritionError::Serialization(err.to_string())
    }
}
