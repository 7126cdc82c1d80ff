use thiserror::Error;

const CODE_TARGET_GROUP_NOT_FOUND: &str = "TargetGroupNotFound";
const CODE_TOO_MANY_TARGETS: &str = "TooManyTargets";
const CODE_INVALID_TARGET: &str = "InvalidTarget";
const CODE_TOO_MANY_REGISTRATIONS: &str = "TooManyRegistrationsForTargetId";

/// Errors returned by the load balancer control plane, classified by provider error code.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    #[error("target group not found: {0}")]
    TargetGroupNotFound(String),
    #[error("too many targets: {0}")]
    TooManyTargets(String),
    #[error("invalid target: {0}")]
    InvalidTarget(String),
    #[error("too many registrations for target: {0}")]
    TooManyRegistrationsForTarget(String),
    #[error("control plane request failed: {0}")]
    Other(String),
}

impl ApiError {
    /// Provider error code, used as a log field and metric label.
    pub fn code(&self) -> &'static str {
        match self {
            ApiError::TargetGroupNotFound(_) => CODE_TARGET_GROUP_NOT_FOUND,
            ApiError::TooManyTargets(_) => CODE_TOO_MANY_TARGETS,
            ApiError::InvalidTarget(_) => CODE_INVALID_TARGET,
            ApiError::TooManyRegistrationsForTarget(_) => CODE_TOO_MANY_REGISTRATIONS,
            ApiError::Other(_) => "Other",
        }
    }

    /// Classify a provider error by its wire error code.
    pub fn from_code(code: Option<&str>, message: impl Into<String>) -> Self {
        let message = message.into();
        match code {
            Some(CODE_TARGET_GROUP_NOT_FOUND) => ApiError::TargetGroupNotFound(message),
            Some(CODE_TOO_MANY_TARGETS) => ApiError::TooManyTargets(message),
            Some(CODE_INVALID_TARGET) => ApiError::InvalidTarget(message),
            Some(CODE_TOO_MANY_REGISTRATIONS) => ApiError::TooManyRegistrationsForTarget(message),
            _ => ApiError::Other(message),
        }
    }
}

#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("instance metadata request failed: {0}")]
    Imds(String),
    #[error("termination notice request failed")]
    Request(#[from] reqwest::Error),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration from environment: {0}")]
    Env(#[from] envconfig::Error),
    #[error("no target group ids configured")]
    EmptyTargetGroups,
    #[error("target group id at position {position} is empty")]
    EmptyTargetGroupId { position: usize },
    #[error("instance id is empty")]
    EmptyInstanceId,
    #[error("spot termination poll interval must be greater than zero")]
    ZeroPollInterval,
}

/// Setup failures. Each of these ends the process before any target group has been touched.
#[derive(Error, Debug)]
pub enum RegistrarError {
    #[error("invalid configuration: {0}")]
    Configuration(#[from] ConfigError),
    #[error("failed to resolve instance id")]
    IdentityResolution(#[source] MetadataError),
    #[error("failed to build metadata client")]
    MetadataClient(#[source] MetadataError),
    #[error("failed to install signal handlers")]
    Signal(#[source] std::io::Error),
}
