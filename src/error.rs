/// Error types for catalog generation, rendering and image analysis
use std::fmt;

/// Which registry tier an access attempt was made against
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RegistryTier {
    Primary,
    TenantWorkspace,
}

impl fmt::Display for RegistryTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => write!(f, "primary"),
            Self::TenantWorkspace => write!(f, "tenant workspace"),
        }
    }
}

/// Coarse classification of a [`CatalogError`], stable across context wrapping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Parse,
    NotFound,
    Access,
    Validation,
    ExternalTool,
    Cancelled,
    Other,
}

/// Main error type for catalog operations
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    /// Malformed image reference
    #[error("invalid image reference {reference:?}: {reason}")]
    Parse { reference: String, reason: String },

    /// An entity expected in a render result is absent
    #[error("{entity} not found: {detail}")]
    NotFound { entity: String, detail: String },

    /// Registry unreachable or unauthorized for a single reference
    #[error("{reference} not accessible in {tier} registry: {reason}")]
    Access {
        reference: String,
        tier: RegistryTier,
        reason: String,
    },

    /// Every registry tier was tried and none answered
    #[error("{subject} not accessible in any registry (tried {}): {reason}", .attempts.join(", "))]
    Unreachable {
        subject: String,
        attempts: Vec<String>,
        reason: String,
    },

    /// A required field is empty or inconsistent
    #[error("validation failed: {0}")]
    Validation(String),

    /// External tool exited non-zero; carries its stderr verbatim
    #[error("{tool} failed with exit code {}: {}", .code.map(|c| c.to_string()).unwrap_or_else(|| "none".to_string()), .stderr.trim())]
    ExternalTool {
        tool: String,
        code: Option<i32>,
        stderr: String,
    },

    /// Caller-initiated abort
    #[error("operation cancelled")]
    Cancelled,

    /// Stage or image context around another error
    #[error("{context}: {source}")]
    Context {
        context: String,
        #[source]
        source: Box<CatalogError>,
    },

    /// Wrapped anyhow error for I/O and serialization failures
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub type Result<T, E = CatalogError> = std::result::Result<T, E>;

impl CatalogError {
    pub fn parse(reference: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Parse {
            reference: reference.into(),
            reason: reason.into(),
        }
    }

    pub fn not_found(entity: impl Into<String>, detail: impl Into<String>) -> Self {
        Self::NotFound {
            entity: entity.into(),
            detail: detail.into(),
        }
    }

    pub fn access(reference: impl Into<String>, tier: RegistryTier, reason: impl Into<String>) -> Self {
        Self::Access {
            reference: reference.into(),
            tier,
            reason: reason.into(),
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Wrap this error with stage or image context, keeping its kind
    pub fn context(self, context: impl Into<String>) -> Self {
        Self::Context {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Innermost error beneath any context wrappers
    pub fn root(&self) -> &CatalogError {
        match self {
            Self::Context { source, .. } => source.root(),
            other => other,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self.root() {
            Self::Parse { .. } => ErrorKind::Parse,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Access { .. } | Self::Unreachable { .. } => ErrorKind::Access,
            Self::Validation(_) => ErrorKind::Validation,
            Self::ExternalTool { .. } => ErrorKind::ExternalTool,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::Context { .. } | Self::Other(_) => ErrorKind::Other,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        self.kind() == ErrorKind::Cancelled
    }
}

impl From<std::io::Error> for CatalogError {
    fn from(err: std::io::Error) -> Self {
        CatalogError::Other(err.into())
    }
}

impl From<serde_yaml_ng::Error> for CatalogError {
    fn from(err: serde_yaml_ng::Error) -> Self {
        CatalogError::Other(err.into())
    }
}

impl From<serde_json::Error> for CatalogError {
    fn from(err: serde_json::Error) -> Self {
        CatalogError::Other(err.into())
    }
}

/// Attach context to the error side of a result
pub trait ResultExt<T> {
    fn context<C: Into<String>>(self, context: C) -> Result<T>;
    fn with_context<C: Into<String>, F: FnOnce() -> C>(self, f: F) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context<C: Into<String>>(self, context: C) -> Result<T> {
        self.map_err(|e| e.context(context))
    }

    fn with_context<C: Into<String>, F: FnOnce() -> C>(self, f: F) -> Result<T> {
        self.map_err(|e| e.context(f()))
    }
}
