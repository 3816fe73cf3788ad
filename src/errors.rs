use std::io;
use std::path::Path;
use thiserror::Error;

pub const USAGE: &str = "Usage: commence [--config FILE] SCRIPT_PATH DESTINATION_PATH [ARGS.json|-]";

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{}", USAGE)]
    Usage,
    #[error("not found: {0}")]
    NotFound(String),
    #[error("not a directory: {0}")]
    NotADirectory(String),
    #[error("permission denied: {0}")]
    PermissionDenied(String),
    #[error("path conflict: {0} exists and is not a directory")]
    PathConflict(String),
    #[error("directory capability {0} has been released")]
    CapabilityReleased(u64),
    #[error("missing '}}}}' for expression starting at byte {offset}")]
    UnterminatedExpression { offset: usize },
    #[error("template expression failed: {0}")]
    TemplateEval(String),
    #[error("file too large: {path} ({size} bytes, limit {limit})")]
    ResourceLimit { path: String, size: u64, limit: u64 },
    #[error("invalid target {path}: {reason}")]
    InvalidTarget { path: String, reason: &'static str },
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },
    #[error("type error: {0}")]
    Type(String),
    #[error("{0}")]
    Script(String),
}

impl AppError {
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Usage => "UsageError",
            AppError::NotFound(_)
            | AppError::NotADirectory(_)
            | AppError::PermissionDenied(_)
            | AppError::PathConflict(_)
            | AppError::CapabilityReleased(_) => "CapabilityError",
            AppError::UnterminatedExpression { .. } => "TemplateSyntaxError",
            AppError::TemplateEval(_) => "TemplateEvalError",
            AppError::ResourceLimit { .. } => "ResourceLimitError",
            AppError::InvalidTarget { .. } | AppError::Io { .. } => "IOFailure",
            AppError::Type(_) => "TypeError",
            AppError::Script(_) => "ScriptError",
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self {
            AppError::Usage => 2,
            _ => 1,
        }
    }

    /// Classifies a failure to open or create a directory.
    pub fn capability(path: &Path, err: io::Error) -> Self {
        let shown = path.display().to_string();
        match err.kind() {
            io::ErrorKind::NotFound => AppError::NotFound(shown),
            io::ErrorKind::NotADirectory => AppError::NotADirectory(shown),
            io::ErrorKind::PermissionDenied => AppError::PermissionDenied(shown),
            _ => AppError::Io {
                context: format!("failed to open directory {shown}"),
                source: err,
            },
        }
    }

    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        AppError::Io {
            context: context.into(),
            source,
        }
    }
}

pub type AppResult<T> = Result<T, AppError>;

impl From<AppError> for mlua::Error {
    fn from(err: AppError) -> Self {
        match err {
            AppError::Script(message) => mlua::Error::RuntimeError(message),
            other => mlua::Error::external(other),
        }
    }
}

impl From<mlua::Error> for AppError {
    fn from(err: mlua::Error) -> Self {
        AppError::Script(err.to_string())
    }
}
