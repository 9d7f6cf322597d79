use std::path::Path;

use thiserror::Error;

/// Failure taxonomy shared by every installer stage.
#[derive(Debug, Error)]
pub enum InstallError {
    #[error("{what} not found")]
    NotFound { what: String },

    #[error("GitHub rejected the request ({status}): {message}")]
    AuthFailure { status: u16, message: String },

    #[error("hash mismatch for {file}: expected {expected}, got {actual}")]
    Corruption {
        file: String,
        expected: String,
        actual: String,
    },

    #[error("{operation} unavailable: {details}")]
    Unavailable {
        operation: &'static str,
        details: String,
    },

    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    Invalid(String),
}

impl InstallError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    pub fn unavailable(operation: &'static str, details: impl Into<String>) -> Self {
        Self::Unavailable {
            operation,
            details: details.into(),
        }
    }

    pub fn io(context: &'static str, source: std::io::Error) -> Self {
        Self::Io { context, source }
    }

    pub fn io_with_path(context: &'static str, path: &Path, source: &std::io::Error) -> Self {
        Self::io(
            context,
            std::io::Error::new(source.kind(), format!("{}: {source}", path.display())),
        )
    }

    pub fn zip(context: &'static str, source: zip::result::ZipError) -> Self {
        let source = match source {
            zip::result::ZipError::Io(error) => error,
            other => std::io::Error::new(std::io::ErrorKind::InvalidData, other),
        };
        Self::io(context, source)
    }

    /// Build the auth error for a 401/403, worded by whether a token was sent.
    #[must_use]
    pub fn auth(status: u16, token_supplied: bool) -> Self {
        let message = if token_supplied {
            "the configured token was rejected or lacks access to this repository".to_string()
        } else {
            "rate limited or the repository is private; configure a GitHub token".to_string()
        };
        Self::AuthFailure { status, message }
    }

    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Short category label used in log lines and the final summary.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "not found",
            Self::AuthFailure { .. } => "authorization",
            Self::Corruption { .. } => "corruption",
            Self::Unavailable { .. } => "unavailable",
            Self::Io { .. } => "io",
            Self::Invalid(_) => "invalid",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::InstallError;

    #[test]
    fn auth_message_depends_on_token() {
        let with_token = InstallError::auth(401, true).to_string();
        let without_token = InstallError::auth(403, false).to_string();

        assert!(with_token.contains("token was rejected"));
        assert!(without_token.contains("configure a GitHub token"));
        assert!(without_token.contains("403"));
    }

    #[test]
    fn zip_io_errors_keep_their_kind() {
        let error = InstallError::zip(
            "failed to read archive",
            zip::result::ZipError::Io(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "denied",
            )),
        );

        assert!(matches!(
            error,
            InstallError::Io { ref source, .. } if source.kind() == std::io::ErrorKind::PermissionDenied
        ));
    }

    #[test]
    fn io_with_path_mentions_the_path() {
        let source = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let error = InstallError::io_with_path(
            "failed to open",
            std::path::Path::new("setup/app.zip"),
            &source,
        );
        assert!(error.to_string().contains("app.zip"));
        assert_eq!(error.kind(), "io");
    }
}
