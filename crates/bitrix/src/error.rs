use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// Error payload returned by the portal (`{"error": ..., "error_description": ...}`).
    #[error("{code}: {description}")]
    Api { code: String, description: String },

    #[error("HTTP {status} for {method}")]
    Status { status: u16, method: String },

    #[error("{method} failed: {source}")]
    Method {
        method: String,
        #[source]
        source: Box<Error>,
    },

    #[error("webhook URL is not configured")]
    MissingWebhook,

    #[error("{message}")]
    Message { message: String },
}

impl Error {
    #[must_use]
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn method(method: impl Into<String>, source: Error) -> Self {
        Self::Method {
            method: method.into(),
            source: Box::new(source),
        }
    }

    /// Portal error code, when the failure came from the API itself.
    #[must_use]
    pub fn api_code(&self) -> Option<&str> {
        match self {
            Self::Api { code, .. } => Some(code),
            Self::Method { source, .. } => source.api_code(),
            _ => None,
        }
    }
}

impl replywatch_common::FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message { message }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

replywatch_common::impl_context!();
