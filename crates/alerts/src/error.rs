use std::error::Error as StdError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A mandatory CRM read failed.
    #[error(transparent)]
    Crm(#[from] replywatch_bitrix::Error),

    /// Digest delivery or another collaborator failed.
    #[error("{context}: {source}")]
    External {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },

    #[error("{message}")]
    Message { message: String },
}

impl Error {
    #[must_use]
    pub fn message(message: impl std::fmt::Display) -> Self {
        Self::Message {
            message: message.to_string(),
        }
    }

    #[must_use]
    pub fn external(
        context: impl std::fmt::Display,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::External {
            context: context.to_string(),
            source: Box::new(source),
        }
    }

    /// True when the failure came from the CRM rather than from delivery.
    #[must_use]
    pub fn is_crm(&self) -> bool {
        matches!(self, Self::Crm(_))
    }
}

impl replywatch_common::FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message { message }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

replywatch_common::impl_context!();
