/// Errors raised while talking to the storefront or the workspace database,
/// or while reconciling one game/record.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("failed to decode {what}: {message}")]
    Decode { what: String, message: String },

    #[error("catalog entry {0} not found")]
    NotFound(String),

    #[error("invalid record {record}: {message}")]
    Validation { record: String, message: String },

    #[error("{action} failed for {entity}: {source}")]
    Entity {
        action: &'static str,
        entity: String,
        #[source]
        source: Box<SyncError>,
    },
}

impl SyncError {
    pub fn transport(msg: impl Into<String>) -> Self {
        Self::Transport(msg.into())
    }

    pub fn decode(what: impl Into<String>, message: impl ToString) -> Self {
        Self::Decode {
            what: what.into(),
            message: message.to_string(),
        }
    }

    pub fn validation(record: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Validation {
            record: record.into(),
            message: message.into(),
        }
    }

    /// Attach the name of the game or record being processed.
    pub fn for_entity(self, action: &'static str, entity: impl Into<String>) -> Self {
        Self::Entity {
            action,
            entity: entity.into(),
            source: Box::new(self),
        }
    }

    /// Unwrap entity context to the underlying error kind.
    pub fn kind(&self) -> &SyncError {
        match self {
            Self::Entity { source, .. } => source.kind(),
            other => other,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self.kind(), Self::NotFound(_))
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self.kind(), Self::Timeout(_))
    }
}

impl From<reqwest::Error> for SyncError {
    fn from(error: reqwest::Error) -> Self {
        let target = error
            .url()
            .map(|url| url.path().to_string())
            .unwrap_or_else(|| "<unknown endpoint>".to_string());
        if error.is_timeout() {
            Self::Timeout(target)
        } else if error.is_decode() {
            Self::decode(target, error)
        } else {
            Self::Transport(format!("{target}: {error}"))
        }
    }
}
