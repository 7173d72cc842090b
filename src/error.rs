use thiserror::Error;

#[derive(Debug, Error)]
pub enum PpgsError {
    #[error("I/O error while {context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
    #[error("JSON parse error while {context}: {source}")]
    Json {
        context: &'static str,
        #[source]
        source: serde_json::Error,
    },
    #[error("{context}: {message}")]
    Runtime {
        context: &'static str,
        message: String,
    },
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("error processing stem {stem}: {source}")]
    Stem {
        stem: String,
        #[source]
        source: Box<PpgsError>,
    },
}

impl PpgsError {
    pub(crate) fn io(context: &'static str, source: std::io::Error) -> Self {
        Self::Io { context, source }
    }

    pub(crate) fn json(context: &'static str, source: serde_json::Error) -> Self {
        Self::Json { context, source }
    }

    pub(crate) fn runtime(context: &'static str, err: impl std::fmt::Display) -> Self {
        Self::Runtime {
            context,
            message: err.to_string(),
        }
    }

    pub(crate) fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Attach the stem identifier to an item-load failure so the failing
    /// recording can be located from the error message alone.
    pub(crate) fn stem(stem: impl Into<String>, source: PpgsError) -> Self {
        Self::Stem {
            stem: stem.into(),
            source: Box::new(source),
        }
    }
}
