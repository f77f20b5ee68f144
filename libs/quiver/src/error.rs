use quiver_abi::TypeTag;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("type mismatch: expected {expected}, vector holds {actual}")]
    TypeMismatch { expected: TypeTag, actual: TypeTag },

    #[error("type {tag} is not supported by the value codec")]
    NotSupported { tag: TypeTag },

    #[error("{what} index {index} out of bounds (len {len})")]
    OutOfBounds {
        what: &'static str,
        index: usize,
        len: usize,
    },

    #[error("result exhausted")]
    Exhausted,

    #[error("engine allocation failed: {0}")]
    Allocation(&'static str),

    #[error("engine error: {0}")]
    Engine(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
    /// Add context to the error.
    ///
    /// Context is prepended to the message of `Engine` and `Config`; other
    /// variants carry structured data and are returned unchanged.
    pub fn with_context(self, ctx: impl std::fmt::Display) -> Self {
        match self {
            Error::Engine(msg) => Error::Engine(format!("{ctx}: {msg}")),
            Error::Config(msg) => Error::Config(format!("{ctx}: {msg}")),
            other => other,
        }
    }

    pub(crate) fn out_of_bounds(what: &'static str, index: usize, len: usize) -> Self {
        Error::OutOfBounds { what, index, len }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn context_prefixes_message() {
        let err = Error::Config("missing path".into()).with_context("engine");
        assert_eq!(err.to_string(), "config error: engine: missing path");
    }

    #[test]
    fn context_keeps_structured_variants() {
        let err = Error::Exhausted.with_context("cursor");
        assert!(matches!(err, Error::Exhausted));
    }

    #[test]
    fn mismatch_names_both_types() {
        let err = Error::TypeMismatch {
            expected: TypeTag::Integer,
            actual: TypeTag::Double,
        };
        assert_eq!(
            err.to_string(),
            "type mismatch: expected INTEGER, vector holds DOUBLE"
        );
    }
}
