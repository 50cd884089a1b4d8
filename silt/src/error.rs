use std::{borrow::Cow, error, fmt, result};

/// Type alias for convenience when using the Result type with our Error.
pub type SiltResult<T> = result::Result<T, SiltError>;

/// Internal error representation with kind, description, and optional detail.
///
/// Boxed to keep the public [`SiltError`] pointer-sized on the success path.
struct ErrorInner {
    kind: ErrorKind,
    description: Cow<'static, str>,
    detail: Option<String>,
    source: Option<Box<dyn error::Error + Send + Sync>>,
}

/// Error classification for pipeline operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ErrorKind {
    /// Configuration parsing or validation failure; fatal at startup.
    ConfigurationInvalid,
    /// A broker message could not be parsed into a change event.
    SourceMessageInvalid,
    /// A value could not be cast into its destination representation.
    ConversionFailed,
    /// A fully qualified table name did not have the expected shape.
    InvalidTableName,
    /// A SQL statement against the destination failed.
    DestinationQueryFailed,
    /// The destination schema disagrees with the in-memory schema.
    DestinationSchemaMismatch,
    /// A staged-file bulk load failed.
    BulkLoadFailed,
    /// Broker acknowledgement could not be delivered.
    QueueAckFailed,
    /// Local staged-file I/O failure.
    IoFailed,
    /// JSON (de)serialization failure.
    SerializationFailed,
    /// Worker or shutdown coordination failure.
    ShutdownFailed,
    /// Error that does not fit other categories.
    Unknown,
}

impl ErrorKind {
    /// Whether a flush that failed with this kind should be retried with
    /// backoff. Permanent failures drop out of the retry loop immediately.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ErrorKind::DestinationQueryFailed
                | ErrorKind::BulkLoadFailed
                | ErrorKind::QueueAckFailed
                | ErrorKind::IoFailed
        )
    }
}

/// A stable error type for the pipeline using the boxed-inner pattern.
///
/// Construction goes through [`crate::silt_error!`] or the `From`
/// implementations below; the public surface stays stable while internal
/// details evolve.
pub struct SiltError(Box<ErrorInner>);

impl SiltError {
    /// Returns the error kind.
    pub fn kind(&self) -> ErrorKind {
        self.0.kind
    }

    /// Returns the optional dynamic detail attached to this error.
    pub fn detail(&self) -> Option<&str> {
        self.0.detail.as_deref()
    }

    /// Whether the flush retry policy should treat this error as retryable.
    pub fn is_transient(&self) -> bool {
        self.0.kind.is_transient()
    }

    /// Attaches a source error, preserving kind and description.
    pub fn with_source<E>(mut self, source: E) -> Self
    where
        E: Into<Box<dyn error::Error + Send + Sync>>,
    {
        self.0.source = Some(source.into());
        self
    }
}

impl From<(ErrorKind, &'static str)> for SiltError {
    fn from((kind, description): (ErrorKind, &'static str)) -> Self {
        SiltError(Box::new(ErrorInner {
            kind,
            description: Cow::Borrowed(description),
            detail: None,
            source: None,
        }))
    }
}

impl From<(ErrorKind, &'static str, String)> for SiltError {
    fn from((kind, description, detail): (ErrorKind, &'static str, String)) -> Self {
        SiltError(Box::new(ErrorInner {
            kind,
            description: Cow::Borrowed(description),
            detail: Some(detail),
            source: None,
        }))
    }
}

impl From<std::io::Error> for SiltError {
    fn from(err: std::io::Error) -> Self {
        SiltError::from((ErrorKind::IoFailed, "I/O operation failed")).with_source(err)
    }
}

impl From<serde_json::Error> for SiltError {
    fn from(err: serde_json::Error) -> Self {
        SiltError::from((ErrorKind::SerializationFailed, "JSON (de)serialization failed"))
            .with_source(err)
    }
}

impl fmt::Display for SiltError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.description)?;
        if let Some(detail) = &self.0.detail {
            write!(f, ": {detail}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for SiltError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SiltError")
            .field("kind", &self.0.kind)
            .field("description", &self.0.description)
            .field("detail", &self.0.detail)
            .field("source", &self.0.source)
            .finish()
    }
}

impl error::Error for SiltError {
    fn source(&self) -> Option<&(dyn error::Error + 'static)> {
        self.0
            .source
            .as_ref()
            .map(|source| source.as_ref() as &(dyn error::Error + 'static))
    }
}
