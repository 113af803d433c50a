use std::backtrace::Backtrace;
use std::error::Error as StdError;
use std::fmt;

#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Kind {
    /// A [`crate::stream::StreamConfig`] field failed validation
    Validation,
    /// The feed answered the subscribe request with a non-success status
    Rejected,
    /// The feed sent an error frame; the stream cannot continue
    Fatal,
    /// Error related to WebSocket connections
    WebSocket,
    /// The reconnection budget ran out
    Exhausted,
    /// The stream was closed by its owner
    Closed,
    /// Internal error from dependencies
    Internal,
}

#[derive(Debug)]
pub struct Error {
    kind: Kind,
    source: Option<Box<dyn StdError + Send + Sync + 'static>>,
    backtrace: Backtrace,
}

impl Error {
    pub fn with_source<S: StdError + Send + Sync + 'static>(kind: Kind, source: S) -> Self {
        Self {
            kind,
            source: Some(Box::new(source)),
            backtrace: Backtrace::capture(),
        }
    }

    pub fn kind(&self) -> Kind {
        self.kind
    }

    pub fn backtrace(&self) -> &Backtrace {
        &self.backtrace
    }

    pub fn inner(&self) -> Option<&(dyn StdError + Send + Sync + 'static)> {
        self.source.as_deref()
    }

    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        let e = self.source.as_deref()?;
        e.downcast_ref::<E>()
    }

    pub fn validation<S: Into<String>>(field: &'static str, reason: S) -> Self {
        Validation {
            field,
            reason: reason.into(),
        }
        .into()
    }

    pub fn rejected<S: Into<String>>(code: i64, message: S) -> Self {
        Rejected {
            code,
            message: message.into(),
        }
        .into()
    }

    pub fn fatal<S: Into<String>>(message: S) -> Self {
        Fatal {
            message: message.into(),
        }
        .into()
    }

    #[must_use]
    pub fn exhausted(attempts: u32) -> Self {
        Exhausted { attempts }.into()
    }

    #[must_use]
    pub fn closed() -> Self {
        Closed.into()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.source {
            Some(src) => write!(f, "{:?}: {}", self.kind, src),
            None => write!(f, "{:?}", self.kind),
        }
    }
}

impl StdError for Error {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source
            .as_deref()
            .map(|e| e as &(dyn StdError + 'static))
    }
}

/// A configuration field that was rejected before any network activity.
#[non_exhaustive]
#[derive(Debug)]
pub struct Validation {
    pub field: &'static str,
    pub reason: String,
}

impl fmt::Display for Validation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid {}: {}", self.field, self.reason)
    }
}

impl StdError for Validation {}

/// Subscribe request answered with a non-success status.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct Rejected {
    pub code: i64,
    pub message: String,
}

impl fmt::Display for Rejected {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "subscription rejected with code {}: {}",
            self.code, self.message
        )
    }
}

impl StdError for Rejected {}

/// Error frame sent by the feed.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct Fatal {
    pub message: String,
}

impl fmt::Display for Fatal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "feed reported a fatal error: {}", self.message)
    }
}

impl StdError for Fatal {}

#[non_exhaustive]
#[derive(Debug, Clone, Copy)]
pub struct Exhausted {
    pub attempts: u32,
}

impl fmt::Display for Exhausted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "gave up reconnecting after {} attempts",
            self.attempts
        )
    }
}

impl StdError for Exhausted {}

#[non_exhaustive]
#[derive(Debug, Clone, Copy)]
pub struct Closed;

impl fmt::Display for Closed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "stream has been closed")
    }
}

impl StdError for Closed {}

impl From<Validation> for Error {
    fn from(err: Validation) -> Self {
        Error::with_source(Kind::Validation, err)
    }
}

impl From<Rejected> for Error {
    fn from(err: Rejected) -> Self {
        Error::with_source(Kind::Rejected, err)
    }
}

impl From<Fatal> for Error {
    fn from(err: Fatal) -> Self {
        Error::with_source(Kind::Fatal, err)
    }
}

impl From<Exhausted> for Error {
    fn from(err: Exhausted) -> Self {
        Error::with_source(Kind::Exhausted, err)
    }
}

impl From<Closed> for Error {
    fn from(err: Closed) -> Self {
        Error::with_source(Kind::Closed, err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::with_source(Kind::Internal, e)
    }
}
