//! Error types and error handling strategy for Palisade.
//!
//! Error handling follows these principles:
//!
//! - Errors are explicit and typed (no stringly-typed errors)
//! - Internal functions return `Result` and propagate with `?`
//! - Remote-handler errors are logged at the dispatch loop and do not
//!   abort the receiving unit
//! - A negative unresolved-dependency count is a double release and
//!   asserts rather than returning an error
//!
//! # Error Categories
//!
//! - **Invalid argument**: unknown domain tag, out-of-range child index,
//!   malformed unit set, remote dependency of a kind other than read
//! - **Protocol**: malformed or unexpected frames from a peer
//! - **Resource**: transport refused a frame, queue closed
//! - **Internal**: broken invariants in the dependency table

use core::fmt;

/// The kind of error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    // === Invalid argument ===
    /// Caller passed an argument the core cannot act on.
    InvalidArgument,
    /// A domain tag did not resolve to a domain in the locality tree.
    UnknownDomainTag,
    /// A unit id outside the team was referenced.
    UnknownUnit,
    /// A peer asked for a remote dependency of a kind other than a read.
    UnsupportedRemoteDep,

    // === Protocol ===
    /// A frame could not be decoded.
    MalformedFrame,
    /// A decoded frame violates the dependency protocol.
    ProtocolViolation,

    // === Resource ===
    /// The transport could not accept an outgoing frame.
    TransportClosed,

    // === Internal ===
    /// A dependency-table or scheduler invariant was broken.
    Internal,
}

impl ErrorKind {
    /// Returns `true` if the error is caused by caller input.
    #[must_use]
    pub const fn is_invalid_argument(self) -> bool {
        matches!(
            self,
            Self::InvalidArgument
                | Self::UnknownDomainTag
                | Self::UnknownUnit
                | Self::UnsupportedRemoteDep
        )
    }

    /// Returns `true` if the error came from a peer rather than this unit.
    #[must_use]
    pub const fn is_protocol(self) -> bool {
        matches!(self, Self::MalformedFrame | Self::ProtocolViolation)
    }

    /// Short static description of the kind.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidArgument => "invalid argument",
            Self::UnknownDomainTag => "unknown domain tag",
            Self::UnknownUnit => "unknown unit",
            Self::UnsupportedRemoteDep => "unsupported remote dependency kind",
            Self::MalformedFrame => "malformed frame",
            Self::ProtocolViolation => "protocol violation",
            Self::TransportClosed => "transport closed",
            Self::Internal => "internal invariant violation",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error raised by the dependency engine.
#[derive(Debug, Clone)]
pub struct Error {
    kind: ErrorKind,
    detail: Option<String>,
}

impl Error {
    /// Creates an error of the given kind with no detail.
    #[must_use]
    pub const fn new(kind: ErrorKind) -> Self {
        Self { kind, detail: None }
    }

    /// Creates an error of the given kind with a detail message.
    #[must_use]
    pub fn with_detail(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self {
            kind,
            detail: Some(detail.into()),
        }
    }

    /// Returns the error kind.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Returns the detail message, if any.
    #[must_use]
    pub fn detail(&self) -> Option<&str> {
        self.detail.as_deref()
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.detail {
            Some(detail) => write!(f, "{}: {detail}", self.kind),
            None => fmt::Display::fmt(&self.kind, f),
        }
    }
}

impl std::error::Error for Error {}

impl From<ErrorKind> for Error {
    fn from(kind: ErrorKind) -> Self {
        Self::new(kind)
    }
}

/// Result alias used throughout the crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_categories() {
        assert!(ErrorKind::UnknownDomainTag.is_invalid_argument());
        assert!(ErrorKind::UnsupportedRemoteDep.is_invalid_argument());
        assert!(ErrorKind::MalformedFrame.is_protocol());
        assert!(!ErrorKind::Internal.is_protocol());
    }

    #[test]
    fn display_includes_detail() {
        let err = Error::with_detail(ErrorKind::UnknownDomainTag, ".1.9");
        assert_eq!(err.to_string(), "unknown domain tag: .1.9");
        assert_eq!(
            Error::new(ErrorKind::Internal).to_string(),
            "internal invariant violation"
        );
    }
}
