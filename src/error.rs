//! Typed error handling for flow-control operations.
//!
//! This module distinguishes between:
//! - Protocol violations (out-of-contract calls) - fail fast
//! - Rate-policy oracle failures - treated as "defer", never as permission
//! - Misconfiguration - fail fast, before any data is accepted
//!
//! Consumer disconnect has no variant here on purpose: it is ordinary
//! stream lifecycle, handled by [`crate::stream::BackpressureStream`]
//! without surfacing a failure to the producer.

use thiserror::Error;

/// Top-level error type for the flow-control core.
#[derive(Debug, Error)]
pub enum FlowError {
    /// A collaborator broke the stream or queue contract.
    #[error("protocol violation: {0}")]
    Protocol(#[from] ProtocolViolation),

    /// The external rate-policy oracle errored or timed out.
    #[error("rate policy failure: {0}")]
    Policy(#[from] PolicyError),

    /// Invalid configuration, rejected before taking effect.
    #[error("misconfiguration: {0}")]
    Config(#[from] ConfigError),
}

/// Malformed upstream signal or out-of-contract call.
///
/// These fail fast with no partial state mutation.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ProtocolViolation {
    /// A chunk was pushed after the terminal end signal was emitted.
    #[error("chunk pushed after end of stream")]
    PushAfterEnd,

    /// The terminal end was forced on a stream that never had a consumer.
    #[error("end signaled with no consumer ever attached")]
    EndWithoutConsumer,
}

/// Failure of the external rate-policy oracle.
///
/// Never interpreted as permission: any oracle failure defers the job.
#[derive(Debug, Error)]
pub enum PolicyError {
    /// The oracle could not be reached or errored internally.
    #[error("rate policy unavailable: {0}")]
    Unavailable(String),

    /// The oracle query timed out.
    #[error("rate policy query timed out: {0}")]
    Timeout(String),
}

/// Invalid configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A content transform other than pass-through was requested.
    #[error("unsupported content transform: {0}")]
    UnsupportedTransform(String),

    /// The configuration text could not be parsed.
    #[error("configuration parse error: {0}")]
    Parse(String),
}

impl FlowError {
    /// Returns `true` if this is a contract violation by a collaborator.
    #[must_use]
    pub const fn is_protocol(&self) -> bool {
        matches!(self, Self::Protocol(_))
    }

    /// Returns `true` if this is a rate-policy oracle failure.
    #[must_use]
    pub const fn is_policy(&self) -> bool {
        matches!(self, Self::Policy(_))
    }

    /// Returns `true` if this is a configuration error.
    #[must_use]
    pub const fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }
}
