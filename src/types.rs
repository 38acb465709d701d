//! Job and envelope data model

use std::{sync::Arc, time::SystemTime};

use serde::{Deserialize, Serialize};

use crate::domain::Domain;

/// Immutable envelope snapshot for one message.
///
/// Owned by the surrounding mail-queue layer; this core only ever holds a
/// shared reference and never mutates it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    /// Envelope sender (MAIL FROM), empty for the null sender.
    pub sender: String,
    /// Envelope recipients (RCPT TO) covered by this delivery.
    pub recipients: Vec<String>,
}

impl Envelope {
    /// Create an envelope for a single recipient.
    #[must_use]
    pub fn new(sender: impl Into<String>, recipient: impl Into<String>) -> Self {
        Self {
            sender: sender.into(),
            recipients: vec![recipient.into()],
        }
    }

    /// Whether this is a null-sender (bounce) envelope.
    #[must_use]
    pub fn is_null_sender(&self) -> bool {
        self.sender.is_empty()
    }
}

/// One outbound delivery attempt for a single message to a single
/// destination domain.
///
/// Owned exclusively by the [`crate::queue::DomainQueue`] while queued;
/// ownership transfers to the transport layer while in flight; dropped on
/// terminal success or permanent failure.
#[derive(Debug, Clone)]
pub struct Job {
    /// Unique identifier for this delivery.
    pub id: ulid::Ulid,
    /// Destination domain, the grouping key for queueing and admission.
    pub domain: Domain,
    /// Shared reference to the message envelope.
    pub envelope: Arc<Envelope>,
    /// When this job was first accepted for relay.
    pub queued_at: SystemTime,
    attempts: u32,
}

impl Job {
    /// Create a new job for a message accepted for relay.
    #[must_use]
    pub fn new(domain: Domain, envelope: Arc<Envelope>) -> Self {
        Self {
            id: ulid::Ulid::new(),
            domain,
            envelope,
            queued_at: SystemTime::now(),
            attempts: 0,
        }
    }

    /// Number of delivery attempts made so far.
    #[must_use]
    pub const fn attempt_count(&self) -> u32 {
        self.attempts
    }

    /// Record a failed delivery attempt ahead of a re-enqueue.
    pub const fn record_attempt(&mut self) {
        self.attempts += 1;
    }
}
