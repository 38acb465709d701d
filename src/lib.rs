//! Outbound delivery flow control for a mail transfer agent
//!
//! This crate provides the flow-control core that sits between a mail
//! queue and the outbound SMTP transport:
//! - [`BackpressureStream`]: moves a message body from its producer to a
//!   rate-limited sink without unbounded buffering
//! - [`DomainQueue`]: fairly schedules pending deliveries across
//!   destination domains
//! - [`BounceClassifier`]: turns a remote server's free-text failure into
//!   a retry/give-up decision
//! - [`AdmissionGate`] / [`DeliveryPipeline`]: per-job admission against
//!   an external rate-policy oracle, and the glue that ties the pieces
//!   together
//!
//! Queued state is transient and in-memory; durability belongs to the
//! surrounding spool layer.

mod admission;
mod classifier;
mod config;
mod decision;
mod domain;
mod error;
mod pipeline;
mod queue;
mod stream;
mod types;

pub use admission::{AdmissionGate, RatePolicy};
pub use classifier::{BounceCategory, BounceClassifier, BounceRule, ClassificationTable};
pub use config::FlowConfig;
pub use decision::Verdict;
pub use domain::Domain;
pub use error::{ConfigError, FlowError, PolicyError, ProtocolViolation};
pub use pipeline::DeliveryPipeline;
pub use queue::DomainQueue;
pub use stream::{BackpressureStream, BodySource, ChunkSink, ContentTransform, SinkEvent, SinkFlow};
pub use types::{Envelope, Job};
