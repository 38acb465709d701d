//! Delivery pipeline orchestration
//!
//! Ties the queue, the admission gate and the bounce classifier together:
//! jobs are submitted when accepted for relay, pulled fairly across
//! domains (or targeted by domain), gated by the rate policy, and fed
//! back in on retryable failure. The transport itself is the caller's
//! business; the pipeline hands over a permitted job and takes back the
//! outcome.

use std::sync::Arc;

use tracing::{info, warn};

use crate::{
    admission::{AdmissionGate, RatePolicy},
    classifier::{BounceCategory, BounceClassifier, ClassificationTable},
    config::FlowConfig,
    decision::Verdict,
    domain::Domain,
    queue::DomainQueue,
    types::Job,
};

/// Orchestrator for the outbound delivery flow.
///
/// Owns the [`DomainQueue`] exclusively; no other component mutates it.
pub struct DeliveryPipeline {
    queue: DomainQueue,
    gate: AdmissionGate,
    classifier: BounceClassifier,
    max_attempts: u32,
    cursor: usize,
}

impl std::fmt::Debug for DeliveryPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeliveryPipeline")
            .field("pending", &self.queue.size())
            .field("max_attempts", &self.max_attempts)
            .field("cursor", &self.cursor)
            .finish()
    }
}

impl DeliveryPipeline {
    /// Create a pipeline over the given rate-policy oracle.
    #[must_use]
    pub fn new(config: FlowConfig, policy: Arc<dyn RatePolicy>) -> Self {
        Self {
            queue: DomainQueue::new(),
            gate: AdmissionGate::new(policy),
            classifier: BounceClassifier::new(config.classifier),
            max_attempts: config.max_attempts,
            cursor: 0,
        }
    }

    /// Accept a job for relay.
    pub fn submit(&mut self, job: Job) {
        info!(domain = %job.domain, job_id = %job.id, "job queued for delivery");
        self.queue.push(job);
    }

    /// Pull the next job fairly across domains and ask the gate for
    /// permission.
    ///
    /// Domains are scanned round-robin over a sorted snapshot of the
    /// current keys, so scheduling order is deterministic. The
    /// continuation fires once per admission decision; when the queue is
    /// empty no decision is taken and the continuation is not invoked.
    /// Returns the job for transmission when permitted.
    pub async fn dispatch_next<F>(&mut self, next: F) -> Option<Job>
    where
        F: FnOnce(Verdict, Option<String>),
    {
        let mut keys = self.queue.domains();
        keys.sort_unstable_by(|a, b| a.as_str().cmp(b.as_str()));

        let job = self.queue.shift_round_robin(self.cursor, &keys)?;
        self.cursor = self.cursor.wrapping_add(1);

        self.gate.admit(&mut self.queue, job, next).await
    }

    /// Pull the head job for one domain and ask the gate for permission.
    pub async fn dispatch_domain<F>(&mut self, domain: &Domain, next: F) -> Option<Job>
    where
        F: FnOnce(Verdict, Option<String>),
    {
        let job = self.queue.dequeue_for_domain(domain)?;
        self.gate.admit(&mut self.queue, job, next).await
    }

    /// Terminal success: the job is done and dropped.
    pub fn complete(&self, job: Job) {
        info!(
            domain = %job.domain,
            job_id = %job.id,
            attempts = job.attempt_count() + 1,
            pending = self.queue.size(),
            "delivery completed"
        );
    }

    /// Feed a transport failure back into the flow.
    ///
    /// The remote server's response text is classified; permanent
    /// outcomes drop the job and report a hard denial with the category's
    /// reason, retryable outcomes re-enqueue it (or give up softly once
    /// the attempt ceiling is reached). The continuation fires exactly
    /// once.
    pub fn handle_failure<F>(&mut self, mut job: Job, response: &str, next: F)
    where
        F: FnOnce(Verdict, Option<String>),
    {
        let category = self.classifier.classify(&job.domain, response);

        match category {
            BounceCategory::Spam | BounceCategory::InvalidRecipient => {
                warn!(
                    domain = %job.domain,
                    job_id = %job.id,
                    ?category,
                    response,
                    "permanent delivery failure"
                );
                next(Verdict::Deny, Some(category.reason().to_string()));
            }
            BounceCategory::NotSent => {
                job.record_attempt();
                if job.attempt_count() < self.max_attempts {
                    info!(
                        domain = %job.domain,
                        job_id = %job.id,
                        attempts = job.attempt_count(),
                        "delivery not made, re-queueing"
                    );
                    self.queue.push(job);
                    next(Verdict::Continue, None);
                } else {
                    warn!(
                        domain = %job.domain,
                        job_id = %job.id,
                        attempts = job.attempt_count(),
                        "giving up after repeated delivery failures"
                    );
                    next(
                        Verdict::DenySoft,
                        Some(format!(
                            "delivery failed after {} attempts",
                            job.attempt_count()
                        )),
                    );
                }
            }
        }
    }

    /// Total pending job count.
    #[must_use]
    pub const fn pending(&self) -> usize {
        self.queue.size()
    }

    /// Replace the classifier's rule table atomically.
    pub fn reload_classifier(&self, table: ClassificationTable) {
        self.classifier.reload(table);
    }
}
