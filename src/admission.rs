//! Per-job admission control
//!
//! Decides, for one job, whether it may be sent now. The rate-limit
//! policy itself lives behind the [`RatePolicy`] oracle; this module owns
//! only the check-then-reserve contract and the conservative handling of
//! oracle failures.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::{
    decision::Verdict,
    domain::Domain,
    error::PolicyError,
    queue::DomainQueue,
    types::Job,
};

/// External rate-policy oracle, keyed by destination domain.
///
/// Logically partitioned per domain key; its internal storage and
/// coordination are out of scope here.
#[async_trait]
pub trait RatePolicy: Send + Sync {
    /// Whether sending `job` now would exceed the domain's limit.
    ///
    /// Must be free of side effects: the gate may decide not to proceed.
    ///
    /// # Errors
    /// Any failure is treated by the gate as "defer", never as
    /// permission.
    async fn exceeds_limit(&self, domain: &Domain, job: &Job) -> Result<bool, PolicyError>;

    /// Reserve one send against the domain's limit.
    ///
    /// Invoked exactly once per permitted job, after a query reported no
    /// excess and before permission is signaled.
    ///
    /// # Errors
    /// A failed reservation defers the job; permission is never signaled
    /// without a completed reservation.
    async fn reserve(&self, domain: &Domain) -> Result<(), PolicyError>;
}

/// Composes the domain queue with the rate-policy oracle to decide, per
/// job, whether to send now or defer.
///
/// Holds no state of its own beyond the oracle reference and the
/// per-domain locks that serialize check-then-reserve.
pub struct AdmissionGate {
    policy: Arc<dyn RatePolicy>,
    // check-then-reserve for a domain must not interleave with another
    // admission decision for the same domain, even across await points.
    locks: DashMap<Domain, Arc<Mutex<()>>>,
}

impl std::fmt::Debug for AdmissionGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionGate")
            .field("locked_domains", &self.locks.len())
            .finish()
    }
}

impl AdmissionGate {
    /// Create a gate over the given oracle.
    #[must_use]
    pub fn new(policy: Arc<dyn RatePolicy>) -> Self {
        Self {
            policy,
            locks: DashMap::new(),
        }
    }

    fn domain_lock(&self, domain: &Domain) -> Arc<Mutex<()>> {
        self.locks
            .entry(domain.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone()
    }

    /// Decide whether `job` may be sent now.
    ///
    /// Queries the oracle at most once. If no excess is reported, the
    /// reservation is made before permission is signaled; reservation and
    /// permission are reported together, never permission without a
    /// completed reservation. On excess or oracle failure the job is
    /// returned to `queue` unchanged.
    ///
    /// The continuation is invoked exactly once: [`Verdict::Ok`] when
    /// permitted, [`Verdict::Continue`] when deferred. Returns the job
    /// for transmission when permitted.
    pub async fn admit<F>(&self, queue: &mut DomainQueue, job: Job, next: F) -> Option<Job>
    where
        F: FnOnce(Verdict, Option<String>),
    {
        let lock = self.domain_lock(&job.domain);
        let _serialized = lock.lock().await;

        match self.policy.exceeds_limit(&job.domain, &job).await {
            Ok(false) => match self.policy.reserve(&job.domain).await {
                Ok(()) => {
                    debug!(domain = %job.domain, job_id = %job.id, "admission granted");
                    next(Verdict::Ok, None);
                    Some(job)
                }
                Err(error) => defer(queue, job, next, &error),
            },
            Ok(true) => {
                debug!(domain = %job.domain, job_id = %job.id, "rate limit reached, deferring");
                queue.push(job);
                next(Verdict::Continue, Some("rate limit reached".to_string()));
                None
            }
            Err(error) => defer(queue, job, next, &error),
        }
    }
}

/// Oracle failure: conservative deferral, never implicit permission.
fn defer<F>(queue: &mut DomainQueue, job: Job, next: F, error: &PolicyError) -> Option<Job>
where
    F: FnOnce(Verdict, Option<String>),
{
    warn!(
        domain = %job.domain,
        job_id = %job.id,
        error = %error,
        "rate policy unavailable, deferring job"
    );
    queue.push(job);
    next(Verdict::Continue, Some(format!("rate policy unavailable: {error}")));
    None
}
