//! Domain-keyed admission queue
//!
//! Holds pending delivery jobs grouped by destination domain, with FIFO
//! order inside each domain. Extraction is either targeted by domain or
//! fair across domains via round-robin over a caller-supplied key
//! snapshot, so no single high-volume domain starves the others.

use std::collections::VecDeque;

use ahash::AHashMap;

use crate::{domain::Domain, types::Job};

/// In-memory queue of pending delivery jobs, grouped by destination
/// domain.
///
/// A domain's entry is created on the first push and removed the instant
/// its sequence empties, so an absent key and an empty sequence are
/// indistinguishable. Exclusively owned and mutated by the scheduling
/// component; contents are transient and lost on restart (durability is
/// the surrounding spool layer's job).
#[derive(Debug, Default)]
pub struct DomainQueue {
    domains: AHashMap<Domain, VecDeque<Job>>,
    total: usize,
}

impl DomainQueue {
    /// Create a new empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a job to the tail of its domain's sequence, creating the
    /// entry if absent.
    pub fn push(&mut self, job: Job) {
        self.domains.entry(job.domain.clone()).or_default().push_back(job);
        self.total += 1;
    }

    /// Remove and return the head job for `domain`.
    ///
    /// Returns `None` if no job is pending for that domain; absence is
    /// not an error.
    pub fn dequeue_for_domain(&mut self, domain: &Domain) -> Option<Job> {
        let jobs = self.domains.get_mut(domain)?;
        let job = jobs.pop_front()?;
        if jobs.is_empty() {
            self.domains.remove(domain);
        }
        self.total -= 1;
        Some(job)
    }

    /// Remove and return the first available job, scanning `domain_keys`
    /// cyclically from `start_index` and skipping domains with nothing
    /// pending.
    ///
    /// The caller supplies the key snapshot so scheduling order is
    /// deterministic and independent of the underlying map's iteration
    /// order. Returns `None` when none of the listed domains has a
    /// pending job.
    pub fn shift_round_robin(&mut self, start_index: usize, domain_keys: &[Domain]) -> Option<Job> {
        if domain_keys.is_empty() {
            return None;
        }

        let start = start_index % domain_keys.len();
        (0..domain_keys.len())
            .map(|offset| &domain_keys[(start + offset) % domain_keys.len()])
            .find_map(|domain| self.dequeue_for_domain(domain))
    }

    /// Total pending job count across all domains.
    #[must_use]
    pub const fn size(&self) -> usize {
        self.total
    }

    /// Check whether the queue is empty.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// Snapshot of the domains that currently have pending jobs.
    ///
    /// Ordering follows map iteration and is unspecified; callers that
    /// need deterministic scheduling sort or otherwise fix the order
    /// before handing it to [`Self::shift_round_robin`].
    #[must_use]
    pub fn domains(&self) -> Vec<Domain> {
        self.domains.keys().cloned().collect()
    }

    /// Number of jobs pending for a single domain.
    #[must_use]
    pub fn pending_for_domain(&self, domain: &Domain) -> usize {
        self.domains.get(domain).map_or(0, VecDeque::len)
    }
}
