//! Bounce-response classification
//!
//! Maps a remote server's free-text delivery failure plus the destination
//! domain to a retry/give-up category. The rules are data, not code:
//! adding a provider means adding table entries, never touching the
//! matching engine. Classification never fails; no match is itself the
//! default outcome.

use std::sync::Arc;

use ahash::AHashMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::domain::Domain;

/// Outcome category for a delivery failure response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BounceCategory {
    /// The remote server flagged the message as spam. Permanent.
    Spam,
    /// The recipient address does not exist. Permanent.
    InvalidRecipient,
    /// Nothing conclusive; the delivery was simply not made. Retry.
    NotSent,
}

impl BounceCategory {
    /// Returns `true` if the category rules out further attempts.
    #[must_use]
    pub const fn is_permanent(self) -> bool {
        matches!(self, Self::Spam | Self::InvalidRecipient)
    }

    /// Reason text reported alongside the verdict for this category.
    #[must_use]
    pub const fn reason(self) -> &'static str {
        match self {
            Self::Spam => "message refused as spam by the remote server",
            Self::InvalidRecipient => "recipient address rejected by the remote server",
            Self::NotSent => "message not sent; delivery will be retried",
        }
    }
}

/// One provider rule: a substring pattern mapped to an outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BounceRule {
    /// Substring to look for in the failure text, matched
    /// case-insensitively.
    pub pattern: String,
    /// Category assigned when the pattern matches.
    pub category: BounceCategory,
}

impl BounceRule {
    fn matches(&self, response: &str) -> bool {
        response.contains(&self.pattern.to_ascii_lowercase())
    }
}

/// Immutable classification rule table.
///
/// Loaded once from configuration; reconfiguration replaces the whole
/// table atomically via [`BounceClassifier::reload`] rather than mutating
/// it in place.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClassificationTable {
    /// Global spam-complaint signature, matched case-insensitively
    /// against the failure text before any provider rule.
    #[serde(default = "defaults::spam_signature")]
    pub spam_signature: String,

    /// Per-provider ordered rule lists, keyed by exact destination
    /// domain.
    #[serde(default)]
    pub providers: AHashMap<String, Vec<BounceRule>>,
}

impl Default for ClassificationTable {
    /// Built-in rules for the major mailbox providers, so the classifier
    /// is useful with zero configuration.
    fn default() -> Self {
        let rule = |pattern: &str, category| BounceRule {
            pattern: pattern.to_string(),
            category,
        };

        let mut providers = AHashMap::new();
        providers.insert(
            "yahoo.com".to_string(),
            vec![rule("delivery error", BounceCategory::InvalidRecipient)],
        );
        providers.insert(
            "gmail.com".to_string(),
            vec![
                rule(
                    "the email account that you tried to reach does not exist",
                    BounceCategory::InvalidRecipient,
                ),
                rule("user unknown", BounceCategory::InvalidRecipient),
            ],
        );
        providers.insert(
            "hotmail.com".to_string(),
            vec![
                rule("mailbox unavailable", BounceCategory::InvalidRecipient),
                rule("requested action not taken", BounceCategory::InvalidRecipient),
            ],
        );
        providers.insert(
            "aol.com".to_string(),
            vec![rule("recipient address rejected", BounceCategory::InvalidRecipient)],
        );

        Self {
            spam_signature: defaults::spam_signature(),
            providers,
        }
    }
}

impl ClassificationTable {
    /// Evaluate the table against a failure response for `domain`.
    ///
    /// First match wins, in this fixed order: the global spam signature,
    /// then the domain's provider rules in configured order, then the
    /// [`BounceCategory::NotSent`] default.
    #[must_use]
    pub fn classify(&self, domain: &Domain, response: &str) -> BounceCategory {
        let haystack = response.to_ascii_lowercase();

        // The spam rule is domain-independent and overrides any
        // provider-specific rule.
        if haystack.contains(&self.spam_signature.to_ascii_lowercase()) {
            return BounceCategory::Spam;
        }

        self.providers
            .get(domain.as_str())
            .and_then(|rules| rules.iter().find(|rule| rule.matches(&haystack)))
            .map_or(BounceCategory::NotSent, |rule| rule.category)
    }
}

mod defaults {
    pub fn spam_signature() -> String {
        "spam".to_string()
    }
}

/// Stateless (after configuration load) bounce classifier.
///
/// Holds the current [`ClassificationTable`] behind a read lock so a
/// reload swaps the whole table atomically while in-flight
/// classifications keep reading the table they started with.
#[derive(Debug)]
pub struct BounceClassifier {
    table: RwLock<Arc<ClassificationTable>>,
}

impl Default for BounceClassifier {
    fn default() -> Self {
        Self::new(ClassificationTable::default())
    }
}

impl BounceClassifier {
    /// Create a classifier over the given rule table.
    #[must_use]
    pub fn new(table: ClassificationTable) -> Self {
        Self {
            table: RwLock::new(Arc::new(table)),
        }
    }

    /// Classify a delivery-failure response for a destination domain.
    #[must_use]
    pub fn classify(&self, domain: &Domain, response: &str) -> BounceCategory {
        let table = Arc::clone(&self.table.read());
        let category = table.classify(domain, response);
        debug!(domain = %domain, ?category, "classified bounce response");
        category
    }

    /// Replace the whole rule table atomically.
    pub fn reload(&self, table: ClassificationTable) {
        *self.table.write() = Arc::new(table);
    }
}
