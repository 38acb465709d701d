//! Decision continuation protocol
//!
//! Every decision point in the flow (admission, classification outcome,
//! stream-consumer lifecycle) reports its result by invoking a supplied
//! continuation exactly once with a [`Verdict`] and an optional
//! human-readable reason. Continuations are `FnOnce`, so the
//! exactly-once half of the contract is enforced by the type system.

use core::fmt::{self, Display, Formatter};

/// Result code reported to the host dispatch loop.
///
/// The numeric values are the host's wire constants and must not be
/// renumbered.
#[repr(u32)]
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Verdict {
    /// Not handled here; the next stage decides.
    Continue = 900,
    /// Handled and permitted.
    Ok = 906,
    /// Rejected, temporary (4xx-equivalent).
    DenySoft = 902,
    /// Rejected, permanent (5xx-equivalent).
    Deny = 901,
    /// Rejected permanently and the connection should be dropped.
    DenyDisconnect = 903,
    /// Rejected temporarily and the connection should be dropped.
    DenySoftDisconnect = 904,
}

impl Verdict {
    /// Checks whether the verdict rejects the job.
    #[must_use]
    pub const fn is_denial(self) -> bool {
        !matches!(self, Self::Continue | Self::Ok)
    }

    /// Checks whether the rejection is temporary.
    #[must_use]
    pub const fn is_soft(self) -> bool {
        matches!(self, Self::DenySoft | Self::DenySoftDisconnect)
    }

    /// Checks whether the verdict asks for the connection to be dropped.
    #[must_use]
    pub const fn disconnects(self) -> bool {
        matches!(self, Self::DenyDisconnect | Self::DenySoftDisconnect)
    }
}

impl From<Verdict> for u32 {
    fn from(value: Verdict) -> Self {
        value as Self
    }
}

impl TryFrom<u32> for Verdict {
    type Error = u32;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            900 => Ok(Self::Continue),
            901 => Ok(Self::Deny),
            902 => Ok(Self::DenySoft),
            903 => Ok(Self::DenyDisconnect),
            904 => Ok(Self::DenySoftDisconnect),
            906 => Ok(Self::Ok),
            other => Err(other),
        }
    }
}

impl Display for Verdict {
    fn fmt(&self, fmt: &mut Formatter<'_>) -> Result<(), fmt::Error> {
        write!(fmt, "{}", u32::from(*self))
    }
}
