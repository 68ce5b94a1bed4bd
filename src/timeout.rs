//! Timeout sentinels shared by every send and receive operation.
//!
//! All blocking calls in this crate take a plain [`Duration`]. Two values are
//! special: [`NO_BLOCK`] asks for a single non-blocking attempt and [`BLOCK`]
//! waits indefinitely. Implementations classify the caller's timeout through
//! [`Wait`] so the sentinels are never conflated with ordinary short
//! timeouts.

use std::time::Duration;

/// Do not block: the operation attempts once and reports a timeout if it
/// cannot make progress immediately.
pub const NO_BLOCK: Duration = Duration::ZERO;

/// Block indefinitely until the operation completes.
pub const BLOCK: Duration = Duration::MAX;

/// Wait strategy derived from a caller-supplied timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Wait {
    /// Single non-blocking attempt.
    NoBlock,
    /// Wait up to the given duration.
    Bounded(Duration),
    /// Wait until the operation completes.
    Forever,
}

impl Wait {
    pub(crate) fn classify(timeout: Duration) -> Self {
        if timeout == NO_BLOCK {
            Wait::NoBlock
        } else if timeout == BLOCK {
            Wait::Forever
        } else {
            Wait::Bounded(timeout)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sentinels_classify_as_themselves() {
        assert_eq!(Wait::classify(NO_BLOCK), Wait::NoBlock);
        assert_eq!(Wait::classify(BLOCK), Wait::Forever);
    }

    #[test]
    fn ordinary_timeouts_are_bounded() {
        let t = Duration::from_millis(10);
        assert_eq!(Wait::classify(t), Wait::Bounded(t));

        // A long-but-finite wait must not be promoted to Forever.
        let long = Duration::from_secs(3600);
        assert_eq!(Wait::classify(long), Wait::Bounded(long));
    }
}
