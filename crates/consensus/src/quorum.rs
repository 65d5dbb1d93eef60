//! Byzantine quorum arithmetic and the round-robin primary schedule.
//!
//! With `n` validators, up to `f = (n - 1) / 3` may be faulty. Agreement needs
//! the `n - f` honest ones, which is what [`required_signatures`] returns.

use ebft_types::ValidatorIndex;

/// Largest number of faulty validators tolerated among `n`.
pub fn max_faulty(n: usize) -> usize {
    if n == 0 {
        0
    } else {
        (n - 1) / 3
    }
}

/// Minimum number of matching signatures, votes or revolt reports that
/// constitutes agreement among `n` validators.
///
/// ```rust
/// use ebft_consensus::quorum::required_signatures;
///
/// assert_eq!(required_signatures(4), 3);
/// assert_eq!(required_signatures(100), 67);
/// ```
pub fn required_signatures(n: usize) -> usize {
    n - max_faulty(n)
}

/// Primary (leader) of `round` among `n` validators.
///
/// Returns `None` for an empty validator set.
pub fn primary_for_round(round: u64, n: usize) -> Option<ValidatorIndex> {
    if n == 0 {
        None
    } else {
        Some((round % n as u64) as ValidatorIndex)
    }
}
