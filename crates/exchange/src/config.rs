//! Exchange configuration.

use std::time::Duration;

/// Configuration for one exchange.
#[derive(Debug, Clone)]
pub struct ExchangeConfig {
    /// Base inter-phase pause. Actual pauses draw uniformly from
    /// `[transition_pause, 1.5 × transition_pause]`.
    pub transition_pause: Duration,
    /// Reply deadline for the root and branch fetch phases.
    pub cache_timeout: Duration,
    /// Reply deadline for the clock fetch phase, which may scan keys on the
    /// targets and so gets far longer.
    pub scan_timeout: Duration,
    /// Maximum branch ids carried out of RootConfirm.
    pub max_branch_results: usize,
    /// Maximum segment ids carried out of BranchConfirm.
    pub max_results: usize,
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        Self {
            transition_pause: Duration::from_millis(1000),
            cache_timeout: Duration::from_secs(60),
            scan_timeout: Duration::from_secs(600),
            max_branch_results: 16,
            max_results: 128,
        }
    }
}
