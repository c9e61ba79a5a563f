use thiserror::Error;

/// Internal faults of the matching core. Store and cache faults are
/// absorbed inside the candidate finder (they degrade to an empty
/// radius step); callers of `match_ride` only ever see a structured
/// `MatchingResult`, never one of these.
#[derive(Debug, Error)]
pub enum MatchError {
    #[error("store error: {0}")]
    Store(String),

    #[error("cache error: {0}")]
    Cache(String),

    #[error("invalid config: {0}")]
    InvalidConfig(String),
}
