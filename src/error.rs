use thiserror::Error;

/// Hard upper bound on optimizer grid size
pub const MAX_COMBINATIONS: usize = 500;

#[derive(Debug, Error)]
pub enum Error {
    #[error("parameter grid expands to {count} combinations (limit {limit}); narrow the sweep")]
    TooManyCombinations { count: usize, limit: usize },

    #[error("invalid setting `{field}`: {reason}")]
    InvalidSettings { field: &'static str, reason: String },
}

pub type Result<T> = std::result::Result<T, Error>;
