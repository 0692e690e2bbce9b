#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Parameter `{name}` must be a positive integer, got {value}")]
    NonPositive { name: &'static str, value: i64 },

    #[error("Validation failed: {0}")]
    Validation(String),
}
