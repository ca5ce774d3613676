#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP request failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Historian rejected request: {0}")]
    Api(String),
    #[error("Failed to parse historian response: {0}")]
    Parse(String),
}
