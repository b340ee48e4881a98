use thiserror::Error;

#[derive(Error, Debug)]
pub enum TaplogError {
    #[error("Object store error: {0}")]
    Store(String),

    #[error("Feed error: {0}")]
    Feed(String),

    #[error("Registry format error: {0}")]
    Registry(String),

    #[error("Cursor file error: {0}")]
    Cursor(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Anyhow(#[from] anyhow::Error),
}
