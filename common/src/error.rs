use thiserror::Error;

#[derive(Error, Debug)]
pub enum VideoStreamError {
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Resource not found: {0}")]
    ResourceNotFound(String),

    #[error("Title not found: {0}")]
    TitleNotFound(String),
}

pub type Result<T> = std::result::Result<T, VideoStreamError>;
