use std::fmt;

#[derive(Debug, Clone)]
pub enum LinkError {
    InvalidUrl(String),
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkError::InvalidUrl(s) => write!(f, "invalid URL: {s}"),
        }
    }
}

impl std::error::Error for LinkError {}
