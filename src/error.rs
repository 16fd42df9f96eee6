use std::fmt;

#[derive(Debug)]
pub enum ComposeError {
    Configuration(String),
    Compose(String),
    Delivery { provider: String, detail: String },
    Persistence(String),
    Io(std::io::Error),
}

impl ComposeError {
    pub fn is_configuration(&self) -> bool {
        matches!(self, ComposeError::Configuration(_))
    }
}

impl fmt::Display for ComposeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComposeError::Configuration(message) => {
                write!(f, "invalid configuration: {}", message)
            }
            ComposeError::Compose(message) => write!(f, "pdf compose error: {}", message),
            ComposeError::Delivery { provider, detail } => {
                write!(f, "delivery via {} failed: {}", provider, detail)
            }
            ComposeError::Persistence(message) => write!(f, "persistence error: {}", message),
            ComposeError::Io(err) => write!(f, "io error: {}", err),
        }
    }
}

impl std::error::Error for ComposeError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ComposeError::Io(err) => Some(err),
            _ => None,
        }
    }
}

impl From<std::io::Error> for ComposeError {
    fn from(value: std::io::Error) -> Self {
        ComposeError::Io(value)
    }
}

impl From<lopdf::Error> for ComposeError {
    fn from(value: lopdf::Error) -> Self {
        ComposeError::Compose(value.to_string())
    }
}
