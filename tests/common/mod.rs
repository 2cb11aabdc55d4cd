#![allow(dead_code)]
use promise_chain::Error;

/// Rejection reason used across the integration tests.
#[derive(Debug, Clone, PartialEq)]
pub enum Reason {
    Message(String),
    Engine(Error),
}

impl From<Error> for Reason {
    fn from(error: Error) -> Self {
        Reason::Engine(error)
    }
}

impl From<&str> for Reason {
    fn from(message: &str) -> Self {
        Reason::Message(message.to_owned())
    }
}

impl std::fmt::Display for Reason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Reason::Message(message) => f.write_str(message),
            Reason::Engine(error) => write!(f, "{}", error),
        }
    }
}
