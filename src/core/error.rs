//! Error taxonomy for talking to the OpenRouter gateway.

use std::error::Error;
use std::fmt;

/// Failures surfaced by the API client and the streaming pipeline.
///
/// `InvalidUrl` indicates a configuration defect and should never occur with
/// the built-in base URL. `Http` carries the status code plus a best-effort
/// message extracted from the gateway's structured error body.
#[derive(Debug)]
pub enum OpenRouterError {
    NoApiKey,
    InvalidUrl(String),
    InvalidResponse,
    Http { status: u16, message: String },
    Decoding(serde_json::Error),
    Network(reqwest::Error),
}

impl fmt::Display for OpenRouterError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OpenRouterError::NoApiKey => {
                write!(
                    f,
                    "No API key configured. Run `dramatis auth` to store your OpenRouter API key."
                )
            }
            OpenRouterError::InvalidUrl(url) => write!(f, "Invalid API URL: {url}"),
            OpenRouterError::InvalidResponse => write!(f, "Invalid response from server"),
            OpenRouterError::Http { status, message } => {
                write!(f, "API error ({status}): {message}")
            }
            OpenRouterError::Decoding(err) => write!(f, "Failed to decode response: {err}"),
            OpenRouterError::Network(err) => write!(f, "Network error: {err}"),
        }
    }
}

impl Error for OpenRouterError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            OpenRouterError::Decoding(err) => Some(err),
            OpenRouterError::Network(err) => Some(err),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for OpenRouterError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            // reqwest wraps serde failures from `.json()`; report them as
            // decoding problems rather than transport ones.
            OpenRouterError::InvalidResponse
        } else {
            OpenRouterError::Network(err)
        }
    }
}

impl From<serde_json::Error> for OpenRouterError {
    fn from(err: serde_json::Error) -> Self {
        OpenRouterError::Decoding(err)
    }
}
