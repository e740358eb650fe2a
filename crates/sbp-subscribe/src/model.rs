use thiserror::Error;

#[derive(Debug, Error)]
pub enum SubsError {
    #[error("fetch error: {0}")]
    Fetch(String),
    #[error("parse error: {0}")]
    Parse(String),
    #[error("unsupported link scheme: {0}")]
    Unsupported(String),
}

/// An outbound as carried by subscription documents: the raw sing-box
/// dictionary, `type` and `tag` included.
pub type OutboundMap = serde_json::Map<String, serde_json::Value>;

/// Detected subscription document format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Singbox,
    Clash,
    Links,
}

/// Parse outcome. Individual bad entries land in `errors` and never abort
/// the rest of the document.
#[derive(Debug, Default)]
pub struct ParseOutcome {
    pub outbounds: Vec<OutboundMap>,
    pub errors: Vec<String>,
    pub format: Option<Format>,
}
