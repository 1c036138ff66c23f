use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Body of every non-2xx response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub message: String,
}

/// Supported output formats, keyed by identifier, with the content type each
/// one is served as.
pub type FormatList = BTreeMap<&'static str, &'static str>;
