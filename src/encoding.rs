//! Reversible text encoding for stored values.
//!
//! This is base64, not encryption.  It hides values from a casual
//! glance at the data directory and nothing more; anyone can decode it.

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextEncoding {
    pub enabled: bool,
}

impl TextEncoding {
    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn encode(&self, data: &str) -> String {
        if !self.enabled {
            return data.to_string();
        }
        STANDARD.encode(data.as_bytes())
    }

    /// Reverses [`encode`](Self::encode).  Input that is not valid
    /// base64 (or not UTF-8 once decoded) is returned unchanged, so
    /// values written before encoding was switched on still read back.
    pub fn decode(&self, data: &str) -> String {
        if !self.enabled {
            return data.to_string();
        }
        STANDARD
            .decode(data.as_bytes())
            .ok()
            .and_then(|bytes| String::from_utf8(bytes).ok())
            .unwrap_or_else(|| data.to_string())
    }
}
