// crates/agnus/src/feedback/mod.rs
// HMAC-signed feedback tokens for 👍/👎 links under posted comments

use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;

use crate::error::Result;
use crate::storage::Storage;

type HmacSha256 = Hmac<Sha256>;

/// Developer rating of one posted comment
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackSignal {
    Accepted,
    Rejected,
}

impl FeedbackSignal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Accepted => "accepted",
            Self::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "accepted" => Some(Self::Accepted),
            "rejected" => Some(Self::Rejected),
            _ => None,
        }
    }
}

impl fmt::Display for FeedbackSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Mints and verifies feedback tokens.
///
/// Tokens are HMAC-SHA-256 over `"<commentId>:<signal>"` keyed by the
/// server secret; verification is constant-time. An empty secret counts as
/// unset so the system omits links instead of minting invalid ones.
pub struct FeedbackSigner {
    key: Vec<u8>,
    base_url: Option<String>,
}

impl FeedbackSigner {
    /// Create a signer. Returns None when the secret is missing or empty.
    pub fn new(secret: Option<&str>, base_url: Option<&str>) -> Option<Self> {
        let secret = secret?.trim();
        if secret.is_empty() {
            return None;
        }
        Some(Self {
            key: secret.as_bytes().to_vec(),
            base_url: base_url
                .map(|u| u.trim_end_matches('/').to_string())
                .filter(|u| !u.is_empty()),
        })
    }

    fn payload(comment_id: i64, signal: FeedbackSignal) -> String {
        format!("{}:{}", comment_id, signal.as_str())
    }

    /// Mint a hex token for one (comment, signal) pair
    pub fn mint(&self, comment_id: i64, signal: FeedbackSignal) -> String {
        let mut mac = HmacSha256::new_from_slice(&self.key).expect("HMAC accepts any key length");
        mac.update(Self::payload(comment_id, signal).as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    /// Verify a presented token in constant time
    pub fn verify(&self, comment_id: i64, signal: FeedbackSignal, token_hex: &str) -> bool {
        let Ok(token) = hex::decode(token_hex) else {
            return false;
        };
        let mut mac = HmacSha256::new_from_slice(&self.key).expect("HMAC accepts any key length");
        mac.update(Self::payload(comment_id, signal).as_bytes());
        mac.verify_slice(&token).is_ok()
    }

    fn feedback_url(&self, comment_id: i64, signal: FeedbackSignal) -> Option<String> {
        let base = self.base_url.as_ref()?;
        Some(format!(
            "{}/feedback?id={}&signal={}&token={}",
            base,
            comment_id,
            signal.as_str(),
            self.mint(comment_id, signal)
        ))
    }

    /// Markdown footer with both rating links, or None when no base URL is
    /// configured
    pub fn feedback_footer(&self, comment_id: i64) -> Option<String> {
        let up = self.feedback_url(comment_id, FeedbackSignal::Accepted)?;
        let down = self.feedback_url(comment_id, FeedbackSignal::Rejected)?;
        Some(format!("[👍]({}) | [👎]({})", up, down))
    }

    /// Handle a feedback request: verify the token and record the signal.
    /// Invalid tokens are refused and nothing is recorded.
    pub async fn record(
        &self,
        storage: &Storage,
        comment_id: i64,
        signal: FeedbackSignal,
        token_hex: &str,
    ) -> Result<bool> {
        if !self.verify(comment_id, signal, token_hex) {
            tracing::warn!(comment_id, "Rejected feedback request with invalid token");
            return Ok(false);
        }
        storage
            .upsert_feedback(comment_id, signal.as_str())
            .await
            .map_err(|e| crate::error::AgnusError::Storage(e.to_string()))?;
        Ok(true)
    }
}
