//! Credential redaction for errors and log lines.
//!
//! The API credential travels as a query parameter, so raw URLs and upstream
//! error bodies can contain it. Every error message and log line that may
//! carry a URL or upstream text must pass through [`Redactor::scrub`] before
//! being written or re-raised.

/// Fixed substitution written in place of the credential.
pub const REDACTION: &str = "<redacted>";

/// Scrubs a configured credential out of arbitrary text.
#[derive(Clone, Default)]
pub struct Redactor {
    secret: Option<String>,
}

impl Redactor {
    /// Create a redactor for the given credential. Empty credentials are
    /// ignored (scrubbing an empty string would corrupt every message).
    pub fn new(secret: Option<String>) -> Self {
        Self {
            secret: secret.filter(|s| !s.is_empty()),
        }
    }

    /// A redactor with nothing to scrub.
    pub fn none() -> Self {
        Self { secret: None }
    }

    /// Replace every occurrence of the credential with [`REDACTION`].
    pub fn scrub(&self, input: &str) -> String {
        match &self.secret {
            Some(secret) => input.replace(secret.as_str(), REDACTION),
            None => input.to_string(),
        }
    }
}

// Debug must not leak the secret.
impl std::fmt::Debug for Redactor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Redactor")
            .field("secret", &self.secret.as_ref().map(|_| REDACTION))
            .finish()
    }
}
