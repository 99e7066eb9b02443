//! Stored OAuth credential record

use chrono::{DateTime, Utc};

/// A named credential as persisted by a [`CredentialStore`](crate::storage::CredentialStore)
///
/// The blob is opaque to storage. Only the token manager knows how to read it.
#[derive(Debug, Clone, PartialEq)]
pub struct Credential {
    pub name: String,
    pub blob: Vec<u8>,
    pub expires_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Credential {
    /// Whether the credential's advisory expiry is at or before `now`
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn credential(expires_at: DateTime<Utc>) -> Credential {
        Credential {
            name: "strava".to_string(),
            blob: b"{}".to_vec(),
            expires_at,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_expiry_boundary_counts_as_expired() {
        let now = Utc::now();
        assert!(credential(now).is_expired_at(now));
        assert!(credential(now - Duration::seconds(1)).is_expired_at(now));
        assert!(!credential(now + Duration::seconds(1)).is_expired_at(now));
    }
}
