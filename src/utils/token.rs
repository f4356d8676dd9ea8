use chrono::{DateTime, Duration, Utc};
use rand::{distributions::Alphanumeric, thread_rng, Rng};

pub const INTERVIEW_TOKEN_LENGTH: usize = 32;

pub fn generate_access_token(length: usize) -> String {
    thread_rng()
        .sample_iter(&Alphanumeric)
        .take(length)
        .map(char::from)
        .collect()
}

/// A freshly minted interview-join token and the instant it stops being valid.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

pub fn issue_interview_token(now: DateTime<Utc>, ttl: Duration) -> IssuedToken {
    IssuedToken {
        token: generate_access_token(INTERVIEW_TOKEN_LENGTH),
        expires_at: now + ttl,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokens_are_alphanumeric_and_unique() {
        let a = generate_access_token(INTERVIEW_TOKEN_LENGTH);
        let b = generate_access_token(INTERVIEW_TOKEN_LENGTH);
        assert_eq!(a.len(), INTERVIEW_TOKEN_LENGTH);
        assert!(a.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(a, b);
    }

    #[test]
    fn issued_token_carries_ttl() {
        let now = Utc::now();
        let issued = issue_interview_token(now, Duration::hours(48));
        assert_eq!(issued.expires_at - now, Duration::hours(48));
    }
}
