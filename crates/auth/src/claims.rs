use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use cockpit_core::UserId;

use crate::RoleCode;

/// Which half of a token pair a token is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenKind {
    Access,
    Refresh,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::Access => "access",
            TokenKind::Refresh => "refresh",
        }
    }
}

impl core::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// JWT claims carried by both access and refresh tokens.
///
/// Timestamps are seconds since the epoch, as registered JWT claims require.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenClaims {
    /// Subject: the username.
    pub sub: String,

    #[serde(rename = "userId")]
    pub user_id: UserId,

    pub roles: Vec<RoleCode>,

    pub iat: i64,

    pub exp: i64,

    /// Unique token id; this is what the session cache stores.
    pub jti: String,

    pub iss: String,

    pub kind: TokenKind,
}

impl TokenClaims {
    pub fn issued_at(&self) -> DateTime<Utc> {
        timestamp(self.iat)
    }

    pub fn expires_at(&self) -> DateTime<Utc> {
        timestamp(self.exp)
    }
}

fn timestamp(secs: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(secs, 0).single().unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TokenValidationError {
    #[error("token has expired")]
    Expired,

    #[error("token not yet valid (issued_at is in the future)")]
    NotYetValid,

    #[error("invalid token time window (expires_at <= issued_at)")]
    InvalidTimeWindow,
}

/// Deterministically validate the claim time window.
///
/// `leeway_secs` widens both ends to absorb clock skew between issuers.
/// Signature verification happens before this, in `TokenService`.
pub fn validate_claims(
    claims: &TokenClaims,
    now: DateTime<Utc>,
    leeway_secs: i64,
) -> Result<(), TokenValidationError> {
    if claims.exp <= claims.iat {
        return Err(TokenValidationError::InvalidTimeWindow);
    }
    let now = now.timestamp();
    if now + leeway_secs < claims.iat {
        return Err(TokenValidationError::NotYetValid);
    }
    if now - leeway_secs >= claims.exp {
        return Err(TokenValidationError::Expired);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use chrono::Duration;

    use super::*;

    fn claims(iat: DateTime<Utc>, ttl: Duration) -> TokenClaims {
        TokenClaims {
            sub: "alice".to_string(),
            user_id: UserId::new(1),
            roles: vec![RoleCode::new("EDITOR")],
            iat: iat.timestamp(),
            exp: (iat + ttl).timestamp(),
            jti: "t-1".to_string(),
            iss: "test".to_string(),
            kind: TokenKind::Access,
        }
    }

    #[test]
    fn accepts_inside_window() {
        let now = Utc::now();
        assert_eq!(validate_claims(&claims(now, Duration::hours(1)), now, 0), Ok(()));
    }

    #[test]
    fn rejects_expired() {
        let now = Utc::now();
        let c = claims(now - Duration::hours(2), Duration::hours(1));
        assert_eq!(validate_claims(&c, now, 0), Err(TokenValidationError::Expired));
    }

    #[test]
    fn expiry_is_exclusive() {
        let now = Utc::now();
        let c = claims(now - Duration::hours(1), Duration::hours(1));
        assert_eq!(validate_claims(&c, now, 0), Err(TokenValidationError::Expired));
    }

    #[test]
    fn leeway_tolerates_small_skew() {
        let now = Utc::now();
        let c = claims(now + Duration::seconds(5), Duration::hours(1));
        assert_eq!(validate_claims(&c, now, 0), Err(TokenValidationError::NotYetValid));
        assert_eq!(validate_claims(&c, now, 30), Ok(()));
    }

    #[test]
    fn rejects_inverted_window() {
        let now = Utc::now();
        let mut c = claims(now, Duration::hours(1));
        c.exp = c.iat;
        assert_eq!(validate_claims(&c, now, 0), Err(TokenValidationError::InvalidTimeWindow));
    }

    #[test]
    fn kind_and_user_id_wire_names() {
        let c = claims(Utc::now(), Duration::hours(1));
        let json = serde_json::to_value(&c).unwrap();
        assert_eq!(json["kind"], "access");
        assert_eq!(json["userId"], 1);
    }
}
