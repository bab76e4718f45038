//! Lease payload returned to the caller

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde_json::{Map, Value, json};

use crate::connection::GeneratedCredential;
use crate::ttl::ResolvedTtl;

/// Secret type tag carried by every lease from this backend.
pub const SECRET_TYPE_CREDS: &str = "creds";

/// Issued credentials plus the lease terms they were issued under.
///
/// The lease is not retained by the backend; renewal and revocation are the
/// caller's business.
#[derive(Clone)]
pub struct Lease {
    /// Username created on the target
    pub username: String,
    /// Secret for `username`
    pub password: SecretString,
    /// Role the credentials were issued for
    pub role: String,
    /// Lease duration
    pub ttl: Duration,
    /// Ceiling for renewals
    pub max_ttl: Duration,
    /// When the lease was issued
    pub issued_at: DateTime<Utc>,
    /// `issued_at + ttl`, also handed to the target as the principal expiry
    pub expires_at: DateTime<Utc>,
}

impl Lease {
    /// Secret type tag
    #[must_use]
    pub fn secret_type(&self) -> &'static str {
        SECRET_TYPE_CREDS
    }

    /// Caller-visible data: `username` and `password`.
    #[must_use]
    pub fn data(&self) -> Map<String, Value> {
        let mut data = Map::new();
        data.insert("username".into(), json!(self.username));
        data.insert("password".into(), json!(self.password.expose_secret()));
        data
    }

    /// Data kept with the lease for revocation and audit: `username` and `role`.
    #[must_use]
    pub fn internal_data(&self) -> Map<String, Value> {
        let mut data = Map::new();
        data.insert("username".into(), json!(self.username));
        data.insert("role".into(), json!(self.role));
        data
    }
}

impl fmt::Debug for Lease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lease")
            .field("username", &self.username)
            .field("role", &self.role)
            .field("ttl", &self.ttl)
            .field("max_ttl", &self.max_ttl)
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Assembles a [`Lease`].
#[derive(Debug)]
pub struct LeaseBuilder {
    role: String,
    issued_at: DateTime<Utc>,
    ttl: ResolvedTtl,
    credential: Option<GeneratedCredential>,
}

impl LeaseBuilder {
    /// Start a lease for `role`, issued now with zero TTL.
    pub fn new(role: impl Into<String>) -> Self {
        Self {
            role: role.into(),
            issued_at: Utc::now(),
            ttl: ResolvedTtl {
                ttl: Duration::ZERO,
                max_ttl: Duration::ZERO,
            },
            credential: None,
        }
    }

    /// Override the issue time.
    pub fn issued_at(mut self, at: DateTime<Utc>) -> Self {
        self.issued_at = at;
        self
    }

    /// Set the resolved TTL.
    pub fn ttl(mut self, ttl: ResolvedTtl) -> Self {
        self.ttl = ttl;
        self
    }

    /// Set the generated credential.
    pub fn credential(mut self, credential: GeneratedCredential) -> Self {
        self.credential = Some(credential);
        self
    }

    /// Expiry implied by the current issue time and TTL.
    #[must_use]
    pub fn expires_at(&self) -> DateTime<Utc> {
        expiry(self.issued_at, self.ttl.ttl)
    }

    /// Finish the lease. Without a credential the username and password are empty.
    #[must_use]
    pub fn build(self) -> Lease {
        let expires_at = self.expires_at();
        let (username, password) = self.credential.map_or_else(
            || (String::new(), SecretString::from(String::new())),
            |credential| (credential.username, credential.password),
        );
        Lease {
            username,
            password,
            role: self.role,
            ttl: self.ttl.ttl,
            max_ttl: self.ttl.max_ttl,
            issued_at: self.issued_at,
            expires_at,
        }
    }
}

fn expiry(from: DateTime<Utc>, ttl: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| from.checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
