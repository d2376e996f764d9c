//! Session store
//!
//! Maps an opaque bearer credential to the provider access token and a minimal
//! user profile. The credential is self-describing and signed:
//!
//! ```text
//! base64url(claims JSON) "." base64url(Blake2b-512 keyed MAC of the first part)
//! ```
//!
//! Claims carry the session id, the subject and the expiry. Expiry is checked
//! on every resolve; nothing is swept in the background.
//!
//! One profile is kept per subject. Logging in again refreshes that profile
//! and issues a new credential; credentials issued earlier for the same
//! subject keep resolving (to the refreshed profile) until they expire or are
//! destroyed.

use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use blake2::digest::{KeyInit, Mac};
use blake2::{Blake2b512, Blake2bMac512, Digest};
use chrono::{DateTime, Duration, TimeZone, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::{Result, SyncError};

/// Default credential lifetime (24 hours)
pub const DEFAULT_TTL_MINUTES: i64 = 1440;

/// Provider access token; never serialized, redacted in `Debug`
#[derive(Clone, PartialEq, Eq)]
pub struct RemoteToken(String);

impl RemoteToken {
    pub fn new(secret: impl Into<String>) -> Self {
        Self(secret.into())
    }

    pub fn secret(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Debug for RemoteToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("RemoteToken(***)")
    }
}

/// Identity returned by the provider after the OAuth exchange
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectProfile {
    /// Stable provider identity
    pub subject_id: String,
    /// Login handle
    pub handle: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
}

/// Authenticated actor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub session_id: String,
    pub subject_id: String,
    pub display_name: String,
    pub handle: String,
    pub avatar_label: String,
    pub email: Option<String>,
    pub remote_token: RemoteToken,
}

/// Caller-safe projection of a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: String,
    pub username: String,
    pub name: String,
    pub email: Option<String>,
    pub avatar: String,
}

impl Session {
    pub fn profile(&self) -> UserProfile {
        UserProfile {
            id: self.subject_id.clone(),
            username: self.handle.clone(),
            name: self.display_name.clone(),
            email: self.email.clone(),
            avatar: self.avatar_label.clone(),
        }
    }
}

/// Two-letter avatar label derived from the handle
pub fn avatar_label(handle: &str) -> String {
    let label: String = handle.chars().take(2).collect::<String>().to_uppercase();
    if label.is_empty() {
        "??".to_string()
    } else {
        label
    }
}

/// Credential handed to the caller
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Keyed map from opaque credential to session
#[async_trait]
pub trait SessionStore: Send + Sync {
    /// Store the profile and token, returning a fresh credential
    async fn create(&self, profile: SubjectProfile, token: RemoteToken) -> Result<IssuedToken>;

    /// Resolve a credential; `Expired` and `Unauthenticated` are distinct
    async fn resolve(&self, token: &str) -> Result<Session>;

    /// Invalidate a credential. Returns the subject it belonged to, if any.
    async fn destroy(&self, token: &str) -> Option<String>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
struct Claims {
    sid: String,
    sub: String,
    exp: i64,
}

/// Signs and verifies credentials
#[derive(Clone)]
pub struct TokenSigner {
    key: Vec<u8>,
}

impl std::fmt::Debug for TokenSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("TokenSigner(***)")
    }
}

impl TokenSigner {
    pub fn new(secret: &str) -> Self {
        // Normalize any secret length to a full-size MAC key
        let key = <Blake2b512 as Digest>::digest(secret.as_bytes()).to_vec();
        Self { key }
    }

    fn mac(&self, data: &[u8]) -> Result<Blake2bMac512> {
        let mut mac = <Blake2bMac512 as KeyInit>::new_from_slice(&self.key)
            .map_err(|e| SyncError::Internal(format!("signing key rejected: {}", e)))?;
        Mac::update(&mut mac, data);
        Ok(mac)
    }

    fn tag(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(Mac::finalize(self.mac(data)?).into_bytes().to_vec())
    }

    fn sign(&self, claims: &Claims) -> Result<String> {
        let payload = URL_SAFE_NO_PAD.encode(serde_json::to_vec(claims)?);
        let tag = URL_SAFE_NO_PAD.encode(self.tag(payload.as_bytes())?);
        Ok(format!("{}.{}", payload, tag))
    }

    /// Verify the signature and decode the claims; expiry is not checked here
    fn verify(&self, token: &str) -> Result<Claims> {
        let malformed = || SyncError::Unauthenticated("malformed credential".to_string());

        let (payload, tag) = token.split_once('.').ok_or_else(malformed)?;
        let tag = URL_SAFE_NO_PAD.decode(tag).map_err(|_| malformed())?;
        self.mac(payload.as_bytes())?
            .verify_slice(&tag)
            .map_err(|_| SyncError::Unauthenticated("credential signature mismatch".to_string()))?;

        let raw = URL_SAFE_NO_PAD.decode(payload).map_err(|_| malformed())?;
        serde_json::from_slice(&raw).map_err(|_| malformed())
    }
}

#[derive(Debug, Clone)]
struct StoredSubject {
    profile: SubjectProfile,
    remote_token: RemoteToken,
}

/// In-process session store
///
/// `DashMap` gives per-key atomic updates, so concurrent requests for the
/// same subject never observe a half-written profile.
#[derive(Debug)]
pub struct MemorySessionStore {
    signer: TokenSigner,
    ttl: Duration,
    /// session id -> subject id
    sessions: DashMap<String, String>,
    /// subject id -> latest profile and provider token
    subjects: DashMap<String, StoredSubject>,
}

impl MemorySessionStore {
    pub fn new(secret: &str) -> Self {
        Self::with_ttl(secret, Duration::minutes(DEFAULT_TTL_MINUTES))
    }

    pub fn with_ttl(secret: &str, ttl: Duration) -> Self {
        Self {
            signer: TokenSigner::new(secret),
            ttl,
            sessions: DashMap::new(),
            subjects: DashMap::new(),
        }
    }

    /// Number of credentials neither destroyed nor seen expired
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }
}

#[async_trait]
impl SessionStore for MemorySessionStore {
    async fn create(&self, profile: SubjectProfile, token: RemoteToken) -> Result<IssuedToken> {
        let session_id = Uuid::new_v4().to_string();
        let expires_at = Utc::now() + self.ttl;
        let claims = Claims {
            sid: session_id.clone(),
            sub: profile.subject_id.clone(),
            exp: expires_at.timestamp(),
        };
        let signed = self.signer.sign(&claims)?;

        let subject_id = profile.subject_id.clone();
        self.subjects.insert(
            subject_id.clone(),
            StoredSubject {
                profile,
                remote_token: token,
            },
        );
        self.sessions.insert(session_id, subject_id.clone());

        info!(subject = %subject_id, "Session created");
        Ok(IssuedToken {
            token: signed,
            expires_at,
        })
    }

    async fn resolve(&self, token: &str) -> Result<Session> {
        let claims = self.signer.verify(token)?;

        if claims.exp <= Utc::now().timestamp() {
            debug!(subject = %claims.sub, "Credential expired");
            self.sessions.remove(&claims.sid);
            return Err(SyncError::Expired);
        }

        let subject_id = self
            .sessions
            .get(&claims.sid)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| SyncError::Unauthenticated("session not found".to_string()))?;
        if subject_id != claims.sub {
            return Err(SyncError::Unauthenticated(
                "credential subject mismatch".to_string(),
            ));
        }

        let stored = self
            .subjects
            .get(&subject_id)
            .map(|entry| entry.value().clone())
            .ok_or_else(|| SyncError::Unauthenticated("user not found".to_string()))?;

        let profile = stored.profile;
        Ok(Session {
            session_id: claims.sid,
            subject_id,
            display_name: profile
                .display_name
                .clone()
                .unwrap_or_else(|| profile.handle.clone()),
            avatar_label: avatar_label(&profile.handle),
            handle: profile.handle,
            email: profile.email,
            remote_token: stored.remote_token,
        })
    }

    async fn destroy(&self, token: &str) -> Option<String> {
        let claims = self.signer.verify(token).ok()?;
        let removed = self.sessions.remove(&claims.sid).map(|(_, subject)| subject);
        if let Some(subject) = &removed {
            let expiry = Utc.timestamp_opt(claims.exp, 0).single();
            info!(subject = %subject, ?expiry, "Session destroyed");
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn octocat() -> SubjectProfile {
        SubjectProfile {
            subject_id: "583231".to_string(),
            handle: "octocat".to_string(),
            display_name: Some("The Octocat".to_string()),
            email: None,
        }
    }

    #[tokio::test]
    async fn test_create_then_resolve() {
        let store = MemorySessionStore::new("secret");
        let issued = store
            .create(octocat(), RemoteToken::new("gho_abc"))
            .await
            .unwrap();

        let session = store.resolve(&issued.token).await.unwrap();
        assert_eq!(session.subject_id, "583231");
        assert_eq!(session.display_name, "The Octocat");
        assert_eq!(session.avatar_label, "OC");
        assert_eq!(session.remote_token.secret(), "gho_abc");
    }

    #[tokio::test]
    async fn test_expired_token_is_distinct_and_forgotten() {
        let store = MemorySessionStore::with_ttl("secret", Duration::seconds(-5));
        let issued = store
            .create(octocat(), RemoteToken::new("gho_abc"))
            .await
            .unwrap();

        assert_eq!(store.session_count(), 1);

        assert_eq!(store.resolve(&issued.token).await, Err(SyncError::Expired));
        assert_eq!(store.session_count(), 0);
        // Still reported as expired once the entry is gone
        assert_eq!(store.resolve(&issued.token).await, Err(SyncError::Expired));
    }

    #[test]
    fn test_signer_rejects_altered_tags() {
        let signer = TokenSigner::new("secret");
        let claims = Claims {
            sid: "s".to_string(),
            sub: "u".to_string(),
            exp: 10,
        };
        let token = signer.sign(&claims).unwrap();
        assert_eq!(signer.verify(&token).unwrap().sub, "u");

        let (payload, tag) = token.split_once('.').unwrap();
        let mut bytes = URL_SAFE_NO_PAD.decode(tag).unwrap();
        assert_eq!(bytes.len(), 64);

        let truncated = format!("{}.{}", payload, URL_SAFE_NO_PAD.encode(&bytes[..32]));
        assert!(signer.verify(&truncated).is_err());

        bytes[63] ^= 1;
        let flipped = format!("{}.{}", payload, URL_SAFE_NO_PAD.encode(&bytes));
        assert!(matches!(
            signer.verify(&flipped),
            Err(SyncError::Unauthenticated(_))
        ));

        assert!(TokenSigner::new("other").verify(&token).is_err());
    }

    #[tokio::test]
    async fn test_never_issued_token_is_unauthenticated() {
        let store = MemorySessionStore::new("secret");
        let err = store.resolve("not-a-token").await.unwrap_err();
        assert!(matches!(err, SyncError::Unauthenticated(_)));

        // Signed by somebody else
        let other = MemorySessionStore::new("other-secret");
        let foreign = other
            .create(octocat(), RemoteToken::new("gho_abc"))
            .await
            .unwrap();
        let err = store.resolve(&foreign.token).await.unwrap_err();
        assert!(matches!(err, SyncError::Unauthenticated(_)));
    }

    #[tokio::test]
    async fn test_tampered_claims_rejected() {
        let store = MemorySessionStore::new("secret");
        let issued = store
            .create(octocat(), RemoteToken::new("gho_abc"))
            .await
            .unwrap();
        let (_, tag) = issued.token.split_once('.').unwrap();
        let forged_claims = Claims {
            sid: Uuid::new_v4().to_string(),
            sub: "1".to_string(),
            exp: i64::MAX,
        };
        let forged = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(serde_json::to_vec(&forged_claims).unwrap()),
            tag
        );
        assert!(matches!(
            store.resolve(&forged).await,
            Err(SyncError::Unauthenticated(_))
        ));
    }

    #[tokio::test]
    async fn test_destroy_invalidates_only_that_token() {
        let store = MemorySessionStore::new("secret");
        let first = store
            .create(octocat(), RemoteToken::new("gho_1"))
            .await
            .unwrap();
        let second = store
            .create(octocat(), RemoteToken::new("gho_2"))
            .await
            .unwrap();
        assert_ne!(first.token, second.token);

        assert_eq!(store.destroy(&first.token).await, Some("583231".to_string()));
        assert!(store.resolve(&first.token).await.is_err());
        assert!(store.resolve(&second.token).await.is_ok());

        // Idempotent
        assert_eq!(store.destroy(&first.token).await, None);
        assert_eq!(store.session_count(), 1);
    }

    #[tokio::test]
    async fn test_relogin_refreshes_profile_for_older_tokens() {
        let store = MemorySessionStore::new("secret");
        let first = store
            .create(octocat(), RemoteToken::new("gho_1"))
            .await
            .unwrap();

        let mut renamed = octocat();
        renamed.display_name = Some("Mona".to_string());
        store
            .create(renamed, RemoteToken::new("gho_2"))
            .await
            .unwrap();

        let session = store.resolve(&first.token).await.unwrap();
        assert_eq!(session.display_name, "Mona");
        assert_eq!(session.remote_token.secret(), "gho_2");
    }

    #[test]
    fn test_remote_token_debug_is_redacted() {
        let token = RemoteToken::new("gho_secret");
        assert!(!format!("{:?}", token).contains("gho_secret"));
    }

    #[test]
    fn test_avatar_label() {
        assert_eq!(avatar_label("octocat"), "OC");
        assert_eq!(avatar_label("x"), "X");
        assert_eq!(avatar_label(""), "??");
    }
}
