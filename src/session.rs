//! Session identity resolution
//!
//! Resolution order: an explicit caller-supplied token, then the token the
//! client persisted, then a freshly generated one. Resolution always succeeds
//! and upserts the session into the store, bumping its activity time.

use crate::store::EventStore;
use crate::types::{ClientMeta, Session};
use rand::distributions::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Marker that prefixes every generated token
pub const TOKEN_PREFIX: &str = "cs_";
/// Random characters after the prefix
pub const TOKEN_RANDOM_LEN: usize = 32;

const MIN_TOKEN_LEN: usize = 8;
const MAX_TOKEN_LEN: usize = 128;

/// What the transport layer knows about the caller
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityHints {
    /// Token passed explicitly with the request
    #[serde(default)]
    pub explicit_token: Option<String>,
    /// Token the client persisted from an earlier response
    #[serde(default)]
    pub client_token: Option<String>,
    #[serde(default)]
    pub client_meta: Option<ClientMeta>,
}

impl IdentityHints {
    pub fn explicit(token: impl Into<String>) -> Self {
        Self {
            explicit_token: Some(token.into()),
            ..Self::default()
        }
    }

    pub fn client(token: impl Into<String>) -> Self {
        Self {
            client_token: Some(token.into()),
            ..Self::default()
        }
    }
}

/// Where the resolved identity came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum IdentitySource {
    Explicit,
    Client,
    Generated,
}

/// A resolved session plus how it was found
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedSession {
    pub session: Session,
    pub source: IdentitySource,
    /// True when the store had no entry for this id before resolution
    pub created: bool,
}

/// Generate an unguessable session token
pub fn generate_token() -> String {
    let random: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_RANDOM_LEN)
        .map(char::from)
        .collect();
    format!("{TOKEN_PREFIX}{random}")
}

/// Tokens are 8-128 characters of `[A-Za-z0-9_-]`
pub fn is_valid_token(token: &str) -> bool {
    (MIN_TOKEN_LEN..=MAX_TOKEN_LEN).contains(&token.len())
        && token
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'_' || b == b'-')
}

/// Resolve the caller's session, creating one when no usable token exists
pub fn resolve_session(store: &EventStore, hints: &IdentityHints) -> ResolvedSession {
    let candidate = |token: &Option<String>| {
        token
            .as_deref()
            .map(str::trim)
            .filter(|t| is_valid_token(t))
            .map(str::to_string)
    };

    let (id, source) = if let Some(id) = candidate(&hints.explicit_token) {
        (id, IdentitySource::Explicit)
    } else if let Some(id) = candidate(&hints.client_token) {
        (id, IdentitySource::Client)
    } else {
        (generate_token(), IdentitySource::Generated)
    };

    let created = !store.contains_session(&id);
    tracing::debug!(?source, created, "session resolved");
    let session = store.touch_session(&id, hints.client_meta.clone());
    ResolvedSession {
        session,
        source,
        created,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::StoreConfig;
    use crate::notify::NoopObserver;
    use chrono::{Duration, TimeZone, Utc};
    use std::sync::Arc;

    fn store() -> (EventStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 1, 15, 14, 0, 0).unwrap(),
        ));
        let config = StoreConfig {
            sweep_probability: 0.0,
            ..StoreConfig::default()
        };
        (
            EventStore::new(config, clock.clone(), Arc::new(NoopObserver)),
            clock,
        )
    }

    #[test]
    fn test_generated_token_shape() {
        let token = generate_token();
        assert!(token.starts_with(TOKEN_PREFIX));
        assert_eq!(token.len(), TOKEN_PREFIX.len() + TOKEN_RANDOM_LEN);
        assert!(is_valid_token(&token));
        assert_ne!(token, generate_token());
    }

    #[test]
    fn test_token_validation() {
        assert!(is_valid_token("abc_DEF-123"));
        assert!(!is_valid_token("short"));
        assert!(!is_valid_token("has spaces in it"));
        assert!(!is_valid_token("semi;colon;token"));
        assert!(!is_valid_token(&"x".repeat(129)));
    }

    #[test]
    fn test_resolution_order() {
        let (store, _) = store();
        let hints = IdentityHints {
            explicit_token: Some("explicit-token".to_string()),
            client_token: Some("client-token".to_string()),
            client_meta: None,
        };
        let resolved = resolve_session(&store, &hints);
        assert_eq!(resolved.session.id, "explicit-token");
        assert_eq!(resolved.source, IdentitySource::Explicit);
        assert!(resolved.created);

        let resolved = resolve_session(&store, &IdentityHints::client("client-token"));
        assert_eq!(resolved.source, IdentitySource::Client);

        let resolved = resolve_session(&store, &IdentityHints::default());
        assert_eq!(resolved.source, IdentitySource::Generated);
        assert!(resolved.session.id.starts_with(TOKEN_PREFIX));
        assert_eq!(store.session_count(), 3);
    }

    #[test]
    fn test_invalid_hint_falls_through() {
        let (store, _) = store();
        let hints = IdentityHints {
            explicit_token: Some("bad token!".to_string()),
            client_token: Some("  persisted_token  ".to_string()),
            client_meta: None,
        };
        let resolved = resolve_session(&store, &hints);
        assert_eq!(resolved.session.id, "persisted_token");
        assert_eq!(resolved.source, IdentitySource::Client);
    }

    #[test]
    fn test_existing_session_is_refreshed() {
        let (store, clock) = store();
        let first = resolve_session(&store, &IdentityHints::client("returning-user"));
        clock.advance(Duration::minutes(30));
        let meta = ClientMeta {
            timezone: Some("Europe/Berlin".to_string()),
            ..ClientMeta::default()
        };
        let second = resolve_session(
            &store,
            &IdentityHints {
                client_token: Some("returning-user".to_string()),
                client_meta: Some(meta.clone()),
                ..IdentityHints::default()
            },
        );

        assert!(!second.created);
        assert_eq!(second.session.created_at, first.session.created_at);
        assert_eq!(
            second.session.last_activity_at,
            first.session.last_activity_at + Duration::minutes(30)
        );
        assert_eq!(second.session.client_meta, Some(meta));
    }
}
