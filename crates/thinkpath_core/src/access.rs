//! crates/thinkpath_core/src/access.rs
//!
//! Identity and access control: signup, login with brute-force throttling,
//! password-reset requests and token verification, backed by a persisted vault
//! of identities.
//!
//! Failed logins are counted per client scope (one browser, one network peer),
//! so one client's failures never lock out or reset another's. The windows live
//! in a separate, shorter-lived store from the vault: restarting clears
//! throttling but keeps accounts.

use std::sync::Arc;
use std::time::Duration;

use argon2::{
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Algorithm, Argon2, Params, Version,
};
use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use tokio::sync::Mutex;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::{AuthSession, Identity, RateLimitWindow, TokenClaims, UserProfile};
use crate::error::{TutorError, TutorResult};
use crate::ports::KeyValueStore;
use crate::storage::{load_json, save_json};
use crate::token::TokenSigner;

pub const DEFAULT_VAULT_KEY: &str = "thinkpath_users_vault";
pub const DEFAULT_RATE_LIMIT_KEY: &str = "thinkpath_auth_attempts";
pub const MAX_ATTEMPTS: u32 = 5;
pub const LOCKOUT_DURATION: Duration = Duration::from_secs(30);
pub const TOKEN_TTL: Duration = Duration::from_secs(24 * 60 * 60);

const PASSWORD_RESET_MESSAGE: &str =
    "Security Protocol: If this identity is registered in our vault, a reset link has been dispatched.";

/// Settings threaded into [`AccessControl`] at construction.
#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub vault_key: String,
    pub rate_limit_key: String,
    pub max_attempts: u32,
    pub lockout: Duration,
    pub token_ttl: Duration,
    pub token_secret: String,
    pub hash_params: Params,
}

impl AuthConfig {
    /// Default keys and limits with the given signing secret.
    pub fn new(token_secret: impl Into<String>) -> Self {
        Self {
            vault_key: DEFAULT_VAULT_KEY.to_string(),
            rate_limit_key: DEFAULT_RATE_LIMIT_KEY.to_string(),
            max_attempts: MAX_ATTEMPTS,
            lockout: LOCKOUT_DURATION,
            token_ttl: TOKEN_TTL,
            token_secret: token_secret.into(),
            hash_params: Params::default(),
        }
    }
}

pub struct AccessControl {
    vault: Arc<dyn KeyValueStore>,
    attempts: Arc<dyn KeyValueStore>,
    config: AuthConfig,
    signer: TokenSigner,
    /// Compared against when the email is unknown so both paths do the same work.
    dummy_hash: String,
    /// Held for a whole login attempt so a window's check and its update never interleave.
    attempt_lock: Mutex<()>,
    /// Held while the vault is read, extended and written back.
    vault_lock: Mutex<()>,
}

impl AccessControl {
    pub fn init(
        vault: Arc<dyn KeyValueStore>,
        attempts: Arc<dyn KeyValueStore>,
        config: AuthConfig,
    ) -> TutorResult<Self> {
        let token_ttl = chrono::Duration::from_std(config.token_ttl)
            .map_err(|e| TutorError::Internal(e.to_string()))?;
        let signer = TokenSigner::new(config.token_secret.as_bytes(), token_ttl);
        let dummy_hash = hash_password(&config.hash_params, &Uuid::new_v4().to_string())?;
        Ok(Self {
            vault,
            attempts,
            config,
            signer,
            dummy_hash,
            attempt_lock: Mutex::new(()),
            vault_lock: Mutex::new(()),
        })
    }

    pub async fn signup(&self, name: &str, email: &str, password: &str) -> TutorResult<AuthSession> {
        self.signup_at(name, email, password, Utc::now()).await
    }

    /// [`AccessControl::signup`] with an explicit clock.
    pub async fn signup_at(
        &self,
        name: &str,
        email: &str,
        password: &str,
        now: DateTime<Utc>,
    ) -> TutorResult<AuthSession> {
        let name = name.trim();
        let email = normalize_email(email);
        if name.is_empty() || email.is_empty() || password.is_empty() {
            return Err(TutorError::InvalidSignup);
        }

        let _vault_guard = self.vault_lock.lock().await;
        let mut identities = self.load_vault().await?;
        if identities.iter().any(|i| i.email == email) {
            return Err(TutorError::DuplicateIdentity);
        }

        let identity = Identity {
            id: Uuid::new_v4(),
            name: name.to_string(),
            email,
            password_hash: hash_password(&self.config.hash_params, password)?,
            created_at: now,
        };
        identities.push(identity.clone());
        save_json(self.vault.as_ref(), &self.config.vault_key, &identities).await?;
        info!(user_id = %identity.id, "Registered new identity");

        self.session_for(&identity, now)
    }

    /// Signs in from the client identified by `scope`.
    ///
    /// `scope` selects the failed-attempt window; it is opaque here and is typically
    /// the client's network address.
    pub async fn login(&self, scope: &str, email: &str, password: &str) -> TutorResult<AuthSession> {
        self.login_at(scope, email, password, Utc::now()).await
    }

    /// [`AccessControl::login`] with an explicit clock.
    pub async fn login_at(
        &self,
        scope: &str,
        email: &str,
        password: &str,
        now: DateTime<Utc>,
    ) -> TutorResult<AuthSession> {
        let window_key = self.window_key(scope);
        let _attempt_guard = self.attempt_lock.lock().await;
        let mut window = self.load_window(&window_key).await;
        let now_ms = now.timestamp_millis();

        if let Some(retry_after_secs) = self.lockout_remaining(&window, now_ms) {
            warn!(scope, retry_after_secs, "Login rejected while locked out");
            return Err(TutorError::RateLimited { retry_after_secs });
        }

        let email = normalize_email(email);
        let identities = self.load_vault().await?;
        let identity = identities.iter().find(|i| i.email == email);
        let stored_hash = identity.map_or(self.dummy_hash.as_str(), |i| i.password_hash.as_str());
        let password_matches = verify_password(stored_hash, password);

        window.last_attempt = now_ms;
        let identity = match identity {
            Some(identity) if password_matches => identity,
            _ => {
                window.count = window.count.saturating_add(1);
                self.save_window(&window_key, &window).await;
                warn!(scope, failed_attempts = window.count, "Login failed");
                return Err(TutorError::InvalidCredentials);
            }
        };

        self.clear_window(&window_key).await;
        info!(user_id = %identity.id, "Login succeeded");
        self.session_for(identity, now)
    }

    /// Always reports success so that registered emails cannot be discovered.
    pub async fn request_password_reset(&self, _email: &str) -> String {
        info!("Password reset requested");
        PASSWORD_RESET_MESSAGE.to_string()
    }

    pub fn verify_token(&self, token: &str) -> TutorResult<TokenClaims> {
        self.verify_token_at(token, Utc::now())
    }

    /// [`AccessControl::verify_token`] with an explicit clock.
    pub fn verify_token_at(&self, token: &str, now: DateTime<Utc>) -> TutorResult<TokenClaims> {
        self.signer.verify(token, now)
    }

    /// The failed-attempt window of one client scope.
    pub async fn attempt_window(&self, scope: &str) -> RateLimitWindow {
        self.load_window(&self.window_key(scope)).await
    }

    fn window_key(&self, scope: &str) -> String {
        format!("{}:{}", self.config.rate_limit_key, scope)
    }

    fn session_for(&self, identity: &Identity, now: DateTime<Utc>) -> TutorResult<AuthSession> {
        Ok(AuthSession {
            user: UserProfile::from(identity),
            token: self.signer.issue(identity, now)?,
        })
    }

    /// Seconds until the next attempt is allowed, rounded up, if currently locked.
    fn lockout_remaining(&self, window: &RateLimitWindow, now_ms: i64) -> Option<u64> {
        let lockout_ms = i64::try_from(self.config.lockout.as_millis()).unwrap_or(i64::MAX);
        let elapsed_ms = now_ms.saturating_sub(window.last_attempt);
        if window.count < self.config.max_attempts || elapsed_ms >= lockout_ms {
            return None;
        }
        let remaining_ms = lockout_ms - elapsed_ms;
        Some(u64::try_from((remaining_ms + 999) / 1000).unwrap_or(0))
    }

    async fn load_vault(&self) -> TutorResult<Vec<Identity>> {
        match load_json(self.vault.as_ref(), &self.config.vault_key).await {
            Ok(identities) => Ok(identities.unwrap_or_default()),
            Err(TutorError::StorageCorruption(key)) => {
                warn!("Failed to parse identity vault under '{}'; treating it as empty", key);
                Ok(Vec::new())
            }
            Err(e) => Err(e),
        }
    }

    async fn load_window(&self, key: &str) -> RateLimitWindow {
        match load_json(self.attempts.as_ref(), key).await {
            Ok(window) => window.unwrap_or_default(),
            Err(e) => {
                warn!("Failed to read rate-limit window: {}; starting fresh", e);
                RateLimitWindow::default()
            }
        }
    }

    async fn save_window(&self, key: &str, window: &RateLimitWindow) {
        if let Err(e) = save_json(self.attempts.as_ref(), key, window).await {
            warn!("Failed to persist rate-limit window: {}", e);
        }
    }

    /// Drops a scope's window after a successful login; an absent window counts zero.
    async fn clear_window(&self, key: &str) {
        if let Err(e) = self.attempts.remove(key).await {
            warn!("Failed to clear rate-limit window: {}", e);
        }
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn hash_password(params: &Params, password: &str) -> TutorResult<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::new(Algorithm::Argon2id, Version::V0x13, params.clone())
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| TutorError::Internal(format!("Password hashing failed: {e}")))
}

fn verify_password(hash: &str, password: &str) -> bool {
    let Ok(parsed_hash) = PasswordHash::new(hash) else {
        warn!("Stored password hash could not be parsed");
        return false;
    };
    Argon2::default()
        .verify_password(password.as_bytes(), &parsed_hash)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryKeyValueStore;

    const CLIENT: &str = "203.0.113.7";

    fn fast_config() -> AuthConfig {
        AuthConfig {
            hash_params: Params::new(1024, 1, 1, None).unwrap(),
            ..AuthConfig::new("unit-test-secret")
        }
    }

    fn access() -> (AccessControl, Arc<MemoryKeyValueStore>) {
        let vault = Arc::new(MemoryKeyValueStore::new());
        let access = AccessControl::init(
            vault.clone(),
            Arc::new(MemoryKeyValueStore::new()),
            fast_config(),
        )
        .unwrap();
        (access, vault)
    }

    #[tokio::test]
    async fn signup_normalizes_email_and_never_stores_password() {
        let (access, vault) = access();
        let session = access
            .signup("  Grace ", " Grace@Example.COM ", "hunter22")
            .await
            .unwrap();
        assert_eq!(session.user.email, "grace@example.com");
        assert_eq!(session.user.name, "Grace");

        let raw = vault.get(DEFAULT_VAULT_KEY).await.unwrap().unwrap();
        assert!(!raw.contains("hunter22"));
        assert!(raw.contains("$argon2id$"));

        let claims = access.verify_token(&session.token).unwrap();
        assert_eq!(claims.sub, session.user.id);
    }

    #[tokio::test]
    async fn signup_requires_all_fields() {
        let (access, _) = access();
        assert!(matches!(
            access.signup("", "a@b.c", "pw").await,
            Err(TutorError::InvalidSignup)
        ));
        assert!(matches!(
            access.signup("A", "a@b.c", "").await,
            Err(TutorError::InvalidSignup)
        ));
    }

    #[tokio::test]
    async fn lockout_reports_rounded_up_retry_after() {
        let (access, _) = access();
        let start = Utc::now();
        for _ in 0..MAX_ATTEMPTS {
            let _ = access.login_at(CLIENT, "nobody@example.com", "guess", start).await;
        }
        let later = start + chrono::Duration::milliseconds(10_500);
        match access.login_at(CLIENT, "nobody@example.com", "guess", later).await {
            Err(TutorError::RateLimited { retry_after_secs }) => assert_eq!(retry_after_secs, 20),
            other => panic!("expected rate limit, got {other:?}"),
        }
        // A rejected attempt during lockout does not extend the window.
        let window = access.attempt_window(CLIENT).await;
        assert_eq!(window.count, MAX_ATTEMPTS);
        assert_eq!(window.last_attempt, start.timestamp_millis());
    }

    #[tokio::test]
    async fn windows_are_stored_per_scope_and_cleared_on_success() {
        let attempts = Arc::new(MemoryKeyValueStore::new());
        let access = AccessControl::init(
            Arc::new(MemoryKeyValueStore::new()),
            attempts.clone(),
            fast_config(),
        )
        .unwrap();
        access.signup("Ada", "ada@example.com", "pw").await.unwrap();

        let _ = access.login(CLIENT, "ada@example.com", "wrong").await;
        let key = format!("{}:{}", DEFAULT_RATE_LIMIT_KEY, CLIENT);
        assert!(attempts.get(&key).await.unwrap().is_some());
        assert!(attempts.get(DEFAULT_RATE_LIMIT_KEY).await.unwrap().is_none());

        access.login(CLIENT, "ada@example.com", "pw").await.unwrap();
        assert!(attempts.get(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn corrupt_vault_is_treated_as_empty() {
        let (access, vault) = access();
        vault.set(DEFAULT_VAULT_KEY, "not json").await.unwrap();
        assert!(matches!(
            access.login(CLIENT, "x@example.com", "pw").await,
            Err(TutorError::InvalidCredentials)
        ));
        assert!(access.signup("X", "x@example.com", "pw").await.is_ok());
    }

    #[tokio::test]
    async fn password_reset_is_always_generic() {
        let (access, _) = access();
        access.signup("Known", "known@example.com", "pw").await.unwrap();
        let known = access.request_password_reset("known@example.com").await;
        let unknown = access.request_password_reset("unknown@example.com").await;
        assert_eq!(known, unknown);
    }
}
