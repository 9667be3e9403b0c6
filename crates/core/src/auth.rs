//! Account registration, login and bearer-token sessions

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::{Duration, Utc};
use rand::RngCore;
use tracing::{debug, instrument};

use crate::error::{Error, Result};
use crate::models::{Identity, Session, User};
use crate::storage::Database;

/// Session lifetime issued at login
const SESSION_TTL_HOURS: i64 = 1;

/// Sessions with less remaining lifetime than this are renewed on use
const RENEWAL_THRESHOLD_MINUTES: i64 = 5;

const MIN_USERNAME_LEN: usize = 3;
const MIN_PASSWORD_LEN: usize = 6;

/// Registration, login and token resolution.
///
/// Stateless; every call borrows the database. Usernames are stored
/// lowercase and uniqueness is case-insensitive.
pub struct AuthService;

impl AuthService {
    /// Register a new account and log it in.
    #[instrument(skip(db, password))]
    pub fn register(db: &Database, username: &str, password: &str) -> Result<Session> {
        let username = username.trim().to_lowercase();
        if username.len() < MIN_USERNAME_LEN {
            return Err(Error::InvalidInput(format!(
                "username must be at least {} characters",
                MIN_USERNAME_LEN
            )));
        }
        if password.len() < MIN_PASSWORD_LEN {
            return Err(Error::InvalidInput(format!(
                "password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }

        if db.users().find_by_username(&username)?.is_some() {
            return Err(Error::NameConflict);
        }

        let salt = SaltString::generate(&mut OsRng);
        let password_hash = Argon2::default()
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| Error::Authentication(format!("password hashing failed: {e}")))?
            .to_string();

        let user = User::new(username, password_hash);
        db.users().create(&user)?;

        let session = Self::issue_session(db, &user)?;
        debug!(user_id = %user.id, "registered new account");
        Ok(session)
    }

    /// Log in with username and password.
    ///
    /// An unknown username and a wrong password produce the same error.
    #[instrument(skip(db, password))]
    pub fn login(db: &Database, username: &str, password: &str) -> Result<Session> {
        let username = username.trim().to_lowercase();
        let user = db
            .users()
            .find_by_username(&username)?
            .ok_or_else(|| Error::Authentication("invalid username or password".into()))?;

        let parsed_hash = PasswordHash::new(&user.password_hash)
            .map_err(|_| Error::Authentication("invalid stored password".into()))?;

        Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .map_err(|_| Error::Authentication("invalid username or password".into()))?;

        db.users().update_last_login(user.id)?;
        Self::issue_session(db, &user)
    }

    /// Resolve a bearer token to the identity behind it.
    ///
    /// Sessions close to expiry are silently extended so an active
    /// connection never sees its token lapse mid-use.
    #[instrument(skip(db, token))]
    pub fn resolve_token(db: &Database, token: &str) -> Result<Identity> {
        let session = db
            .users()
            .find_valid_session(token)?
            .ok_or_else(|| Error::Authentication("invalid or expired session".into()))?;

        if session.time_to_expiry() < Duration::minutes(RENEWAL_THRESHOLD_MINUTES) {
            let renewed = Utc::now() + Duration::hours(SESSION_TTL_HOURS);
            db.users().extend_session(token, renewed)?;
            debug!(user_id = %session.user_id, "session silently renewed");
        }

        let user = db
            .users()
            .find_by_id(session.user_id)?
            .ok_or(Error::UserNotFound)?;

        Ok(Identity::from(&user))
    }

    /// Invalidate a session token.
    pub fn logout(db: &Database, token: &str) -> Result<()> {
        db.users().delete_session(token)
    }

    fn issue_session(db: &Database, user: &User) -> Result<Session> {
        let session = Session::new(
            user.id,
            Self::generate_token(),
            Duration::hours(SESSION_TTL_HOURS),
        );
        db.users().create_session(&session)?;
        Ok(session)
    }

    /// 128 bits of randomness, base64url without padding (22 chars)
    fn generate_token() -> String {
        let mut bytes = [0u8; 16];
        rand::thread_rng().fill_bytes(&mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db() -> Database {
        Database::open_in_memory().unwrap()
    }

    #[test]
    fn register_then_login() {
        let db = db();
        let session = AuthService::register(&db, "Alice", "hunter22").unwrap();
        assert_eq!(session.token.len(), 22);

        // Stored lowercase, login is case-insensitive
        let again = AuthService::login(&db, "ALICE", "hunter22").unwrap();
        assert_eq!(again.user_id, session.user_id);

        let identity = AuthService::resolve_token(&db, &again.token).unwrap();
        assert_eq!(identity.username, "alice");
    }

    #[test]
    fn duplicate_registration_rejected() {
        let db = db();
        AuthService::register(&db, "alice", "hunter22").unwrap();
        let err = AuthService::register(&db, "Alice", "hunter22").unwrap_err();
        assert!(matches!(err, Error::NameConflict));
    }

    #[test]
    fn wrong_password_and_unknown_user_look_alike() {
        let db = db();
        AuthService::register(&db, "alice", "hunter22").unwrap();

        let wrong = AuthService::login(&db, "alice", "wrong").unwrap_err();
        let unknown = AuthService::login(&db, "nobody", "wrong").unwrap_err();
        assert_eq!(wrong.to_string(), unknown.to_string());
    }

    #[test]
    fn short_credentials_rejected() {
        let db = db();
        assert!(matches!(
            AuthService::register(&db, "al", "hunter22"),
            Err(Error::InvalidInput(_))
        ));
        assert!(matches!(
            AuthService::register(&db, "alice", "short"),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn logout_invalidates_token() {
        let db = db();
        let session = AuthService::register(&db, "alice", "hunter22").unwrap();
        AuthService::logout(&db, &session.token).unwrap();
        assert!(AuthService::resolve_token(&db, &session.token).is_err());
    }

    #[test]
    fn near_expiry_session_is_renewed() {
        let db = db();
        let session = AuthService::register(&db, "alice", "hunter22").unwrap();

        // Pull expiry to just under the renewal threshold
        let soon = Utc::now() + Duration::minutes(2);
        db.users().extend_session(&session.token, soon).unwrap();

        AuthService::resolve_token(&db, &session.token).unwrap();
        let renewed = db.users().find_valid_session(&session.token).unwrap().unwrap();
        assert!(renewed.expires_at > soon);
    }
}
