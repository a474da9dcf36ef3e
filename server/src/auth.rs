//! Session identity for the signaling transport.
//!
//! Credentials live in a TOML users file (SHA-256 password hashes). A
//! successful login mints a random session token that the client presents
//! at WebSocket upgrade. Without a users file the server runs open and the
//! token check is skipped entirely.

use axum::{extract::State, http::StatusCode, Json};
use figment::{
    providers::{Format, Toml},
    Figment,
};
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::state::AppState;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub display_name: String,
    /// SHA-256 hex digest of the password.
    pub password_hash: String,
}

#[derive(Debug, Deserialize)]
struct UsersFile {
    users: Vec<UserRecord>,
}

/// Load the registered-users table from a TOML file.
pub fn load_users(path: &str) -> Result<Vec<UserRecord>, figment::Error> {
    let file: UsersFile = Figment::new().merge(Toml::file(path)).extract()?;
    Ok(file.users)
}

/// Hex SHA-256 digest used for the stored password hashes.
pub fn hash_password(password: &str) -> String {
    hex::encode(Sha256::digest(password.as_bytes()))
}

/// An issued session. The user identity is stable across reconnects even
/// though each socket gets a fresh connection id.
#[derive(Debug, Clone)]
pub struct Session {
    pub user_id: String,
    pub display_name: String,
}

fn new_session_token() -> String {
    hex::encode(rand::rng().random::<[u8; 32]>())
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub id: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    #[serde(rename = "displayName")]
    pub display_name: String,
}

/// POST /api/login — exchange credentials for a session token.
pub async fn login(
    State(state): State<AppState>,
    Json(body): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, StatusCode> {
    let user = state
        .users
        .iter()
        .find(|u| u.id == body.id)
        .ok_or(StatusCode::UNAUTHORIZED)?;
    if hash_password(&body.password) != user.password_hash {
        tracing::warn!(user_id = %body.id, "Login failed: bad credentials");
        return Err(StatusCode::UNAUTHORIZED);
    }

    let token = new_session_token();
    state.sessions.insert(
        token.clone(),
        Session {
            user_id: user.id.clone(),
            display_name: user.display_name.clone(),
        },
    );
    tracing::info!(user_id = %user.id, "Login succeeded");
    Ok(Json(LoginResponse {
        token,
        display_name: user.display_name.clone(),
    }))
}

/// Validate a session token presented at WebSocket upgrade.
pub fn validate_session(state: &AppState, token: &str) -> Option<Session> {
    state.sessions.get(token).map(|entry| entry.value().clone())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn password_hash_is_stable_hex_sha256() {
        assert_eq!(
            hash_password("secret"),
            "2bb80d537b1da3e38bd30361aa855686bde0eacd7162fef6a25fe97bf527a25b"
        );
    }

    #[test]
    fn users_file_round_trips_through_toml() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[[users]]\nid = \"misty\"\ndisplay_name = \"Misty\"\npassword_hash = \"{}\"",
            hash_password("starmie")
        )
        .unwrap();

        let users = load_users(file.path().to_str().unwrap()).unwrap();
        assert_eq!(users.len(), 1);
        assert_eq!(users[0].id, "misty");
        assert_eq!(users[0].password_hash, hash_password("starmie"));
    }

    #[test]
    fn session_tokens_are_unique() {
        assert_ne!(new_session_token(), new_session_token());
    }
}
