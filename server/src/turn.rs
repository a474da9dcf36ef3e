//! ICE server configuration for WebRTC clients.

use axum::{extract::State, Json};
use base64::Engine;
use hmac::{Hmac, Mac};
use serde::Serialize;
use sha1::Sha1;

use crate::config::TurnConfig;
use crate::state::AppState;

type HmacSha1 = Hmac<Sha1>;

/// TURN realm user baked into credentials minted for anonymous clients.
const CREDENTIAL_REALM_USER: &str = "kanto";

#[derive(Debug, Clone, Serialize)]
pub struct IceServer {
    pub urls: Vec<String>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub username: String,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub credential: String,
}

#[derive(Debug, Serialize)]
pub struct IceConfigResponse {
    #[serde(rename = "iceServers")]
    pub ice_servers: Vec<IceServer>,
}

/// Generate time-limited TURN credentials using the HMAC-SHA1 shared-secret
/// mechanism (coturn): username = "{expiry}:{user}", credential =
/// base64(HMAC-SHA1(shared_secret, username)). The TURN server computes the
/// same HMAC independently to verify.
pub fn generate_turn_credentials(
    username: &str,
    shared_secret: &str,
    ttl_secs: u64,
) -> (String, String) {
    let timestamp = chrono::Utc::now().timestamp() as u64 + ttl_secs;
    let turn_username = format!("{}:{}", timestamp, username);

    let mut mac =
        HmacSha1::new_from_slice(shared_secret.as_bytes()).expect("HMAC accepts any key length");
    mac.update(turn_username.as_bytes());
    let credential = base64::engine::general_purpose::STANDARD.encode(mac.finalize().into_bytes());

    (turn_username, credential)
}

/// Build the list of ICE servers (STUN + TURN).
///
/// Always includes a STUN server for NAT type detection. TURN is added when
/// enabled: with a shared secret, credentials are minted per call; with a
/// static pair, they are passed through unchanged.
pub fn ice_servers(turn: &Option<TurnConfig>) -> Vec<IceServer> {
    let mut servers = vec![IceServer {
        urls: vec!["stun:stun.l.google.com:19302".to_string()],
        username: String::new(),
        credential: String::new(),
    }];

    if let Some(cfg) = turn {
        if cfg.enabled {
            let credentials = if !cfg.shared_secret.is_empty() {
                Some(generate_turn_credentials(
                    CREDENTIAL_REALM_USER,
                    &cfg.shared_secret,
                    cfg.credential_ttl_secs,
                ))
            } else {
                cfg.username
                    .clone()
                    .zip(cfg.password.clone())
            };
            if let Some((username, credential)) = credentials {
                servers.push(IceServer {
                    urls: vec![
                        format!("turn:{}:{}?transport=udp", cfg.host, cfg.port),
                        format!("turn:{}:{}?transport=tcp", cfg.host, cfg.port),
                    ],
                    username,
                    credential,
                });
            }
        }
    }

    servers
}

/// GET /api/ice-config — STUN/TURN servers for the requesting client.
pub async fn ice_config(State(state): State<AppState>) -> Json<IceConfigResponse> {
    Json(IceConfigResponse {
        ice_servers: ice_servers(&state.turn),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stun_only_when_turn_disabled() {
        let servers = ice_servers(&None);
        assert_eq!(servers.len(), 1);
        assert!(servers[0].urls[0].starts_with("stun:"));
    }

    #[test]
    fn static_credentials_pass_through() {
        let cfg = TurnConfig {
            enabled: true,
            host: "turn.example".to_string(),
            port: 3478,
            username: Some("kanto".to_string()),
            password: Some("hunter2".to_string()),
            ..TurnConfig::default()
        };
        let servers = ice_servers(&Some(cfg));
        assert_eq!(servers.len(), 2);
        assert_eq!(servers[1].username, "kanto");
        assert_eq!(servers[1].credential, "hunter2");
        assert!(servers[1].urls[0].contains("turn.example:3478"));
    }

    #[test]
    fn shared_secret_mints_expiring_username() {
        let (username, credential) = generate_turn_credentials("kanto", "s3cret", 600);
        let (expiry, user) = username.split_once(':').unwrap();
        assert_eq!(user, "kanto");
        assert!(expiry.parse::<u64>().unwrap() > chrono::Utc::now().timestamp() as u64);
        assert!(!credential.is_empty());
    }
}
