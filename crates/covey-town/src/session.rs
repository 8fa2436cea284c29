//! Player sessions: the credentials handed out when a player joins.

use covey_protocol::PlayerId;
use rand::Rng;
use rand::distr::Alphanumeric;

/// Length of a town update password.
const PASSWORD_LEN: usize = 24;

/// A player's session in one town.
///
/// The session token is what the client presents when subscribing to
/// realtime events; the video token is passed through to the video
/// provider's client SDK.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerSession {
    pub player_id: PlayerId,

    /// A 32-character hex string (128 bits of randomness).
    pub session_token: String,

    pub video_token: String,

    /// Set once a realtime subscriber has presented the token.
    pub(crate) claimed: bool,
}

impl PlayerSession {
    /// Creates a session with a freshly generated token.
    pub fn new(player_id: PlayerId, video_token: String) -> Self {
        Self {
            player_id,
            session_token: generate_token(),
            video_token,
            claimed: false,
        }
    }
}

/// Generates a random 32-character lowercase hex string.
pub(crate) fn generate_token() -> String {
    let mut rng = rand::rng();
    let bytes: [u8; 16] = rng.random();
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

/// Generates a random alphanumeric town update password.
pub(crate) fn generate_password() -> String {
    rand::rng()
        .sample_iter(Alphanumeric)
        .take(PASSWORD_LEN)
        .map(char::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_token_is_32_hex_chars() {
        let token = generate_token();
        assert_eq!(token.len(), 32);
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_generate_password_is_24_alphanumerics() {
        let password = generate_password();
        assert_eq!(password.len(), 24);
        assert!(password.chars().all(|c| c.is_ascii_alphanumeric()));
    }

    #[test]
    fn test_new_session_tokens_differ() {
        let a = PlayerSession::new(PlayerId(1), String::new());
        let b = PlayerSession::new(PlayerId(1), String::new());
        assert_ne!(a.session_token, b.session_token);
        assert!(!a.claimed);
    }
}
