// src/config/secrets.rs
use std::env;

use crate::destination::UserId;

/// Credentials read from the environment (`.env` is loaded first by `main`).
#[derive(Clone, Default)]
pub struct Secrets {
    pub discord_token: Option<String>,
    pub admin_user: Option<UserId>,
    pub x_token: Option<String>,
    pub bsky: Option<(String, String)>,
    /// `DEVELOPMENT=1`: never post to the public microblog or social feed.
    pub development: bool,
}

impl std::fmt::Debug for Secrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Secrets")
            .field("discord_token", &self.discord_token.is_some())
            .field("admin_user", &self.admin_user)
            .field("x_token", &self.x_token.is_some())
            .field("bsky", &self.bsky.as_ref().map(|(h, _)| h))
            .field("development", &self.development)
            .finish()
    }
}

fn var(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

impl Secrets {
    pub fn from_env() -> Self {
        let development = var("DEVELOPMENT").is_some_and(|v| v == "1");
        let admin_user = var("DISCORD_ADMIN_USER").and_then(|v| match v.parse() {
            Ok(id) => Some(id),
            Err(_) => {
                tracing::warn!("DISCORD_ADMIN_USER is not a numeric user id, ignoring");
                None
            }
        });
        let bsky = match (var("BSKY_HANDLE"), var("BSKY_APP_PASSWORD")) {
            (Some(h), Some(p)) => Some((h, p)),
            _ => None,
        };
        let mut s = Self {
            discord_token: var("DISCORD_BOT_TOKEN"),
            admin_user,
            x_token: var("X_USER_TOKEN"),
            bsky,
            development,
        };
        if development {
            s.x_token = None;
            s.bsky = None;
        }
        s
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const VARS: [&str; 6] = [
        "DEVELOPMENT",
        "DISCORD_BOT_TOKEN",
        "DISCORD_ADMIN_USER",
        "X_USER_TOKEN",
        "BSKY_HANDLE",
        "BSKY_APP_PASSWORD",
    ];

    fn clear() {
        for v in VARS {
            env::remove_var(v);
        }
    }

    #[serial_test::serial]
    #[test]
    fn reads_credentials_and_development_switch() {
        clear();
        env::set_var("DISCORD_BOT_TOKEN", "tok");
        env::set_var("DISCORD_ADMIN_USER", "1234");
        env::set_var("X_USER_TOKEN", "x");
        env::set_var("BSKY_HANDLE", "deals.bsky.social");
        env::set_var("BSKY_APP_PASSWORD", "pw");

        let s = Secrets::from_env();
        assert_eq!(s.discord_token.as_deref(), Some("tok"));
        assert_eq!(s.admin_user, Some(1234));
        assert!(s.x_token.is_some());
        assert!(s.bsky.is_some());
        assert!(!format!("{s:?}").contains("pw"));

        env::set_var("DEVELOPMENT", "1");
        let s = Secrets::from_env();
        assert!(s.x_token.is_none());
        assert!(s.bsky.is_none());
        assert!(s.discord_token.is_some());
        clear();
    }

    #[serial_test::serial]
    #[test]
    fn partial_bluesky_credentials_are_ignored() {
        clear();
        env::set_var("BSKY_HANDLE", "deals.bsky.social");
        env::set_var("DISCORD_ADMIN_USER", "not-a-number");
        let s = Secrets::from_env();
        assert!(s.bsky.is_none());
        assert!(s.admin_user.is_none());
        clear();
    }
}
