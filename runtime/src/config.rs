//! Runtime configuration from the environment.
//!
//! The password is loaded from (in order of priority):
//! 1. `VEGA_PASSWORD_FILE` env → reads the password from the file path
//! 2. `VEGA_PASSWORD` env → uses the value directly (visible in `ps`, not recommended)
//!
//! Using `VEGA_PASSWORD_FILE` is recommended because file paths are not
//! visible in the process list, unlike environment variable values.

use anyhow::{bail, Context, Result};

/// Everything the bot needs to talk to one game server as one player.
#[derive(Debug, Clone)]
pub struct BotConfig {
    /// Base URL of the game server, e.g. `https://s142-en.example.com`.
    pub server_url: String,
    pub username: String,
    pub password: String,
    /// Base32 TOTP secret when the account has two-factor login enabled.
    pub otp_secret: Option<String>,
    pub language: String,
    /// Per-request timeout in milliseconds.
    pub timeout_ms: u64,
}

impl BotConfig {
    /// Load configuration from `VEGA_*` environment variables.
    pub fn from_env() -> Result<Self> {
        let server_url = std::env::var("VEGA_SERVER_URL")
            .context("VEGA_SERVER_URL is required (base URL of the game server)")?
            .trim_end_matches('/')
            .to_string();
        let username =
            std::env::var("VEGA_USERNAME").context("VEGA_USERNAME is required")?;
        let password = load_password()?;
        let otp_secret = std::env::var("VEGA_OTP_SECRET").ok();
        let language = std::env::var("VEGA_LANGUAGE").unwrap_or_else(|_| "en".to_string());
        let timeout_ms = std::env::var("VEGA_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(20_000);

        Ok(Self {
            server_url,
            username,
            password,
            otp_secret,
            language,
            timeout_ms,
        })
    }
}

fn load_password() -> Result<String> {
    // 1. VEGA_PASSWORD_FILE (recommended)
    if let Ok(path) = std::env::var("VEGA_PASSWORD_FILE") {
        let raw = std::fs::read_to_string(&path).with_context(|| {
            format!(
                "Cannot read password file at '{path}'. \
                 Check that the file exists and is readable."
            )
        })?;
        let password = raw.trim_end_matches(['\r', '\n']).to_string();
        if password.is_empty() {
            bail!("password file '{path}' is empty");
        }
        return Ok(password);
    }

    // 2. VEGA_PASSWORD (not recommended — visible in process list)
    std::env::var("VEGA_PASSWORD")
        .context("set VEGA_PASSWORD_FILE or VEGA_PASSWORD")
}
