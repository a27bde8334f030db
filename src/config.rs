//! Configuration loading from `.env` files.

use std::{env, time::Duration};

use crate::error::{Error, Result};

/// Runtime settings derived from environment variables.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Hex secret key used to sign encoded events.
    pub secret_key: Option<String>,
    /// Relays queried by `fetch`.
    pub relays: Vec<String>,
    /// Optional Tor SOCKS proxy (host:port).
    pub tor_socks: Option<String>,
    /// Per-relay fetch timeout.
    pub fetch_timeout: Duration,
    /// Verify ids and signatures of events read or fetched.
    pub verify_sig: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            secret_key: None,
            relays: vec![],
            tor_socks: None,
            fetch_timeout: Duration::from_secs(10),
            verify_sig: false,
        }
    }
}

impl Settings {
    /// Load settings from the specified `.env` file.
    pub fn from_env(path: &str) -> Result<Self> {
        dotenvy::from_filename(path)
            .map_err(|e| Error::Config(format!("reading env file {path}: {e}")))?;
        let secret_key = non_empty_var("SECRET_KEY");
        let relays = csv_strings(env::var("RELAYS").unwrap_or_default());
        let tor_socks = non_empty_var("TOR_SOCKS");
        let fetch_timeout = match non_empty_var("FETCH_TIMEOUT_SECS") {
            Some(raw) => Duration::from_secs(raw.trim().parse().map_err(|_| {
                Error::Config(format!("FETCH_TIMEOUT_SECS is not a number: {raw}"))
            })?),
            None => Duration::from_secs(10),
        };
        let verify_sig = env::var("VERIFY_SIG").unwrap_or_else(|_| "0".into()) == "1";
        Ok(Self {
            secret_key,
            relays,
            tor_socks,
            fetch_timeout,
            verify_sig,
        })
    }
}

fn non_empty_var(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.trim().is_empty())
}

/// Split a comma-separated string into trimmed string values.
pub fn csv_strings(input: impl AsRef<str>) -> Vec<String> {
    let s = input.as_ref();
    s.split(',')
        .filter_map(|s| {
            let t = s.trim();
            if t.is_empty() {
                None
            } else {
                Some(t.to_string())
            }
        })
        .collect()
}

/// Contents of a fresh `.env` with every key present and defaults applied.
pub fn default_env_file() -> String {
    concat!(
        "SECRET_KEY=\n",
        "RELAYS=\n",
        "TOR_SOCKS=\n",
        "FETCH_TIMEOUT_SECS=10\n",
        "VERIFY_SIG=0\n",
    )
    .to_string()
}
