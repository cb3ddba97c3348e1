//! Access token lookup
//!
//! Precedence: explicit `--token`, then the configured environment variable,
//! then `hub.token` from the config file, then the token file written by
//! `huggingface-cli login`.

use std::path::PathBuf;

use crate::config::HubConfig;

/// Resolves the token to send with Hub requests, if any
pub fn resolve_token(explicit: Option<&str>, hub: &HubConfig) -> Option<String> {
    if let Some(token) = explicit.map(str::trim).filter(|t| !t.is_empty()) {
        return Some(token.to_string());
    }

    if let Ok(token) = std::env::var(&hub.token_env) {
        let token = token.trim();
        if !token.is_empty() {
            return Some(token.to_string());
        }
    }

    if let Some(token) = hub.token.as_deref().map(str::trim).filter(|t| !t.is_empty()) {
        return Some(token.to_string());
    }

    let path = token_file()?;
    let token = std::fs::read_to_string(&path).ok()?;
    let token = token.trim();
    if token.is_empty() {
        None
    } else {
        tracing::debug!("Using token from {:?}", path);
        Some(token.to_string())
    }
}

/// `$HF_HOME/token`, defaulting to `~/.cache/huggingface/token`
fn token_file() -> Option<PathBuf> {
    let hf_home = match std::env::var_os("HF_HOME") {
        Some(home) => PathBuf::from(home),
        None => dirs::home_dir()?.join(".cache").join("huggingface"),
    };
    Some(hf_home.join("token"))
}
