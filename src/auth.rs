use std::path::PathBuf;

use crate::config::{config_dir, Config};
use crate::error::{Result, RosterError};

/// Try to run a CLI command and capture stdout as a key
fn try_cli_key(command: &str) -> Option<String> {
    let output = std::process::Command::new("sh")
        .args(["-c", command])
        .output()
        .ok()?;

    if output.status.success() {
        non_empty(&String::from_utf8_lossy(&output.stdout))
    } else {
        None
    }
}

fn non_empty(raw: &str) -> Option<String> {
    let key = raw.trim();
    if key.is_empty() {
        None
    } else {
        Some(key.to_string())
    }
}

/// Stored key path: ~/.config/roster/api_key
fn key_path() -> Option<PathBuf> {
    Some(config_dir()?.join("api_key"))
}

fn load_stored_key() -> Option<String> {
    let key = std::fs::read_to_string(key_path()?).ok()?;
    non_empty(&key)
}

fn save_key(key: &str) -> std::io::Result<()> {
    if let Some(path) = key_path() {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, key)?;
    }
    Ok(())
}

/// Resolve the backend API key, trying in order:
/// 1. The configured env var (ROSTER_API_KEY by default)
/// 2. The stored key in ~/.config/roster/api_key
/// 3. The configured key command, whose output is stored for next time
pub fn load_api_key(config: &Config) -> Result<String> {
    let env_var = config.api_key_env();
    if let Some(key) = std::env::var(env_var).ok().and_then(|k| non_empty(&k)) {
        return Ok(key);
    }

    if let Some(key) = load_stored_key() {
        return Ok(key);
    }

    if let Some(cmd) = &config.backend.api_key_command {
        if let Some(key) = try_cli_key(cmd) {
            if let Err(e) = save_key(&key) {
                tracing::warn!(error = %e, "could not store API key");
            }
            return Ok(key);
        }
    }

    Err(RosterError::Auth(format!(
        "No API key found. Set {} or configure backend.api_key_command.",
        env_var
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blank_keys_are_ignored() {
        assert_eq!(non_empty("  \n"), None);
        assert_eq!(non_empty(" abc\n"), Some("abc".to_string()));
    }

    #[test]
    fn cli_key_trims_output() {
        assert_eq!(try_cli_key("echo '  secret  '"), Some("secret".to_string()));
    }

    #[test]
    fn failing_cli_yields_nothing() {
        assert_eq!(try_cli_key("exit 1"), None);
        assert_eq!(try_cli_key("true"), None);
    }
}
