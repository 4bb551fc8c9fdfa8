use anyhow::{anyhow, Result};

const DEFAULT_MODEL: &str = "llama-3.1-8b-instant";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone)]
pub struct Config {
    pub groq_api_key: String,
    pub groq_model: String,
    pub fmp_api_key: String,
    pub request_timeout_secs: u64,
}

impl Config {
    /// Read configuration from the environment, with a best-effort .env
    /// fallback for local runs.
    pub fn load() -> Result<Self> {
        load_dotenv();

        let groq_api_key = require("GROQ_API_KEY")?;
        let fmp_api_key = require("FMP_API_KEY")?;
        let groq_model =
            std::env::var("GROQ_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let request_timeout_secs = std::env::var("REQUEST_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        Ok(Self {
            groq_api_key,
            groq_model,
            fmp_api_key,
            request_timeout_secs,
        })
    }
}

fn require(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| anyhow!("{} not found. Please set it as an environment variable", key))
}

/// Load environment variables from .env (best-effort). Checked in the
/// current directory and up to two parents so `cargo run -p` works from
/// anywhere in the workspace.
fn load_dotenv() {
    load_env_file_if_present(".env");
    load_env_file_if_present("../.env");
    load_env_file_if_present("../../.env");
}

fn load_env_file_if_present(path: &str) {
    if let Ok(content) = std::fs::read_to_string(path) {
        parse_env_file(&content);
    }
}

fn parse_env_file(content: &str) {
    for line in content.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = parse_key_value(trimmed) {
            set_env_if_unset(key, value);
        }
    }
}

fn parse_key_value(line: &str) -> Option<(String, String)> {
    let mut parts = line.splitn(2, '=');
    let key = parts.next()?.trim();
    let value = parts
        .next()?
        .trim()
        .trim_matches('"')
        .trim_matches('\'')
        .to_string();

    if key.is_empty() {
        return None;
    }

    Some((key.to_string(), value))
}

fn set_env_if_unset(key: String, value: String) {
    if std::env::var(&key).is_err() {
        unsafe {
            std::env::set_var(key, value);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_quoted_values() {
        assert_eq!(
            parse_key_value(r#"GROQ_API_KEY="abc123""#),
            Some(("GROQ_API_KEY".to_string(), "abc123".to_string()))
        );
    }

    #[test]
    fn rejects_empty_keys() {
        assert_eq!(parse_key_value("=value"), None);
    }

    #[test]
    fn keeps_equals_in_values() {
        assert_eq!(
            parse_key_value("KEY=a=b"),
            Some(("KEY".to_string(), "a=b".to_string()))
        );
    }
}
