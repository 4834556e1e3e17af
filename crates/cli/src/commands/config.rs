use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use concierge_core::config::{AppConfig, LoadOptions};
use secrecy::ExposeSecret;
use toml::Value;

struct Field {
    key: &'static str,
    value: String,
    env_key: Option<&'static str>,
}

impl Field {
    fn new(key: &'static str, value: impl Into<String>, env_key: Option<&'static str>) -> Self {
        Self { key, value: value.into(), env_key }
    }
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for field in fields(&config) {
        let source = field_source(
            field.key,
            field.env_key,
            config_file_doc.as_ref(),
            config_file_path.as_deref(),
        );
        lines.push(format!("- {} = {} (source: {source})", field.key, field.value));
    }

    lines.join("\n")
}

fn fields(config: &AppConfig) -> Vec<Field> {
    let llm_api_key = if config.llm.api_key.is_some() { "<redacted>" } else { "<unset>" };
    vec![
        Field::new("database.url", &config.database.url, Some("CONCIERGE_DATABASE_URL")),
        Field::new(
            "database.max_connections",
            config.database.max_connections.to_string(),
            Some("CONCIERGE_DATABASE_MAX_CONNECTIONS"),
        ),
        Field::new(
            "llm.provider",
            format!("{:?}", config.llm.provider),
            Some("CONCIERGE_LLM_PROVIDER"),
        ),
        Field::new("llm.model", &config.llm.model, Some("CONCIERGE_LLM_MODEL")),
        Field::new(
            "llm.base_url",
            config.llm.base_url.as_deref().unwrap_or("<unset>"),
            Some("CONCIERGE_LLM_BASE_URL"),
        ),
        Field::new("llm.api_key", llm_api_key, Some("CONCIERGE_LLM_API_KEY")),
        Field::new(
            "whatsapp.enabled",
            config.whatsapp.enabled.to_string(),
            Some("CONCIERGE_WHATSAPP_ENABLED"),
        ),
        Field::new(
            "whatsapp.access_token",
            redact_token(config.whatsapp.access_token.expose_secret()),
            Some("CONCIERGE_WHATSAPP_ACCESS_TOKEN"),
        ),
        Field::new(
            "whatsapp.phone_number_id",
            config.whatsapp.phone_number_id.as_deref().unwrap_or("<unset>"),
            Some("CONCIERGE_WHATSAPP_PHONE_NUMBER_ID"),
        ),
        Field::new(
            "whatsapp.follow_up_minutes",
            config.whatsapp.follow_up_minutes.to_string(),
            None,
        ),
        Field::new(
            "server.bind_address",
            &config.server.bind_address,
            Some("CONCIERGE_SERVER_BIND_ADDRESS"),
        ),
        Field::new("server.port", config.server.port.to_string(), Some("CONCIERGE_SERVER_PORT")),
        Field::new(
            "conversation.state_ttl_secs",
            config.conversation.state_ttl_secs.to_string(),
            Some("CONCIERGE_CONVERSATION_STATE_TTL_SECS"),
        ),
        Field::new(
            "routing.switch_threshold",
            config.routing.switch_threshold.to_string(),
            Some("CONCIERGE_ROUTING_SWITCH_THRESHOLD"),
        ),
        Field::new(
            "routing.clarify_threshold",
            config.routing.clarify_threshold.to_string(),
            Some("CONCIERGE_ROUTING_CLARIFY_THRESHOLD"),
        ),
        Field::new(
            "routing.stick_threshold",
            config.routing.stick_threshold.to_string(),
            Some("CONCIERGE_ROUTING_STICK_THRESHOLD"),
        ),
        Field::new("logging.level", &config.logging.level, Some("CONCIERGE_LOGGING_LEVEL")),
        Field::new(
            "logging.format",
            format!("{:?}", config.logging.format),
            Some("CONCIERGE_LOGGING_FORMAT"),
        ),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("concierge.toml"), PathBuf::from("config/concierge.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let raw = fs::read_to_string(path?).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: Option<&str>,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if let Some(env_key) = env_key {
        if env::var_os(env_key).is_some() {
            return format!("env ({env_key})");
        }
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

/// Keeps the last four characters so operators can tell tokens apart.
fn redact_token(token: &str) -> String {
    let trimmed = token.trim();
    if trimmed.is_empty() {
        return "<empty>".to_string();
    }
    let count = trimmed.chars().count();
    if count <= 8 {
        return "<redacted>".to_string();
    }
    let tail: String = trimmed.chars().skip(count - 4).collect();
    format!("***{tail}")
}

#[cfg(test)]
mod tests {
    use toml::Value;

    use super::{contains_path, redact_token};

    #[test]
    fn tokens_are_redacted_to_their_tail() {
        assert_eq!(redact_token(""), "<empty>");
        assert_eq!(redact_token("short"), "<redacted>");
        assert_eq!(redact_token("EAAG1234567890abcd"), "***abcd");
    }

    #[test]
    fn nested_keys_are_found_in_the_file() {
        let doc: Value = "[whatsapp]\nenabled = true\n".parse().expect("toml");
        assert!(contains_path(&doc, "whatsapp.enabled"));
        assert!(!contains_path(&doc, "whatsapp.access_token"));
    }
}
