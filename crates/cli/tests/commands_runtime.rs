use std::env;
use std::sync::{Mutex, OnceLock};

use concierge_cli::commands::{config, doctor, migrate, route, seed};
use serde_json::Value;

const OFFLINE_ENV: &[(&str, &str)] = &[
    ("CONCIERGE_DATABASE_URL", "sqlite::memory:"),
    ("CONCIERGE_DATABASE_MAX_CONNECTIONS", "1"),
    ("CONCIERGE_LLM_PROVIDER", "disabled"),
];

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(OFFLINE_ENV, || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
        assert_eq!(payload["message"], "applied pending migrations (5 recorded)");
    });
}

#[test]
fn migrate_returns_config_failure_when_whatsapp_lacks_credentials() {
    let env =
        [("CONCIERGE_DATABASE_URL", "sqlite::memory:"), ("CONCIERGE_WHATSAPP_ENABLED", "true")];
    with_env(&env, || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
        assert!(payload["message"].as_str().unwrap_or_default().contains("whatsapp.access_token"));
    });
}

#[test]
fn seed_loads_and_verifies_the_demo_dataset() {
    with_env(OFFLINE_ENV, || {
        let result = seed::run(false);
        assert_eq!(result.exit_code, 0, "expected seed success: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "seed");
        assert_eq!(payload["message"], "demo dataset loaded: 6 listings, 3 knowledge articles");
    });
}

#[test]
fn seed_clean_succeeds_on_an_empty_database() {
    with_env(OFFLINE_ENV, || {
        let result = seed::run(true);
        assert_eq!(result.exit_code, 0, "expected clean success: {}", result.output);
        assert_eq!(parse_payload(&result.output)["message"], "demo listings and articles removed");
    });
}

#[test]
fn doctor_reports_disabled_integrations_as_warnings() {
    with_env(OFFLINE_ENV, || {
        let payload = parse_payload(&doctor::run(true));
        assert_eq!(payload["overall_status"], "pass");

        let checks = payload["checks"].as_array().expect("checks array");
        let status_of = |name: &str| {
            checks
                .iter()
                .find(|check| check["name"] == name)
                .map(|check| check["status"].clone())
                .unwrap_or(Value::Null)
        };
        assert_eq!(status_of("config_validation"), "pass");
        assert_eq!(status_of("llm_readiness"), "warn");
        assert_eq!(status_of("whatsapp_readiness"), "warn");
        // A fresh in-memory database has no schema yet.
        assert_eq!(status_of("database_connectivity"), "warn");
    });
}

#[test]
fn doctor_fails_and_skips_when_config_is_invalid() {
    with_env(&[("CONCIERGE_ROUTING_SWITCH_THRESHOLD", "not-a-number")], || {
        let payload = parse_payload(&doctor::run(true));
        assert_eq!(payload["overall_status"], "fail");
        assert_eq!(payload["checks"][0]["status"], "fail");
        assert_eq!(payload["checks"][3]["status"], "skipped");
    });
}

#[test]
fn config_attributes_env_overrides_and_redacts_secrets() {
    with_env(
        &[
            ("CONCIERGE_DATABASE_URL", "sqlite::memory:"),
            ("CONCIERGE_WHATSAPP_ENABLED", "true"),
            ("CONCIERGE_WHATSAPP_ACCESS_TOKEN", "EAAGsecretvalue1234"),
            ("CONCIERGE_WHATSAPP_PHONE_NUMBER_ID", "1098765"),
        ],
        || {
            let output = config::run();
            assert!(output.contains(
                "- database.url = sqlite::memory: (source: env (CONCIERGE_DATABASE_URL))"
            ));
            assert!(output.contains("- whatsapp.access_token = ***1234"));
            assert!(!output.contains("EAAGsecretvalue1234"));
            assert!(output.contains("- server.port = 8080 (source: default)"));
        },
    );
}

#[test]
fn route_offline_traces_a_search_on_an_empty_database() {
    with_env(OFFLINE_ENV, || {
        let result = route::run("cli-test", "2 bedroom apartment in Girne under 500", true);
        assert_eq!(result.exit_code, 0, "expected route success: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "route");
        assert_eq!(payload["trace"]["resolved_intent"], "property_search");
        assert_eq!(payload["trace"]["action"], "search");
        assert_eq!(payload["trace"]["active_domain"], "real_estate_agent");
        assert!(payload["trace"]["response"]["message"]
            .as_str()
            .unwrap_or_default()
            .starts_with("I couldn't find properties matching your request"));
        assert_eq!(payload["trace"]["response"]["recommendations"], Value::Array(Vec::new()));
    });
}

#[test]
fn route_offline_contact_request_reports_send_failed_without_whatsapp() {
    with_env(OFFLINE_ENV, || {
        let result = route::run("cli-test", "contact listing 4", true);
        assert_eq!(result.exit_code, 0, "expected route success: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["trace"]["resolved_intent"], "agent_outreach");
        assert_eq!(payload["trace"]["resolver_rule"], "pinned_listing_contact");
        assert_eq!(payload["trace"]["outreach"]["ok"], false);
    });
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).expect("command output should be valid JSON")
}

fn with_env(vars: &[(&str, &str)], test_fn: impl FnOnce()) {
    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();
    let _guard =
        ENV_LOCK.get_or_init(|| Mutex::new(())).lock().expect("env mutex should not be poisoned");

    let keys = [
        "CONCIERGE_DATABASE_URL",
        "CONCIERGE_DATABASE_MAX_CONNECTIONS",
        "CONCIERGE_DATABASE_TIMEOUT_SECS",
        "CONCIERGE_LLM_PROVIDER",
        "CONCIERGE_LLM_API_KEY",
        "CONCIERGE_LLM_BASE_URL",
        "CONCIERGE_LLM_MODEL",
        "CONCIERGE_WHATSAPP_ENABLED",
        "CONCIERGE_WHATSAPP_ACCESS_TOKEN",
        "CONCIERGE_WHATSAPP_PHONE_NUMBER_ID",
        "CONCIERGE_SERVER_BIND_ADDRESS",
        "CONCIERGE_SERVER_PORT",
        "CONCIERGE_ROUTING_SWITCH_THRESHOLD",
        "CONCIERGE_LOGGING_LEVEL",
        "CONCIERGE_LOGGING_FORMAT",
        "CONCIERGE_LOG_LEVEL",
        "CONCIERGE_LOG_FORMAT",
    ];

    let previous_values: Vec<(&str, Option<String>)> =
        keys.iter().map(|key| (*key, env::var(key).ok())).collect();

    for key in &keys {
        env::remove_var(key);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    test_fn();

    for (key, value) in previous_values {
        if let Some(value) = value {
            env::set_var(key, value);
        } else {
            env::remove_var(key);
        }
    }
}
