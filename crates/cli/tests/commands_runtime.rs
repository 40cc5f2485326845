use std::env;
use std::sync::{Mutex, OnceLock};

use relist_cli::commands::{migrate, seed, smoke};
use serde_json::Value;

#[test]
fn migrate_returns_success_with_valid_env() {
    with_env(&[("RELIST_DATABASE_URL", "sqlite::memory:")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 0, "expected successful migrate run");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "ok");
    });
}

#[test]
fn migrate_returns_config_failure_with_invalid_database_url() {
    with_env(&[("RELIST_DATABASE_URL", "postgres://nope")], || {
        let result = migrate::run();
        assert_eq!(result.exit_code, 2, "expected config validation failure code");

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "migrate");
        assert_eq!(payload["status"], "error");
        assert_eq!(payload["error_class"], "config_validation");
    });
}

#[test]
fn seed_loads_demo_dataset() {
    with_env(&[("RELIST_DATABASE_URL", "sqlite::memory:")], || {
        let result = seed::run();
        assert_eq!(result.exit_code, 0, "expected successful seed run: {}", result.output);

        let payload = parse_payload(&result.output);
        assert_eq!(payload["command"], "seed");
        assert_eq!(payload["status"], "ok");
        let message = payload["message"].as_str().unwrap_or_default();
        assert!(message.contains("demo-owner"), "seed summary names the owner: {message}");
    });
}

#[test]
fn smoke_passes_end_to_end_with_in_memory_database() {
    with_env(&[("RELIST_DATABASE_URL", "sqlite::memory:")], || {
        let result = smoke::run();
        assert_eq!(result.exit_code, 0, "expected smoke pass: {}", result.output);

        let machine_line =
            result.output.lines().last().expect("smoke output has a machine-readable line");
        let payload: Value = serde_json::from_str(machine_line).expect("machine line is JSON");
        assert_eq!(payload["status"], "pass");

        let checks = payload["checks"].as_array().expect("checks array");
        let names: Vec<&str> =
            checks.iter().filter_map(|check| check["name"].as_str()).collect();
        assert!(names.contains(&"market_stats"));
        assert!(names.contains(&"recommendation_cycle"));
        assert!(checks.iter().all(|check| check["status"] == "pass"));
    });
}

#[test]
fn smoke_reports_config_failure_and_skips_downstream_checks() {
    with_env(&[("RELIST_LLM_PROVIDER", "openai")], || {
        // openai without an api key fails config validation.
        let result = smoke::run();
        assert_eq!(result.exit_code, 6, "expected smoke failure exit code");

        let machine_line =
            result.output.lines().last().expect("smoke output has a machine-readable line");
        let payload: Value = serde_json::from_str(machine_line).expect("machine line is JSON");
        assert_eq!(payload["status"], "fail");

        let checks = payload["checks"].as_array().expect("checks array");
        assert_eq!(checks[0]["name"], "config_validation");
        assert_eq!(checks[0]["status"], "fail");
        assert!(checks[1..].iter().all(|check| check["status"] == "skipped"));
    });
}

fn parse_payload(output: &str) -> Value {
    serde_json::from_str(output).unwrap_or_else(|error| {
        panic!("command output should be JSON, got `{output}`: {error}")
    })
}

static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

const MANAGED_VARS: &[&str] = &[
    "RELIST_DATABASE_URL",
    "RELIST_LLM_PROVIDER",
    "RELIST_LLM_API_KEY",
    "RELIST_LOG_LEVEL",
    "RELIST_LOG_FORMAT",
];

fn with_env(vars: &[(&str, &str)], body: impl FnOnce()) {
    let lock = ENV_LOCK.get_or_init(|| Mutex::new(()));
    let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

    for var in MANAGED_VARS {
        env::remove_var(var);
    }
    for (key, value) in vars {
        env::set_var(key, value);
    }

    let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(body));

    for var in MANAGED_VARS {
        env::remove_var(var);
    }

    if let Err(panic) = result {
        std::panic::resume_unwind(panic);
    }
}
