use std::io::Write;

use taskgraph_core::config::AppConfig;

#[test]
fn test_load_full_config_from_file() {
    let toml_content = r#"
[engine]
working_dir = "/tmp/taskgraph-test"
summary_max_chars = 120
event_capacity = 64

[model]
provider = "openai"
model_id = "gpt-4o-mini"
api_key = "sk-test-key"
base_url = "http://localhost:11434/v1/chat/completions"
max_tokens = 2048
temperature = 0.5

[http]
connect_timeout_secs = 3
user_agent = "taskgraph-ci"

[globals]
working_dir = "/srv/reports"

[globals.http_headers]
Authorization = "Bearer abc"
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");

    assert_eq!(config.engine.working_dir, "/tmp/taskgraph-test");
    assert_eq!(config.engine.summary_max_chars, 120);
    assert_eq!(config.engine.event_capacity, 64);

    let model = config.model.expect("model present");
    assert_eq!(model.model_id, "gpt-4o-mini");
    assert_eq!(model.api_key, Some("sk-test-key".to_string()));
    assert_eq!(model.max_tokens, 2048);

    assert_eq!(config.http.connect_timeout_secs, 3);
    assert_eq!(config.http.user_agent, "taskgraph-ci");
    assert_eq!(config.globals["working_dir"], "/srv/reports");
    assert_eq!(config.globals["http_headers"]["Authorization"], "Bearer abc");
}

#[test]
fn test_env_var_expansion_in_config() {
    std::env::set_var("TASKGRAPH_TEST_API_KEY", "expanded-key-value");

    let toml_content = r#"
[model]
model_id = "test-model"
api_key = "${TASKGRAPH_TEST_API_KEY}"
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");
    assert_eq!(
        config.model.expect("model present").api_key,
        Some("expanded-key-value".to_string())
    );

    std::env::remove_var("TASKGRAPH_TEST_API_KEY");
}

#[test]
fn test_minimal_config_uses_defaults() {
    let toml_content = r#"
[model]
model_id = "llama3.2"
"#;

    let mut tmp = tempfile::NamedTempFile::new().expect("create temp file");
    tmp.write_all(toml_content.as_bytes()).expect("write toml");

    let config = AppConfig::load(tmp.path()).expect("load config");

    assert_eq!(config.engine.working_dir, ".");
    assert_eq!(config.engine.summary_max_chars, 200);
    assert_eq!(config.engine.event_capacity, 256);
    assert_eq!(config.http.connect_timeout_secs, 10);
    assert!(config.http.user_agent.starts_with("taskgraph/"));
    assert!(config.globals.is_empty());

    let model = config.model.expect("model present");
    assert_eq!(model.provider, "openai");
    assert_eq!(model.max_tokens, 4096);
    assert!(model.base_url.is_none());
}

#[test]
fn test_empty_config_has_no_model() {
    let tmp = tempfile::NamedTempFile::new().expect("create temp file");
    let config = AppConfig::load(tmp.path()).expect("load config");
    assert!(config.model.is_none());
}

#[test]
fn test_missing_config_file() {
    let err = AppConfig::load(std::path::Path::new("/nonexistent/taskgraph.toml")).unwrap_err();
    assert!(err.to_string().contains("Config file not found"));
}
