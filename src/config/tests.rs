use super::*;
use std::io::Write;
use tempfile::NamedTempFile;

// === DEFAULT VALUE TESTS ===

#[test]
fn test_default_config() {
    let config = Config::default();
    assert_eq!(config.server.host, "0.0.0.0");
    assert_eq!(config.server.port, 8402);
    assert_eq!(config.server.workers, num_cpus::get());
    assert!(config.server.public_url.is_none());
    assert_eq!(
        config.registry.url.to_string(),
        "https://registry-1.docker.io/"
    );
    assert_eq!(
        config.goproxy.mirror_url.to_string(),
        "https://proxy.golang.org/"
    );
    assert_eq!(config.mirror.cdn_url.to_string(), "https://cdn.jsdelivr.net/");
    assert_eq!(config.mirror.cnb_url.to_string(), "https://cnb.cool/");
    assert!(config.chat.api_key.is_none());
    assert_eq!(config.cache.max_entries, 2048);
    assert_eq!(config.cache.default_ttl_secs, 60);
    assert_eq!(config.logging.level, "info");
    assert!(!config.logging.json);
}

#[test]
fn test_default_chat_config() {
    let chat = ChatConfig::default();
    assert_eq!(chat.url.to_string(), "https://api.deepseek.com/chat/completions");
    assert_eq!(chat.extended_timeout_secs, 300);
    assert_eq!(
        chat.models,
        vec!["deepseek-chat".to_string(), "deepseek-reasoner".to_string()]
    );
}

// === TOML PARSING TESTS ===

#[test]
fn test_parse_minimal_config() {
    let toml = r#"
        [server]
        host = "127.0.0.1"
        port = 8080
    "#;
    let config: Config = toml::from_str(toml).unwrap();
    assert_eq!(config.server.host, "127.0.0.1");
    assert_eq!(config.server.port, 8080);
    assert_eq!(
        config.registry.url.to_string(),
        "https://registry-1.docker.io/"
    );
}

#[test]
fn test_parse_full_config() {
    let toml = r#"
        [server]
        host = "0.0.0.0"
        port = 3000
        workers = 4
        public_url = "https://edge.example.com"

        [registry]
        url = "https://registry.example.com"

        [goproxy]
        mirror_url = "https://goproxy.example.com"

        [mirror]
        cdn_url = "https://cdn.example.com"
        cnb_url = "https://scm.example.com"

        [chat]
        url = "https://llm.example.com/v1/chat/completions"
        api_key = "sk-test"
        models = ["tiny-model"]
        extended_timeout_secs = 120

        [cache]
        max_entries = 32
        default_ttl_secs = 15
        purge_schedule = ""

        [logging]
        level = "debug"
        json = true
    "#;
    let config: Config = toml::from_str(toml).unwrap();
    assert_eq!(config.server.workers, 4);
    assert_eq!(config.server.public_url.as_deref(), Some("https://edge.example.com"));
    assert_eq!(config.registry.url.to_string(), "https://registry.example.com/");
    assert_eq!(config.goproxy.mirror_url.to_string(), "https://goproxy.example.com/");
    assert_eq!(config.mirror.cdn_url.to_string(), "https://cdn.example.com/");
    assert_eq!(config.chat.api_key.as_deref(), Some("sk-test"));
    assert_eq!(config.chat.models, vec!["tiny-model".to_string()]);
    assert_eq!(config.chat.extended_timeout_secs, 120);
    assert_eq!(config.cache.max_entries, 32);
    assert!(config.cache.purge_schedule.is_empty());
    assert_eq!(config.logging.level, "debug");
    assert!(config.logging.json);
}

#[test]
fn test_parse_rejects_bad_url() {
    let toml = r#"
        [registry]
        url = "not a url at all"
    "#;
    assert!(toml::from_str::<Config>(toml).is_err());
}

// === VALIDATION TESTS ===

#[test]
fn test_validate_default_config() {
    Config::default().validate().unwrap();
}

#[test]
fn test_validate_rejects_non_http_scheme() {
    let toml = r#"
        [registry]
        url = "ftp://registry.example.com"
    "#;
    let config: Config = toml::from_str(toml).unwrap();
    assert!(config.validate().is_err());
}

#[test]
fn test_validate_rejects_zero_cache_capacity() {
    let toml = r#"
        [cache]
        max_entries = 0
    "#;
    let config: Config = toml::from_str(toml).unwrap();
    assert!(config.validate().is_err());
}

// === LOAD TESTS ===

#[test]
fn test_load_from_file() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "[server]\nport = 9999").unwrap();
    let config = Config::load(Some(file.path().to_path_buf())).unwrap();
    assert_eq!(config.server.port, 9999);
}

#[test]
fn test_load_missing_file_uses_defaults() {
    let config = Config::load(Some("/nonexistent/edgeway.toml".into())).unwrap();
    assert_eq!(config.server.port, 8402);
}

// === CHAT KEY RESOLUTION TESTS ===

#[test]
fn test_chat_api_key_from_config_wins() {
    let mut chat = ChatConfig {
        api_key: Some("sk-file".to_string()),
        ..ChatConfig::default()
    };
    chat.resolve_api_key();
    assert_eq!(chat.api_key.as_deref(), Some("sk-file"));
}

#[test]
fn test_chat_api_key_env_fallback() {
    let mut chat = ChatConfig::default();
    // SAFETY: test-local mutation of a variable nothing else reads
    unsafe { std::env::set_var("EDGEWAY_CHAT_API_KEY", "sk-env") };
    chat.resolve_api_key();
    unsafe { std::env::remove_var("EDGEWAY_CHAT_API_KEY") };
    assert_eq!(chat.api_key.as_deref(), Some("sk-env"));
}
