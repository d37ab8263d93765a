//! Coverage for config parsing and validation.

use std::io::Write;

use relaybot::config::{load_config, Config, ConfigError, PipelineKind, RuntimePaths};
use relaybot::message::{ChatId, Platform};

#[test]
fn example_config_parses_and_validates() {
    let config: Config =
        toml::from_str(include_str!("../../config.example.toml")).expect("should parse");
    config.validate().expect("should validate");

    assert!(config.transports.whatsapp.is_some());
    assert!(config.transports.telegram.is_some());
    assert!(config.transports.signal.is_some());
    assert!(config.transports.telethon.is_none());

    let kinds: Vec<PipelineKind> = config.pipelines.iter().map(|p| p.kind).collect();
    assert_eq!(kinds.first(), Some(&PipelineKind::History));
    assert_eq!(kinds.last(), Some(&PipelineKind::Undo));
    assert_eq!(
        config.pipelines[2].blocked_chats,
        vec![ChatId::new(Platform::Telegram, "-1001234567890")]
    );

    let openai = config.services.openai.expect("openai section");
    assert_eq!(openai.base_url, "https://api.openai.com/v1");
    assert!((openai.input_cost_per_mtok - 0.15).abs() < f64::EPSILON);

    assert_eq!(config.notifications.len(), 1);
    assert!(config.notifications[0].enabled);
}

#[test]
fn unknown_chat_platform_is_a_parse_error() {
    let toml_str = r#"
[[pipelines]]
kind = "ask"
allowed_chats = ["irc://#rust"]
"#;
    assert!(toml::from_str::<Config>(toml_str).is_err());
}

#[test]
fn unknown_pipeline_kind_is_a_parse_error() {
    assert!(toml::from_str::<Config>("[[pipelines]]\nkind = \"teleport\"\n").is_err());
}

#[test]
fn invalid_cron_fails_validation() {
    let toml_str = r#"
[[notifications]]
name = "broken"
cron = "every day"
chat = "signal://+4912345"
text = "hi"
"#;
    let config: Config = toml::from_str(toml_str).expect("should parse");
    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidCron { name, .. }) if name == "broken"
    ));
}

#[test]
fn invalid_bridge_url_fails_validation() {
    let toml_str = r#"
[transports.whatsapp]
bridge_url = "not a url"
"#;
    let config: Config = toml::from_str(toml_str).expect("should parse");
    assert!(matches!(
        config.validate(),
        Err(ConfigError::InvalidUrl {
            field: "transports.whatsapp.bridge_url",
            ..
        })
    ));
}

#[test]
fn load_config_reads_and_validates_a_file() {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    writeln!(file, "[[pipelines]]\nkind = \"help\"").expect("write");
    let config = load_config(file.path()).expect("should load");
    assert_eq!(config.pipelines.len(), 1);

    let mut bad = tempfile::NamedTempFile::new().expect("temp file");
    writeln!(
        bad,
        "[[pipelines]]\nkind = \"ask\"\nallowed_chats = [\"telegram://1\"]\nblocked_chats = [\"telegram://2\"]"
    )
    .expect("write");
    assert!(load_config(bad.path()).is_err());
}

#[test]
fn runtime_paths_layout() {
    let dir = tempfile::tempdir().expect("tempdir");
    let paths = RuntimePaths::under(dir.path());
    assert_eq!(paths.config_toml, dir.path().join("config.toml"));
    assert_eq!(paths.env_file, dir.path().join(".env"));
    assert!(paths.database().starts_with(dir.path().join("data")));
}
