//! Tests for command recognition in message bodies.

use relaybot::command::{extract_command, extract_command_full, is_command};
use relaybot::message::{CanonicalMessage, ChatId, Platform};

#[test]
fn plain_command() {
    assert_eq!(extract_command("#help"), Some("help"));
    assert_eq!(extract_command("  #help  "), Some("help"));
}

#[test]
fn text_without_command() {
    assert_eq!(extract_command("hello #help"), None);
    assert_eq!(extract_command(""), None);
    assert!(extract_command_full("no command here").is_none());
}

#[test]
fn name_stops_at_first_non_word_character() {
    assert_eq!(extract_command("#ask_me?"), Some("ask_me"));
    assert_eq!(extract_command("#say(de) hallo"), Some("say"));
}

#[test]
fn params_and_remainder() {
    let parsed = extract_command_full("#say(de) Guten Tag ").expect("command");
    assert_eq!(parsed.command, "say");
    assert_eq!(parsed.params, "de");
    assert_eq!(parsed.remainder, "Guten Tag");
}

#[test]
fn empty_params_differ_from_no_command() {
    let parsed = extract_command_full("#forget").expect("command");
    assert_eq!(parsed.params, "");
    assert_eq!(parsed.remainder, "");
}

#[test]
fn unterminated_params_take_the_rest() {
    let parsed = extract_command_full("#say(de hallo").expect("command");
    assert_eq!(parsed.params, "de hallo");
    assert_eq!(parsed.remainder, "");
}

#[test]
fn is_command_ignores_ascii_case() {
    assert!(is_command("#HELP", "help"));
    assert!(!is_command("#helper", "help"));
    assert!(!is_command("help", "help"));
}

#[test]
fn message_helpers_delegate_to_the_parser() {
    let message = CanonicalMessage::new(
        ChatId::new(Platform::WhatsApp, "123@c.us"),
        "m1",
        "#imagine a red fox",
    );
    assert_eq!(message.command(), Some("imagine"));
    assert!(message.is_command("imagine"));
    let parsed = message.parsed_command().expect("command");
    assert_eq!(parsed.remainder, "a red fox");
}
