//! Tests for `src/dispatch/access.rs`: allow and block lists.

use relaybot::config::ConfigError;
use relaybot::dispatch::ChatAccess;

use crate::support::telegram_chat;

#[test]
fn empty_lists_allow_everywhere() {
    let access = ChatAccess::from_lists(Vec::new(), Vec::new()).expect("valid");
    assert_eq!(access, ChatAccess::Everywhere);
    assert!(access.allows(&telegram_chat("1")));
}

#[test]
fn allow_list_admits_only_listed_chats() {
    let access = ChatAccess::from_lists(vec![telegram_chat("1")], Vec::new()).expect("valid");
    assert!(access.allows(&telegram_chat("1")));
    assert!(!access.allows(&telegram_chat("2")));
}

#[test]
fn block_list_excludes_listed_chats() {
    let access = ChatAccess::from_lists(Vec::new(), vec![telegram_chat("1")]).expect("valid");
    assert!(!access.allows(&telegram_chat("1")));
    assert!(access.allows(&telegram_chat("2")));
}

#[test]
fn both_lists_are_rejected() {
    let result = ChatAccess::from_lists(vec![telegram_chat("1")], vec![telegram_chat("2")]);
    assert_eq!(result, Err(ConfigError::ConflictingAccessLists));
}
