//! Chat-scoped access control for pipelines.

use std::collections::HashSet;

use crate::config::ConfigError;
use crate::message::ChatId;

/// Where a pipeline may run: everywhere, only in listed chats, or everywhere
/// except listed chats. Allow and block lists are mutually exclusive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ChatAccess {
    /// No restriction.
    #[default]
    Everywhere,
    /// Only the listed chats.
    AllowOnly(HashSet<ChatId>),
    /// Every chat except the listed ones.
    BlockOnly(HashSet<ChatId>),
}

impl ChatAccess {
    /// Build access rules from optional allow and block lists. Empty lists
    /// count as unset.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ConflictingAccessLists`] when both are non-empty.
    pub fn from_lists(
        allowed: impl IntoIterator<Item = ChatId>,
        blocked: impl IntoIterator<Item = ChatId>,
    ) -> Result<Self, ConfigError> {
        let allowed: HashSet<ChatId> = allowed.into_iter().collect();
        let blocked: HashSet<ChatId> = blocked.into_iter().collect();
        match (allowed.is_empty(), blocked.is_empty()) {
            (false, false) => Err(ConfigError::ConflictingAccessLists),
            (false, true) => Ok(ChatAccess::AllowOnly(allowed)),
            (true, false) => Ok(ChatAccess::BlockOnly(blocked)),
            (true, true) => Ok(ChatAccess::Everywhere),
        }
    }

    /// Whether a pipeline with these rules may run in `chat`.
    pub fn allows(&self, chat: &ChatId) -> bool {
        match self {
            ChatAccess::Everywhere => true,
            ChatAccess::AllowOnly(allowed) => allowed.contains(chat),
            ChatAccess::BlockOnly(blocked) => !blocked.contains(chat),
        }
    }
}
