use serde::{Deserialize, Serialize};

use crate::types::{Chat, User};

/// Who may message the bot in private chats.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DmPolicy {
    #[default]
    Open,
    Allowlist,
    Disabled,
}

/// Why an update was dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDenied {
    DmsDisabled,
    NotOnAllowlist,
    GroupNotOnAllowlist,
}

impl std::fmt::Display for AccessDenied {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Self::DmsDisabled => "private chats are disabled",
            Self::NotOnAllowlist => "sender is not on the allowlist",
            Self::GroupNotOnAllowlist => "chat is not on the allowlist",
        })
    }
}

/// Decide whether a message from `from` in `chat` may be claimed.
///
/// Allowlist entries match a numeric user ID or a username with or without
/// the leading `@`. An empty group allowlist admits every group.
pub fn check_access(
    dm_policy: DmPolicy,
    allowlist: &[String],
    group_allowlist: &[i64],
    chat: &Chat,
    from: Option<&User>,
) -> Result<(), AccessDenied> {
    if !chat.is_private() {
        if group_allowlist.is_empty() || group_allowlist.contains(&chat.id) {
            return Ok(());
        }
        return Err(AccessDenied::GroupNotOnAllowlist);
    }
    match dm_policy {
        DmPolicy::Open => Ok(()),
        DmPolicy::Disabled => Err(AccessDenied::DmsDisabled),
        // An empty allowlist under the allowlist policy denies everyone.
        DmPolicy::Allowlist => match from {
            Some(user) if allowlist.iter().any(|entry| matches_user(entry, user)) => Ok(()),
            _ => Err(AccessDenied::NotOnAllowlist),
        },
    }
}

fn matches_user(entry: &str, user: &User) -> bool {
    let entry = entry.trim();
    if entry == user.id.to_string() {
        return true;
    }
    let name = entry.trim_start_matches('@');
    user.username
        .as_deref()
        .is_some_and(|u| u.eq_ignore_ascii_case(name))
}
