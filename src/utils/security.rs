//! Access control for the bot
//!
//! Only Telegram users on the allow-list may talk to the model.

use std::collections::HashSet;

/// Special value that represents "allow all users" wildcard
const ALLOW_ALL_WILDCARD: i64 = -1;

/// Whitelist checker for Telegram user IDs.
///
/// Implements secure-by-default behavior: empty whitelist = no one allowed
#[derive(Debug, Clone)]
pub struct WhitelistChecker {
    allowed_users: HashSet<i64>,
}

impl WhitelistChecker {
    /// Create a new WhitelistChecker with the given allowed user IDs.
    pub fn new(allowed_users: Vec<i64>) -> Self {
        let has_wildcard = allowed_users.contains(&ALLOW_ALL_WILDCARD);

        if has_wildcard {
            tracing::warn!("Allow-all mode enabled - all users allowed!");
        } else if allowed_users.is_empty() {
            tracing::warn!("Whitelist empty, no users allowed (secure by default)");
        } else {
            tracing::info!(
                "Whitelist initialized with {} allowed user(s)",
                allowed_users.len()
            );
        }

        Self {
            allowed_users: allowed_users.into_iter().collect(),
        }
    }

    /// Parses a comma-separated allow-list such as `"123, 456"`.
    ///
    /// `*` is accepted as the allow-all wildcard. Returns the offending entry
    /// when one is not an integer.
    pub fn parse_list(raw: &str) -> Result<Vec<i64>, String> {
        raw.split(',')
            .map(str::trim)
            .filter(|entry| !entry.is_empty())
            .map(|entry| {
                if entry == "*" {
                    Ok(ALLOW_ALL_WILDCARD)
                } else {
                    entry
                        .parse::<i64>()
                        .map_err(|_| format!("invalid user id '{}'", entry))
                }
            })
            .collect()
    }

    /// Check if a user ID is allowed.
    pub fn is_allowed(&self, user_id: i64) -> bool {
        if self.allowed_users.contains(&ALLOW_ALL_WILDCARD) {
            return true;
        }

        if self.allowed_users.is_empty() {
            return false;
        }

        self.allowed_users.contains(&user_id)
    }

    /// Get the number of whitelisted users.
    pub fn len(&self) -> usize {
        self.allowed_users.len()
    }

    /// Check if whitelist is empty.
    pub fn is_empty(&self) -> bool {
        self.allowed_users.is_empty()
    }
}
