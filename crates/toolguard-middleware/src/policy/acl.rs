//! Access control list.
//!
//! `authorize` is a pure function of (caller, operation, compiled policy).
//! Lookup order: exact caller entry, then the `*` entry, then the global
//! default. Within an entry the deny list beats the allow list.

use std::collections::HashMap;

use toolguard_core::error::Result;

use super::allowlist::{compile_rules, is_listed, OpRule, PatternMap};
use crate::config::schema::{AccessLevel, AccessSection, DefaultPolicy};

const WILDCARD_CALLER: &str = "*";

/// Why a request was denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenyReason {
    /// Operation appears in the entry's deny list.
    Listed,
    /// Granted level is below the operation's required level.
    Level {
        required: AccessLevel,
        granted: AccessLevel,
    },
    /// Nothing matched; entry or global default is deny.
    Default,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessDecision {
    Allow,
    Deny(DenyReason),
}

impl AccessDecision {
    pub fn is_allow(self) -> bool {
        matches!(self, AccessDecision::Allow)
    }
}

#[derive(Debug, Clone)]
struct CompiledEntry {
    allow: Vec<OpRule>,
    deny: Vec<OpRule>,
    default: Option<DefaultPolicy>,
    level: Option<AccessLevel>,
}

/// Compiled, immutable access policy. Construct once at startup, then share via Arc.
#[derive(Debug, Clone)]
pub struct AccessPolicy {
    default: DefaultPolicy,
    default_level: Option<AccessLevel>,
    levels: PatternMap<AccessLevel>,
    callers: HashMap<String, CompiledEntry>,
    wildcard: Option<CompiledEntry>,
}

impl AccessPolicy {
    pub fn new(section: &AccessSection) -> Result<Self> {
        section.validate()?;

        let mut callers = HashMap::with_capacity(section.callers.len());
        let mut wildcard = None;
        for c in &section.callers {
            let entry = CompiledEntry {
                allow: compile_rules(&c.allow)?,
                deny: compile_rules(&c.deny)?,
                default: c.default,
                level: c.level,
            };
            if c.id == WILDCARD_CALLER {
                wildcard = Some(entry);
            } else {
                callers.insert(c.id.clone(), entry);
            }
        }

        Ok(Self {
            default: section.default,
            default_level: section.default_level,
            levels: PatternMap::compile(&section.levels)?,
            callers,
            wildcard,
        })
    }

    /// Policy with no entries and the given global default.
    pub fn with_default(default: DefaultPolicy) -> Self {
        Self {
            default,
            default_level: None,
            levels: PatternMap::default(),
            callers: HashMap::new(),
            wildcard: None,
        }
    }

    pub fn authorize(&self, caller_id: &str, operation: &str) -> AccessDecision {
        let entry = self.callers.get(caller_id).or(self.wildcard.as_ref());

        if let Some(e) = entry {
            if is_listed(&e.deny, operation) {
                return AccessDecision::Deny(DenyReason::Listed);
            }
            if is_listed(&e.allow, operation) {
                return AccessDecision::Allow;
            }
        }

        if let Some(&required) = self.levels.lookup(operation) {
            let granted = entry.and_then(|e| e.level).or(self.default_level);
            if let Some(granted) = granted {
                return if granted >= required {
                    AccessDecision::Allow
                } else {
                    AccessDecision::Deny(DenyReason::Level { required, granted })
                };
            }
        }

        let fallback = entry.and_then(|e| e.default).unwrap_or(self.default);
        match fallback {
            DefaultPolicy::Allow => AccessDecision::Allow,
            DefaultPolicy::Deny => AccessDecision::Deny(DenyReason::Default),
        }
    }

    /// Every operation pattern the policy names (for startup sanity checks).
    pub fn referenced_rules(&self) -> Vec<&OpRule> {
        self.callers
            .values()
            .chain(self.wildcard.iter())
            .flat_map(|e| e.allow.iter().chain(e.deny.iter()))
            .chain(self.levels.rules())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::schema::CallerEntry;

    fn entry(id: &str, allow: &[&str], deny: &[&str]) -> CallerEntry {
        CallerEntry {
            id: id.into(),
            allow: allow.iter().map(|s| s.to_string()).collect(),
            deny: deny.iter().map(|s| s.to_string()).collect(),
            default: None,
            level: None,
        }
    }

    fn policy(default: DefaultPolicy, callers: Vec<CallerEntry>) -> AccessPolicy {
        AccessPolicy::new(&AccessSection {
            default,
            default_level: None,
            levels: Default::default(),
            callers,
        })
        .unwrap()
    }

    #[test]
    fn deny_overrides_allow() {
        let p = policy(DefaultPolicy::Allow, vec![entry("alice", &["x"], &["x"])]);
        assert_eq!(p.authorize("alice", "x"), AccessDecision::Deny(DenyReason::Listed));
    }

    #[test]
    fn deny_star_pattern_beats_exact_allow() {
        let p = policy(DefaultPolicy::Allow, vec![entry("alice", &["delete"], &["*"])]);
        assert!(!p.authorize("alice", "delete").is_allow());
    }

    #[test]
    fn lookup_falls_back_to_wildcard_then_global() {
        let p = policy(
            DefaultPolicy::Deny,
            vec![entry("alice", &["read"], &[]), entry("*", &["status"], &[])],
        );
        assert!(p.authorize("alice", "read").is_allow());
        // alice has an exact entry, so the wildcard entry does not apply
        assert!(!p.authorize("alice", "status").is_allow());
        assert!(p.authorize("bob", "status").is_allow());
        assert_eq!(p.authorize("bob", "read"), AccessDecision::Deny(DenyReason::Default));
    }

    #[test]
    fn entry_default_precedes_global_default() {
        let mut e = entry("ops", &[], &["delete"]);
        e.default = Some(DefaultPolicy::Allow);
        let p = policy(DefaultPolicy::Deny, vec![e]);
        assert!(p.authorize("ops", "anything").is_allow());
        assert!(!p.authorize("ops", "delete").is_allow());
        assert!(!p.authorize("other", "anything").is_allow());
    }

    #[test]
    fn levels_gate_unlisted_operations() {
        let mut reader = entry("reader", &[], &[]);
        reader.level = Some(AccessLevel::Read);
        let mut section = AccessSection {
            default: DefaultPolicy::Deny,
            default_level: Some(AccessLevel::Write),
            levels: Default::default(),
            callers: vec![reader, entry("alice", &[], &[])],
        };
        section.levels.insert("delete_*".into(), AccessLevel::Admin);
        section.levels.insert("update_*".into(), AccessLevel::Write);
        let p = AccessPolicy::new(&section).unwrap();

        assert!(!p.authorize("reader", "update_task").is_allow());
        // alice inherits default_level = write
        assert!(p.authorize("alice", "update_task").is_allow());
        assert_eq!(
            p.authorize("alice", "delete_task"),
            AccessDecision::Deny(DenyReason::Level {
                required: AccessLevel::Admin,
                granted: AccessLevel::Write,
            })
        );
        // no level declared for the op: global default applies
        assert!(!p.authorize("alice", "read").is_allow());
    }

    #[test]
    fn authorize_is_deterministic() {
        let p = policy(DefaultPolicy::Deny, vec![entry("alice", &["read"], &[])]);
        let first = p.authorize("alice", "read");
        for _ in 0..10 {
            assert_eq!(p.authorize("alice", "read"), first);
        }
    }
}
