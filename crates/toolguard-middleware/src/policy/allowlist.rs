//! Operation pattern compilation and matching utilities.
//!
//! Supports exact names (`read`), trailing-wildcard prefixes (`task_*`) and
//! the bare wildcard (`*`).

use toolguard_core::error::{Result, ToolGuardError};

/// Compiled operation pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpRule {
    Exact(String),
    Prefix(String),
    Any,
}

impl OpRule {
    pub fn matches(&self, operation: &str) -> bool {
        match self {
            OpRule::Exact(name) => name == operation,
            OpRule::Prefix(prefix) => operation.starts_with(prefix.as_str()),
            OpRule::Any => true,
        }
    }

    /// Higher is more specific. Used to pick between overlapping patterns.
    fn specificity(&self) -> (u8, usize) {
        match self {
            OpRule::Exact(name) => (2, name.len()),
            OpRule::Prefix(prefix) => (1, prefix.len()),
            OpRule::Any => (0, 0),
        }
    }
}

pub fn validate_pattern(raw: &str) -> Result<()> {
    compile_rule(raw).map(|_| ())
}

pub fn compile_rule(raw: &str) -> Result<OpRule> {
    if raw.is_empty() {
        return Err(ToolGuardError::Config("empty operation pattern".into()));
    }
    if raw == "*" {
        return Ok(OpRule::Any);
    }
    match raw.find('*') {
        None => Ok(OpRule::Exact(raw.to_string())),
        Some(i) if i == raw.len() - 1 => Ok(OpRule::Prefix(raw[..i].to_string())),
        Some(_) => Err(ToolGuardError::Config(format!(
            "invalid operation pattern: {raw} (only a trailing '*' is supported)"
        ))),
    }
}

pub fn compile_rules(raw: &[String]) -> Result<Vec<OpRule>> {
    raw.iter().map(|s| compile_rule(s)).collect()
}

pub fn is_listed(rules: &[OpRule], operation: &str) -> bool {
    rules.iter().any(|r| r.matches(operation))
}

/// Pattern-keyed lookup table. The most specific matching pattern wins:
/// exact name, then longest prefix, then `*`.
#[derive(Debug, Clone)]
pub struct PatternMap<T> {
    entries: Vec<(OpRule, T)>,
}

impl<T> Default for PatternMap<T> {
    fn default() -> Self {
        Self { entries: Vec::new() }
    }
}

impl<T: Clone> PatternMap<T> {
    pub fn compile<'a, I>(raw: I) -> Result<Self>
    where
        I: IntoIterator<Item = (&'a String, &'a T)>,
        T: 'a,
    {
        let mut entries = Vec::new();
        for (pattern, value) in raw {
            entries.push((compile_rule(pattern)?, value.clone()));
        }
        entries.sort_by(|a, b| b.0.specificity().cmp(&a.0.specificity()));
        Ok(Self { entries })
    }
}

impl<T> PatternMap<T> {
    pub fn lookup(&self, operation: &str) -> Option<&T> {
        self.entries
            .iter()
            .find(|(rule, _)| rule.matches(operation))
            .map(|(_, v)| v)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn rules(&self) -> impl Iterator<Item = &OpRule> {
        self.entries.iter().map(|(r, _)| r)
    }
}
