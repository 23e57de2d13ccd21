//! Mapping rules.
//!
//! A [`RuleSet`] is the compiled form of a [`MappingConfig`]'s `mappings`
//! block: targets canonicalized to import columns, literals stringified,
//! rules ordered by category.

use serde_json::Value;
use std::fmt;

use crate::config::MappingConfig;
use crate::models::{columns, RuleKind};

/// Comparison operator of a conditional rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Operator {
    Gt,
    Lt,
    Ge,
    Le,
    Eq,
    Ne,
    Contains,
    Empty,
    /// Kept so the row can be rejected with the offending name.
    Unknown(String),
}

impl Operator {
    pub fn parse(raw: &str) -> Self {
        match raw.trim().to_lowercase().as_str() {
            ">" => Operator::Gt,
            "<" => Operator::Lt,
            ">=" => Operator::Ge,
            "<=" => Operator::Le,
            "==" => Operator::Eq,
            "!=" => Operator::Ne,
            "contains" => Operator::Contains,
            "empty" => Operator::Empty,
            _ => Operator::Unknown(raw.to_string()),
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Operator::Gt | Operator::Lt | Operator::Ge | Operator::Le)
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let symbol = match self {
            Operator::Gt => ">",
            Operator::Lt => "<",
            Operator::Ge => ">=",
            Operator::Le => "<=",
            Operator::Eq => "==",
            Operator::Ne => "!=",
            Operator::Contains => "contains",
            Operator::Empty => "empty",
            Operator::Unknown(raw) => raw.as_str(),
        };
        f.write_str(symbol)
    }
}

/// One mapping rule.
#[derive(Debug, Clone, PartialEq)]
pub enum MappingRule {
    Direct {
        source: String,
        target: &'static str,
    },
    /// Blank sources are skipped; all-blank leaves the target unset.
    Concatenate {
        target: &'static str,
        sources: Vec<String>,
        separator: String,
    },
    /// `None` branches leave the target unset.
    Conditional {
        target: &'static str,
        source: String,
        operator: Operator,
        value: String,
        then_value: Option<String>,
        else_value: Option<String>,
    },
    /// Applies only when no earlier rule set the target.
    Default {
        target: &'static str,
        value: String,
    },
}

impl MappingRule {
    pub fn kind(&self) -> RuleKind {
        match self {
            MappingRule::Direct { .. } => RuleKind::Direct,
            MappingRule::Concatenate { .. } => RuleKind::Concatenate,
            MappingRule::Conditional { .. } => RuleKind::Conditional,
            MappingRule::Default { .. } => RuleKind::Default,
        }
    }

    pub fn target(&self) -> &'static str {
        match self {
            MappingRule::Direct { target, .. }
            | MappingRule::Concatenate { target, .. }
            | MappingRule::Conditional { target, .. }
            | MappingRule::Default { target, .. } => target,
        }
    }

    /// Category position in the fixed application order.
    fn rank(&self) -> u8 {
        match self {
            MappingRule::Direct { .. } => 0,
            MappingRule::Concatenate { .. } => 1,
            MappingRule::Conditional { .. } => 2,
            MappingRule::Default { .. } => 3,
        }
    }
}

/// JSON literal as a cell value. `null` means "no value".
fn literal(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(if *b { "TRUE" } else { "FALSE" }.to_string()),
        other => Some(other.to_string()),
    }
}

/// Ordered rules: direct, concatenate, conditional, default.
#[derive(Debug, Clone, Default)]
pub struct RuleSet {
    rules: Vec<MappingRule>,
    /// Configured targets outside the import schema; their rules are dropped.
    pub unknown_targets: Vec<String>,
}

impl RuleSet {
    pub fn new(mut rules: Vec<MappingRule>) -> Self {
        rules.sort_by_key(MappingRule::rank);
        Self {
            rules,
            unknown_targets: Vec::new(),
        }
    }

    pub fn from_config(config: &MappingConfig) -> Self {
        let m = &config.mappings;
        let mut rules = Vec::new();
        let mut unknown: Vec<String> = Vec::new();
        let mut resolve = |name: &str| -> Option<&'static str> {
            let column = columns::canonical(name);
            if column.is_none() && !unknown.iter().any(|u| u == name) {
                unknown.push(name.to_string());
            }
            column
        };

        for (source, target) in &m.direct.fields {
            if let Some(target) = resolve(target) {
                rules.push(MappingRule::Direct {
                    source: source.clone(),
                    target,
                });
            }
        }
        for (_, spec) in &m.concatenate.fields {
            if let Some(target) = resolve(&spec.target) {
                rules.push(MappingRule::Concatenate {
                    target,
                    sources: spec.fields.clone(),
                    separator: spec.separator.clone(),
                });
            }
        }
        for (_, spec) in &m.conditional.fields {
            if let Some(target) = resolve(&spec.target) {
                let cond = &spec.condition;
                rules.push(MappingRule::Conditional {
                    target,
                    source: cond.field.clone(),
                    operator: Operator::parse(&cond.operator),
                    value: literal(&cond.value).unwrap_or_default(),
                    then_value: literal(&cond.then_value),
                    else_value: literal(&cond.else_value),
                });
            }
        }
        for (target, value) in &m.default.fields {
            if let Some(target) = resolve(target) {
                if let Some(value) = literal(value) {
                    rules.push(MappingRule::Default { target, value });
                }
            }
        }

        let mut set = Self::new(rules);
        set.unknown_targets = unknown;
        set
    }

    pub fn rules(&self) -> &[MappingRule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    /// Targets populated from `source` by a direct, concatenate or conditional rule.
    pub fn targets_of_source(&self, source: &str) -> Vec<&'static str> {
        self.rules
            .iter()
            .filter(|rule| match rule {
                MappingRule::Direct { source: s, .. } => s == source,
                MappingRule::Concatenate { sources, .. } => sources.iter().any(|s| s == source),
                MappingRule::Conditional { source: s, .. } => s == source,
                MappingRule::Default { .. } => false,
            })
            .map(MappingRule::target)
            .collect()
    }

    pub fn has_default_for(&self, target: &str) -> bool {
        self.rules
            .iter()
            .any(|rule| matches!(rule, MappingRule::Default { target: t, .. } if *t == target))
    }

    /// Whether a blank `source` would still be covered by a default rule.
    pub fn source_has_default(&self, source: &str) -> bool {
        self.targets_of_source(source)
            .into_iter()
            .any(|target| self.has_default_for(target))
    }

    /// Conditional rules whose operator is not recognized.
    pub fn unknown_operators(&self) -> Vec<(&'static str, &str)> {
        self.rules
            .iter()
            .filter_map(|rule| match rule {
                MappingRule::Conditional {
                    target,
                    operator: Operator::Unknown(raw),
                    ..
                } => Some((*target, raw.as_str())),
                _ => None,
            })
            .collect()
    }
}
