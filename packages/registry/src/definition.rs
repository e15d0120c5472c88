//! Preference declarations: keys, value domains, risk levels.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;

/// Risk level of changing a preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RiskLevel {
    /// Cosmetic impact, safe to adapt automatically
    Low,
    /// Behavioral impact, adapt with care
    Medium,
    /// User-visible commitments change, usually needs a human
    High,
}

impl RiskLevel {
    /// Numeric weight used by weighted arbitration scoring.
    pub fn numeric(&self) -> f64 {
        match self {
            Self::Low => 0.0,
            Self::Medium => 0.5,
            Self::High => 1.0,
        }
    }
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
        }
    }
}

/// A `(category, key)` pair naming one preference.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PreferenceKey {
    pub category: String,
    pub key: String,
}

impl PreferenceKey {
    pub fn new(category: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            key: key.into(),
        }
    }

    /// Parse a dotted `"category.key"` form (first dot splits).
    pub fn parse(dotted: &str) -> Option<Self> {
        let (category, key) = dotted.split_once('.')?;
        if category.is_empty() || key.is_empty() {
            return None;
        }
        Some(Self::new(category, key))
    }
}

impl fmt::Display for PreferenceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.category, self.key)
    }
}

/// Allowed values for a preference.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueDomain {
    /// Enumerated set of permitted values
    OneOf(Vec<Value>),
    /// Inclusive numeric range
    Range { min: f64, max: f64 },
}

impl ValueDomain {
    /// Check whether `value` belongs to this domain.
    pub fn contains(&self, value: &Value) -> bool {
        match self {
            Self::OneOf(allowed) => allowed.iter().any(|v| v == value),
            Self::Range { min, max } => value
                .as_f64()
                .map(|n| n >= *min && n <= *max)
                .unwrap_or(false),
        }
    }

    /// Short human description, used in validation errors.
    pub fn describe(&self) -> String {
        match self {
            Self::OneOf(allowed) => {
                let items: Vec<String> = allowed.iter().map(|v| v.to_string()).collect();
                format!("one of [{}]", items.join(", "))
            }
            Self::Range { min, max } => format!("a number in [{min}, {max}]"),
        }
    }
}

/// Declaration of a single preference.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreferenceDefinition {
    /// Preference category (e.g. "communication")
    pub category: String,
    /// Preference key within the category (e.g. "tone")
    pub key: String,
    /// Allowed value domain
    pub domain: ValueDomain,
    /// Default value when nothing has been learned
    pub default: Value,
    /// Risk of changing this preference
    pub risk_level: RiskLevel,
    /// May the adaptation engine change this preference at all?
    #[serde(default = "default_adaptive")]
    pub adaptive: bool,
    /// Minimum confidence a suggestion needs before auto-adaptation
    #[serde(default)]
    pub min_confidence_to_adapt: Option<f64>,
    /// Per-agent default overrides
    #[serde(default)]
    pub agent_defaults: HashMap<String, Value>,
}

fn default_adaptive() -> bool {
    true
}

impl PreferenceDefinition {
    pub fn new(
        category: impl Into<String>,
        key: impl Into<String>,
        domain: ValueDomain,
        default: Value,
        risk_level: RiskLevel,
    ) -> Self {
        Self {
            category: category.into(),
            key: key.into(),
            domain,
            default,
            risk_level,
            adaptive: true,
            min_confidence_to_adapt: None,
            agent_defaults: HashMap::new(),
        }
    }

    pub fn non_adaptive(mut self) -> Self {
        self.adaptive = false;
        self
    }

    pub fn with_min_confidence(mut self, confidence: f64) -> Self {
        self.min_confidence_to_adapt = Some(confidence);
        self
    }

    pub fn with_agent_default(mut self, agent: impl Into<String>, value: Value) -> Self {
        self.agent_defaults.insert(agent.into(), value);
        self
    }

    pub fn preference_key(&self) -> PreferenceKey {
        PreferenceKey::new(self.category.clone(), self.key.clone())
    }
}
