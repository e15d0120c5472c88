//! The catalogue itself: lookups and write-time validation.

use serde_json::{json, Value};
use std::collections::HashMap;
use thiserror::Error;

use crate::definition::{PreferenceDefinition, PreferenceKey, RiskLevel, ValueDomain};

/// Validation failures for preference writes.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RegistryError {
    #[error("unknown preference '{category}.{key}'")]
    UnknownPreference { category: String, key: String },

    #[error("value {value} not allowed for '{category}.{key}': expected {expected}")]
    ValueOutOfDomain {
        category: String,
        key: String,
        value: Value,
        expected: String,
    },
}

/// Immutable catalogue of preference declarations.
pub struct PreferenceRegistry {
    definitions: HashMap<PreferenceKey, PreferenceDefinition>,
}

impl PreferenceRegistry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder {
            definitions: Vec::new(),
        }
    }

    /// The stock catalogue used by the shipped agents and the server binary.
    pub fn standard() -> Self {
        Self::builder()
            .declare(
                PreferenceDefinition::new(
                    "communication",
                    "tone",
                    ValueDomain::OneOf(vec![json!("encouraging"), json!("neutral"), json!("direct")]),
                    json!("encouraging"),
                    RiskLevel::Low,
                )
                .with_min_confidence(0.6),
            )
            .declare(
                PreferenceDefinition::new(
                    "communication",
                    "verbosity",
                    ValueDomain::OneOf(vec![json!("brief"), json!("detailed")]),
                    json!("detailed"),
                    RiskLevel::Low,
                )
                .with_agent_default("Logger", json!("brief")),
            )
            .declare(PreferenceDefinition::new(
                "communication",
                "daily_message_limit",
                ValueDomain::Range { min: 0.0, max: 20.0 },
                json!(5),
                RiskLevel::Medium,
            ))
            .declare(PreferenceDefinition::new(
                "scheduling",
                "reminder_lead_minutes",
                ValueDomain::Range { min: 0.0, max: 240.0 },
                json!(30),
                RiskLevel::Medium,
            ))
            .declare(
                PreferenceDefinition::new(
                    "scheduling",
                    "auto_reschedule",
                    ValueDomain::OneOf(vec![json!(true), json!(false)]),
                    json!(false),
                    RiskLevel::High,
                )
                .with_min_confidence(0.85),
            )
            .declare(PreferenceDefinition::new(
                "logging",
                "detail_level",
                ValueDomain::OneOf(vec![json!("minimal"), json!("standard"), json!("verbose")]),
                json!("standard"),
                RiskLevel::Low,
            ))
            .declare(
                PreferenceDefinition::new(
                    "logging",
                    "retention_days",
                    ValueDomain::Range { min: 7.0, max: 365.0 },
                    json!(90),
                    RiskLevel::High,
                )
                .non_adaptive(),
            )
            .build()
    }

    pub fn get(&self, category: &str, key: &str) -> Option<&PreferenceDefinition> {
        self.definitions
            .get(&PreferenceKey::new(category, key))
    }

    pub fn contains(&self, category: &str, key: &str) -> bool {
        self.get(category, key).is_some()
    }

    /// May the adaptation engine change this preference? Unknown keys are not adaptive.
    pub fn is_adaptive(&self, category: &str, key: &str) -> bool {
        self.get(category, key).map(|d| d.adaptive).unwrap_or(false)
    }

    pub fn default_value(&self, category: &str, key: &str) -> Option<Value> {
        self.get(category, key).map(|d| d.default.clone())
    }

    /// Default for a specific agent, falling back to the general default.
    pub fn default_value_for_agent(&self, agent: &str, category: &str, key: &str) -> Option<Value> {
        self.get(category, key).map(|d| {
            d.agent_defaults
                .get(agent)
                .cloned()
                .unwrap_or_else(|| d.default.clone())
        })
    }

    pub fn risk_level(&self, category: &str, key: &str) -> Option<RiskLevel> {
        self.get(category, key).map(|d| d.risk_level)
    }

    /// Per-key confidence floor for auto-adaptation, if declared.
    pub fn confidence_threshold(&self, category: &str, key: &str) -> Option<f64> {
        self.get(category, key).and_then(|d| d.min_confidence_to_adapt)
    }

    /// Gate for every preference write in the plane.
    pub fn validate(&self, category: &str, key: &str, value: &Value) -> Result<(), RegistryError> {
        let definition = self
            .get(category, key)
            .ok_or_else(|| RegistryError::UnknownPreference {
                category: category.to_string(),
                key: key.to_string(),
            })?;

        if !definition.domain.contains(value) {
            return Err(RegistryError::ValueOutOfDomain {
                category: category.to_string(),
                key: key.to_string(),
                value: value.clone(),
                expected: definition.domain.describe(),
            });
        }

        Ok(())
    }

    pub fn definitions(&self) -> impl Iterator<Item = &PreferenceDefinition> {
        self.definitions.values()
    }

    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

/// Builder collecting declarations before the catalogue freezes.
pub struct RegistryBuilder {
    definitions: Vec<PreferenceDefinition>,
}

impl RegistryBuilder {
    pub fn declare(mut self, definition: PreferenceDefinition) -> Self {
        self.definitions.push(definition);
        self
    }

    pub fn build(self) -> PreferenceRegistry {
        let definitions = self
            .definitions
            .into_iter()
            .map(|d| (d.preference_key(), d))
            .collect();
        PreferenceRegistry { definitions }
    }
}
