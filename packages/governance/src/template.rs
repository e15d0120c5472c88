//! Prompt templates with required-field validation.

use serde_json::{Map, Value};

use crate::error::GovernanceError;

/// A named prompt template. Placeholders are `{field}`; required fields
/// must be present in the render context.
#[derive(Debug, Clone)]
pub struct PromptTemplate {
    pub name: String,
    pub template: String,
    pub required_fields: Vec<String>,
}

impl PromptTemplate {
    pub fn new(
        name: impl Into<String>,
        template: impl Into<String>,
        required_fields: Vec<&str>,
    ) -> Self {
        Self {
            name: name.into(),
            template: template.into(),
            required_fields: required_fields.into_iter().map(String::from).collect(),
        }
    }

    /// Render with `context`, failing when required fields are missing.
    pub fn render(&self, context: &Map<String, Value>) -> Result<String, GovernanceError> {
        let missing: Vec<String> = self
            .required_fields
            .iter()
            .filter(|f| !context.contains_key(*f))
            .cloned()
            .collect();
        if !missing.is_empty() {
            return Err(GovernanceError::TemplateValidation {
                template: self.name.clone(),
                missing,
            });
        }

        let mut rendered = self.template.clone();
        for (field, value) in context {
            let placeholder = format!("{{{field}}}");
            if rendered.contains(&placeholder) {
                let text = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                rendered = rendered.replace(&placeholder, &text);
            }
        }
        Ok(rendered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context_with(fields: &[(&str, Value)]) -> Map<String, Value> {
        fields
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn test_render_substitutes_fields() {
        let template = PromptTemplate::new(
            "coach_nudge",
            "Encourage {user} about {habit}.",
            vec!["user", "habit"],
        );
        let rendered = template
            .render(&context_with(&[
                ("user", json!("sam")),
                ("habit", json!("running")),
            ]))
            .unwrap();
        assert_eq!(rendered, "Encourage sam about running.");
    }

    #[test]
    fn test_missing_required_field_fails() {
        let template = PromptTemplate::new("coach_nudge", "Hi {user}", vec!["user", "habit"]);
        let err = template
            .render(&context_with(&[("user", json!("sam"))]))
            .unwrap_err();
        match err {
            GovernanceError::TemplateValidation { missing, .. } => {
                assert_eq!(missing, vec!["habit".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_non_string_values_render_as_json() {
        let template = PromptTemplate::new("t", "count={count}", vec!["count"]);
        let rendered = template
            .render(&context_with(&[("count", json!(3))]))
            .unwrap();
        assert_eq!(rendered, "count=3");
    }
}
