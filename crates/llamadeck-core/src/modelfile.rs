use crate::{LlamaDeckError, Result};

/// A derived model: a base model plus a system directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelDefinition {
    pub base_model: String,
    pub system: String,
}

impl ModelDefinition {
    pub fn new(base_model: impl Into<String>, system: impl Into<String>) -> Self {
        Self {
            base_model: base_model.into(),
            system: system.into(),
        }
    }

    /// Two-directive Modelfile text. The directive is written literally; embedded
    /// newlines are not escaped.
    pub fn render(&self) -> String {
        format!("FROM {}\nSYSTEM {}", self.base_model, self.system)
    }
}

/// Custom model names are restricted to ASCII letters and digits.
pub fn validate_model_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(LlamaDeckError::InvalidModelName("name cannot be empty".to_string()));
    }

    if let Some(c) = name.chars().find(|c| !c.is_ascii_alphanumeric()) {
        return Err(LlamaDeckError::InvalidModelName(format!(
            "'{}' contains '{}'; use only letters and numbers",
            name, c
        )));
    }

    Ok(())
}
