//! Template error types

use std::fmt;

/// Errors that can occur while rendering the managed Deployment
#[derive(Debug)]
pub enum TemplateError {
    /// Template rendering failed (substitution or undefined parameter)
    Render(minijinja::Error),
    /// Template syntax is invalid
    Syntax(String),
    /// No embedded manifest with the given name
    MissingAsset(String),
    /// Rendered output is not a valid Deployment
    Decode(serde_yaml::Error),
}

impl fmt::Display for TemplateError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Render(e) => write!(f, "template render error: {}", e),
            Self::Syntax(msg) => write!(f, "template syntax error: {}", msg),
            Self::MissingAsset(name) => write!(f, "embedded manifest not found: {}", name),
            Self::Decode(e) => write!(f, "rendered manifest is not a Deployment: {}", e),
        }
    }
}

impl std::error::Error for TemplateError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Render(e) => Some(e),
            Self::Decode(e) => Some(e),
            _ => None,
        }
    }
}

impl From<minijinja::Error> for TemplateError {
    fn from(err: minijinja::Error) -> Self {
        Self::Render(err)
    }
}

impl From<serde_yaml::Error> for TemplateError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Decode(err)
    }
}
