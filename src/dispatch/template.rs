//! `{{variable}}` substitution for email templates.
//!
//! Rendering does not sanitize. Values are expected to have passed through
//! [`crate::ingest::sanitize()`] already; escaping them again here would
//! double-encode. Sanitize first, render second.

use regex::{Captures, Regex};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::LazyLock;

use super::error::TemplateError;
use crate::models::EmailTemplate;

/// `{{name}}`, case-sensitive, no nesting and no escape syntax.
static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{([^{}]+)\}\}").expect("placeholder pattern is a valid regex")
});

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    pub subject: String,
    pub body: String,
}

/// Render a template for one recipient.
///
/// Fails with every declared variable the recipient lacks, in the order the
/// template declares them. Placeholders the template does not declare are
/// still filled when a value is supplied and left as-is otherwise.
/// Substitution is single-pass, so a value containing `{{...}}` is never
/// expanded again.
pub fn render(
    template: &EmailTemplate,
    variables: &HashMap<String, String>,
) -> Result<RenderedEmail, TemplateError> {
    let missing: Vec<String> = template
        .variables
        .iter()
        .filter(|name| !variables.contains_key(name.as_str()))
        .cloned()
        .collect();

    if !missing.is_empty() {
        return Err(TemplateError::MissingVariables(missing));
    }

    Ok(RenderedEmail {
        subject: substitute(&template.subject, variables),
        body: substitute(&template.body, variables),
    })
}

fn substitute(text: &str, variables: &HashMap<String, String>) -> String {
    PLACEHOLDER
        .replace_all(text, |caps: &Captures<'_>| match variables.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Placeholder names in `text`, first occurrence first, without duplicates.
pub fn placeholders(text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    PLACEHOLDER
        .captures_iter(text)
        .map(|caps| caps[1].to_string())
        .filter(|name| seen.insert(name.clone()))
        .collect()
}

impl EmailTemplate {
    /// Build a template whose required variables are every placeholder in the
    /// subject followed by any new ones in the body.
    pub fn from_parts(id: impl Into<String>, subject: impl Into<String>, body: impl Into<String>) -> Self {
        let subject = subject.into();
        let body = body.into();
        let variables = placeholders(&format!("{}\n{}", subject, body));

        Self {
            id: id.into(),
            subject,
            body,
            variables,
        }
    }
}

/// Templates addressable by id.
#[derive(Debug, Clone, Default)]
pub struct TemplateStore {
    templates: HashMap<String, EmailTemplate>,
}

impl TemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a template.
    pub fn insert(&mut self, template: EmailTemplate) -> Option<EmailTemplate> {
        self.templates.insert(template.id.clone(), template)
    }

    pub fn get(&self, id: &str) -> Option<&EmailTemplate> {
        self.templates.get(id)
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Parse a JSON array of templates.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let templates: Vec<EmailTemplate> = serde_json::from_str(json)?;
        Ok(templates.into_iter().collect())
    }

    pub fn load(path: &Path) -> std::io::Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let store = Self::from_json(&json)?;
        log::info!("loaded {} templates from {}", store.len(), path.display());
        Ok(store)
    }
}

impl FromIterator<EmailTemplate> for TemplateStore {
    fn from_iter<I: IntoIterator<Item = EmailTemplate>>(iter: I) -> Self {
        let mut store = Self::new();
        for template in iter {
            store.insert(template);
        }
        store
    }
}
