//! Template rendering: `{{name}}` substitution plus non-nested
//! `{{#flag}}...{{/flag}}` conditional blocks. Rendering is total and never
//! fails, whatever the input; authoring-time validation rejects the shapes
//! rendering would only be able to guess at (nested blocks).

use std::collections::BTreeMap;

use crate::error::{Error, Result};
use crate::models::broadcast::{ChannelKind, ChannelPlan};

const SMS_MAX_LEN: usize = 160;
const EMAIL_MIN_LEN: usize = 10;

#[derive(Debug, Clone, PartialEq)]
pub enum VarValue {
    Text(String),
    Flag(bool),
}

/// Variable map handed to `render`. Flags drive conditional blocks; text
/// values substitute into `{{name}}` tokens.
#[derive(Debug, Clone, Default)]
pub struct TemplateVars {
    values: BTreeMap<String, VarValue>,
}

impl TemplateVars {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, key: &str, value: impl Into<String>) -> Self {
        self.values
            .insert(key.to_string(), VarValue::Text(value.into()));
        self
    }

    pub fn with_flag(mut self, key: &str, value: bool) -> Self {
        self.values.insert(key.to_string(), VarValue::Flag(value));
        self
    }

    pub fn insert(&mut self, key: &str, value: impl Into<String>) {
        self.values
            .insert(key.to_string(), VarValue::Text(value.into()));
    }

    /// Overlays another map; entries in `other` win on key collisions.
    pub fn merge(&mut self, other: TemplateVars) {
        self.values.extend(other.values);
    }

    fn substitution(&self, key: &str) -> Option<String> {
        self.values.get(key).map(|v| match v {
            VarValue::Text(s) => s.clone(),
            VarValue::Flag(true) => "true".to_string(),
            VarValue::Flag(false) => String::new(),
        })
    }

    pub fn truthy(&self, key: &str) -> bool {
        match self.values.get(key) {
            Some(VarValue::Flag(b)) => *b,
            Some(VarValue::Text(s)) => !s.is_empty(),
            None => false,
        }
    }

    fn keys(&self) -> impl Iterator<Item = &String> {
        self.values.keys()
    }
}

/// Renders a template against a variable map. Absent variables substitute to
/// the empty string; conditional blocks survive only when their flag is
/// truthy; runs of three or more newlines collapse to a paragraph break.
pub fn render(template: &str, vars: &TemplateVars) -> String {
    let mut rendered = template.to_string();
    for key in vars.keys() {
        if let Some(value) = vars.substitution(key) {
            rendered = rendered.replace(&format!("{{{{{}}}}}", key), &value);
        }
    }
    let rendered = resolve_conditionals(&rendered, vars);
    let rendered = drop_unknown_tokens(&rendered);
    collapse_blank_runs(&rendered).trim().to_string()
}

fn resolve_conditionals(input: &str, vars: &TemplateVars) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("{{#") {
        out.push_str(&rest[..start]);
        let after_marker = &rest[start + 3..];
        let Some(name_end) = after_marker.find("}}") else {
            // Unterminated opener; emit verbatim.
            out.push_str(&rest[start..]);
            return out;
        };
        let name = &after_marker[..name_end];
        let inner_start = start + 3 + name_end + 2;
        let closer = format!("{{{{/{}}}}}", name);
        match rest[inner_start..].find(&closer) {
            Some(close_at) => {
                if vars.truthy(name) {
                    out.push_str(&rest[inner_start..inner_start + close_at]);
                }
                rest = &rest[inner_start + close_at + closer.len()..];
            }
            None => {
                // Opener without a closer; emit the marker and move on.
                out.push_str(&rest[start..inner_start]);
                rest = &rest[inner_start..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// Removes leftover `{{name}}` tokens for variables nobody supplied.
fn drop_unknown_tokens(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let token = &after[..end];
                let is_marker = token.starts_with('#') || token.starts_with('/');
                if is_marker {
                    out.push_str(&rest[start..start + 2 + end + 2]);
                }
                rest = &rest[start + 2 + end + 2..];
            }
            None => {
                out.push_str(&rest[start..]);
                return out;
            }
        }
    }
    out.push_str(rest);
    out
}

fn collapse_blank_runs(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut newlines = 0;
    for ch in input.chars() {
        if ch == '\n' {
            newlines += 1;
            if newlines <= 2 {
                out.push(ch);
            }
        } else {
            newlines = 0;
            out.push(ch);
        }
    }
    out
}

/// Lists the substitution variables a template body references, in order of
/// first appearance. Conditional markers are grammar, not variables.
pub fn extract_variables(body: &str) -> Vec<String> {
    let mut found = Vec::new();
    let mut rest = body;
    while let Some(start) = rest.find("{{") {
        let after = &rest[start + 2..];
        let Some(end) = after.find("}}") else { break };
        let token = &after[..end];
        if !token.starts_with('#') && !token.starts_with('/') {
            let name = token.to_string();
            if !found.contains(&name) {
                found.push(name);
            }
        }
        rest = &after[end + 2..];
    }
    found
}

/// Authoring-time structural validation. Nested conditional blocks have no
/// defined meaning, so they are rejected here instead of rendered by guess;
/// an opener without its closer is rejected the same way.
pub fn validate_structure(body: &str) -> Result<()> {
    let mut rest = body;
    while let Some(start) = rest.find("{{#") {
        let after_marker = &rest[start + 3..];
        let Some(name_end) = after_marker.find("}}") else {
            return Err(Error::Template(
                "unterminated conditional marker".to_string(),
            ));
        };
        let name = &after_marker[..name_end];
        let inner_start = start + 3 + name_end + 2;
        let closer = format!("{{{{/{}}}}}", name);
        let Some(close_at) = rest[inner_start..].find(&closer) else {
            return Err(Error::Template(format!(
                "conditional block {{{{#{}}}}} is never closed",
                name
            )));
        };
        let inner = &rest[inner_start..inner_start + close_at];
        if inner.contains("{{#") {
            return Err(Error::Template(format!(
                "nested conditional block inside {{{{#{}}}}}",
                name
            )));
        }
        rest = &rest[inner_start + close_at + closer.len()..];
    }
    Ok(())
}

/// Per-channel content rules applied when a broadcast is authored.
pub fn validate_plan(plan: &ChannelPlan) -> Result<()> {
    let body = plan.body();
    if body.trim().is_empty() {
        return Err(Error::Template(format!(
            "{} content cannot be empty",
            plan.kind()
        )));
    }
    validate_structure(body)?;
    match plan.kind() {
        ChannelKind::Sms => {
            if body.chars().count() > SMS_MAX_LEN {
                return Err(Error::Template(format!(
                    "SMS content cannot exceed {} characters",
                    SMS_MAX_LEN
                )));
            }
        }
        ChannelKind::Email => {
            if body.chars().count() < EMAIL_MIN_LEN {
                return Err(Error::Template(format!(
                    "Email content must be at least {} characters",
                    EMAIL_MIN_LEN
                )));
            }
            if plan.subject().map_or(true, |s| s.trim().is_empty()) {
                return Err(Error::Template("Email subject is required".to_string()));
            }
        }
        _ => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_and_keeps_active_modality_block() {
        let template = "Bonjour {{prenom}}, {{#if_visio}}lien: {{lien}}{{/if_visio}}{{#if_presentiel}}lieu: {{lieu}}{{/if_presentiel}}";
        let vars = TemplateVars::new()
            .with("prenom", "Aminata")
            .with_flag("if_visio", true)
            .with("lien", "http://x");
        assert_eq!(render(template, &vars), "Bonjour Aminata, lien: http://x");
    }

    #[test]
    fn empty_vars_strip_every_conditional_block() {
        let template = "A{{#if_notes}}notes: {{notes}}{{/if_notes}}B{{#if_visio}}v{{/if_visio}}";
        assert_eq!(render(template, &TemplateVars::new()), "AB");
    }

    #[test]
    fn absent_variables_substitute_to_empty() {
        assert_eq!(render("x {{missing}} y", &TemplateVars::new()), "x  y");
    }

    #[test]
    fn false_flag_strips_block_even_when_substituted() {
        let vars = TemplateVars::new().with_flag("if_visio", false);
        assert_eq!(render("a{{#if_visio}}b{{/if_visio}}c", &vars), "ac");
    }

    #[test]
    fn collapses_three_or_more_newlines_and_trims() {
        let vars = TemplateVars::new().with("nom", "Diallo");
        assert_eq!(
            render("\n\nBonjour\n\n\n\n{{nom}}\n", &vars),
            "Bonjour\n\nDiallo"
        );
    }

    #[test]
    fn nonempty_text_value_is_truthy_for_blocks() {
        let vars = TemplateVars::new().with("notes", "apportez un CV");
        assert_eq!(
            render("{{#notes}}Note: {{notes}}{{/notes}}", &vars),
            "Note: apportez un CV"
        );
    }

    #[test]
    fn extracts_variables_in_order_without_markers() {
        let body = "Bonjour {{prenom}} {{nom}}, {{#if_visio}}{{lien}}{{/if_visio}} {{prenom}}";
        assert_eq!(extract_variables(body), vec!["prenom", "nom", "lien"]);
    }

    #[test]
    fn rejects_nested_conditional_blocks() {
        let body = "{{#if_a}}x{{#if_b}}y{{/if_b}}z{{/if_a}}";
        assert!(validate_structure(body).is_err());
    }

    #[test]
    fn rejects_unclosed_conditional_block() {
        assert!(validate_structure("{{#if_a}}x").is_err());
    }

    #[test]
    fn validates_sms_length_and_email_subject() {
        let long_sms = ChannelPlan::Sms {
            body: "x".repeat(SMS_MAX_LEN + 1),
            template_id: None,
        };
        assert!(validate_plan(&long_sms).is_err());

        let no_subject = ChannelPlan::Email {
            subject: "  ".to_string(),
            body: "Bonjour tout le monde".to_string(),
            template_id: None,
        };
        assert!(validate_plan(&no_subject).is_err());

        let ok = ChannelPlan::Email {
            subject: "Info".to_string(),
            body: "Bonjour tout le monde".to_string(),
            template_id: None,
        };
        assert!(validate_plan(&ok).is_ok());
    }
}
