//! Rendering of templated construct parameters

use std::collections::BTreeMap;
use std::sync::LazyLock;

use minijinja::{Environment, UndefinedBehavior};
use regex::Regex;

/// Variables visible to a template
pub type TemplateVars = BTreeMap<String, String>;

/// A template could not be rendered
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("Failed to render '{template}': {message}")]
pub struct TemplateError {
    pub template: String,
    pub message: String,
}

/// Renders parameter strings against host attributes
///
/// Implementations must not mutate `vars`, and an unresolved variable must
/// be an error rather than an empty substitution.
pub trait TemplateRenderer {
    fn render(&self, template: &str, vars: &TemplateVars) -> Result<String, TemplateError>;
}

/// Jinja renderer with strict undefined handling
#[derive(Debug)]
pub struct JinjaRenderer {
    env: Environment<'static>,
}

impl JinjaRenderer {
    pub fn new() -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Strict);
        Self { env }
    }
}

impl Default for JinjaRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl TemplateRenderer for JinjaRenderer {
    fn render(&self, template: &str, vars: &TemplateVars) -> Result<String, TemplateError> {
        if !template.contains("{{") && !template.contains("{%") {
            return Ok(template.to_string());
        }
        self.env
            .render_str(template, vars)
            .map_err(|e| TemplateError {
                template: template.to_string(),
                message: e.to_string(),
            })
    }
}

static UNSAFE_IDENTIFIER_CHARS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^A-Za-z0-9_-]").expect("Invalid identifier regex"));

/// Replace every character outside `[A-Za-z0-9_-]` with `_`
pub fn sanitize_identifier(raw: &str) -> String {
    UNSAFE_IDENTIFIER_CHARS
        .replace_all(raw.trim(), "_")
        .into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn vars(pairs: &[(&str, &str)]) -> TemplateVars {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_render_substitutes() {
        let renderer = JinjaRenderer::new();
        let out = renderer
            .render("{{ HOSTNAME }}-{{ os }}", &vars(&[("HOSTNAME", "web1"), ("os", "linux")]))
            .unwrap();
        assert_eq!(out, "web1-linux");
    }

    #[test]
    fn test_plain_string_passes_through() {
        let renderer = JinjaRenderer::new();
        assert_eq!(renderer.render("static", &TemplateVars::new()).unwrap(), "static");
    }

    #[test]
    fn test_unresolved_variable_is_an_error() {
        let renderer = JinjaRenderer::new();
        let err = renderer.render("{{ missing }}", &TemplateVars::new()).unwrap_err();
        assert_eq!(err.template, "{{ missing }}");
    }

    #[rstest]
    #[case("linux", "linux")]
    #[case(" Linux Servers ", "Linux_Servers")]
    #[case("a/b.c", "a_b_c")]
    #[case("keep-this_1", "keep-this_1")]
    fn test_sanitize_identifier(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(sanitize_identifier(raw), expected);
    }
}
