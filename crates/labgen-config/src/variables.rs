//! Variable interpolation for service values.
//!
//! Supports variables like:
//! - `${TZ}` - Entry of the document's `environment` block
//! - `${labgen.project}` - Project name
//! - `${labgen.base_domain}` - Base domain
//! - `${service.name}` - Key of the service being interpolated
//!
//! Unknown variables are left untouched so the orchestrator can still
//! substitute them at deploy time.

use regex::Regex;
use std::collections::BTreeMap;
use std::sync::LazyLock;

/// Variable context containing all available variables for interpolation.
#[derive(Debug, Clone, Default)]
pub struct VariableContext {
    /// Global environment from the document
    pub env: BTreeMap<String, String>,
    pub project: String,
    pub base_domain: String,
    /// Service currently being interpolated
    pub service: String,
}

// Regex for matching ${...} variables
static VAR_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([a-zA-Z_][a-zA-Z0-9_]*(?:\.[a-zA-Z_][a-zA-Z0-9_]*)?)\}").unwrap()
});

impl VariableContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Context for one service, sharing the global part of `self`.
    pub fn for_service(&self, service: &str) -> Self {
        Self {
            service: service.to_string(),
            ..self.clone()
        }
    }

    /// Resolve a variable name to its value.
    pub fn resolve(&self, var_name: &str) -> Option<String> {
        let parts: Vec<&str> = var_name.split('.').collect();

        match parts.as_slice() {
            ["labgen", "project"] => Some(self.project.clone()),
            ["labgen", "base_domain"] => Some(self.base_domain.clone()),
            ["service", "name"] if !self.service.is_empty() => Some(self.service.clone()),
            [name] => self.env.get(*name).cloned(),
            _ => None,
        }
    }

    /// Interpolate all variables in a string.
    pub fn interpolate(&self, input: &str) -> String {
        VAR_REGEX
            .replace_all(input, |caps: &regex::Captures| {
                let var_name = &caps[1];
                self.resolve(var_name)
                    .unwrap_or_else(|| format!("${{{}}}", var_name))
            })
            .to_string()
    }

    /// Interpolate the values of a map, keeping its keys.
    pub fn interpolate_map(&self, map: &BTreeMap<String, String>) -> BTreeMap<String, String> {
        map.iter()
            .map(|(k, v)| (k.clone(), self.interpolate(v)))
            .collect()
    }

    /// Names referenced in `input` that this context cannot resolve.
    pub fn unresolved(&self, input: &str) -> Vec<String> {
        VAR_REGEX
            .captures_iter(input)
            .map(|caps| caps[1].to_string())
            .filter(|name| self.resolve(name).is_none())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> VariableContext {
        let mut ctx = VariableContext::new();
        ctx.env.insert("TZ".to_string(), "Europe/Stockholm".to_string());
        ctx.env.insert("TAG".to_string(), "1.27".to_string());
        ctx.project = "homelab".to_string();
        ctx.base_domain = "lab.example.com".to_string();
        ctx
    }

    #[test]
    fn test_global_environment() {
        let result = ctx().interpolate("nginx:${TAG} in ${TZ}");
        assert_eq!(result, "nginx:1.27 in Europe/Stockholm");
    }

    #[test]
    fn test_builtins() {
        let ctx = ctx().for_service("web");
        let result = ctx.interpolate("https://${service.name}.${labgen.base_domain}");
        assert_eq!(result, "https://web.lab.example.com");
        assert_eq!(ctx.interpolate("${labgen.project}"), "homelab");
    }

    #[test]
    fn test_unknown_variable_preserved() {
        let result = ctx().interpolate("Unknown: ${MISSING} ${unknown.var}");
        assert_eq!(result, "Unknown: ${MISSING} ${unknown.var}");
    }

    #[test]
    fn test_service_name_needs_service() {
        assert_eq!(ctx().interpolate("${service.name}"), "${service.name}");
    }

    #[test]
    fn test_interpolate_map() {
        let mut map = BTreeMap::new();
        map.insert("TIMEZONE".to_string(), "${TZ}".to_string());
        let out = ctx().interpolate_map(&map);
        assert_eq!(out["TIMEZONE"], "Europe/Stockholm");
    }

    #[test]
    fn test_unresolved() {
        let missing = ctx().unresolved("${TZ} ${DB_HOST} ${labgen.project}");
        assert_eq!(missing, vec!["DB_HOST".to_string()]);
    }

    #[test]
    fn test_nested_braces() {
        let result = ctx().interpolate(r#"{"tag": "${TAG}"}"#);
        assert_eq!(result, r#"{"tag": "1.27"}"#);
    }
}
