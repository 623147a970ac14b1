//! `{{path.to.value}}` placeholder substitution

use crate::context::DialogueContext;
use regex::{Captures, Regex};
use serde_json::Value;
use std::sync::OnceLock;

fn placeholder() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\{\{\s*([^{}]*?)\s*\}\}").unwrap_or_else(|e| panic!("placeholder regex: {e}"))
    })
}

/// Replaces placeholders with values from the variable context.
///
/// Paths are dot separated and walk objects by key and arrays by index.
/// A placeholder whose path does not resolve is left exactly as written. A
/// path that does resolve always renders, `null` included.
#[derive(Debug, Default, Clone, Copy)]
pub struct VariableResolver;

impl VariableResolver {
    pub fn resolve(text: &str, ctx: &DialogueContext) -> String {
        if !text.contains("{{") {
            return text.to_string();
        }
        let root = match ctx.to_value() {
            Ok(root) => root,
            Err(e) => {
                tracing::warn!(error = %e, "Could not project dialogue context");
                return text.to_string();
            }
        };
        Self::resolve_value(text, &root)
    }

    pub fn resolve_value(text: &str, root: &Value) -> String {
        placeholder()
            .replace_all(text, |caps: &Captures<'_>| {
                let path = caps.get(1).map_or("", |m| m.as_str());
                match lookup(root, path) {
                    Some(Value::String(s)) => s.clone(),
                    Some(value) => value.to_string(),
                    None => caps
                        .get(0)
                        .map_or_else(String::new, |m| m.as_str().to_string()),
                }
            })
            .into_owned()
    }
}

fn lookup<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return None;
    }
    let mut current = root;
    for segment in path.split('.') {
        current = match current {
            Value::Object(map) => map.get(segment)?,
            Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::test_context;
    use serde_json::json;

    #[test]
    fn test_player_name_substitution() {
        let ctx = test_context();
        assert_eq!(
            VariableResolver::resolve("Hello {{player.name}}", &ctx),
            "Hello Ada"
        );
    }

    #[test]
    fn test_whitespace_inside_braces() {
        let ctx = test_context();
        assert_eq!(
            VariableResolver::resolve("Hi {{ player.name }}!", &ctx),
            "Hi Ada!"
        );
    }

    #[test]
    fn test_missing_path_left_verbatim() {
        let ctx = test_context();
        let text = "Your {{player.horse.name}} and {{nothing}} wait.";
        assert_eq!(VariableResolver::resolve(text, &ctx), text);
    }

    #[test]
    fn test_numbers_arrays_and_variables() {
        let mut ctx = test_context();
        ctx.player.inventory = vec!["sword".into(), "shield".into()];
        ctx.conversation
            .variables
            .insert("price".to_string(), json!(30));
        assert_eq!(
            VariableResolver::resolve(
                "{{conversation.variables.price}} gold for the {{player.inventory.1}}",
                &ctx
            ),
            "30 gold for the shield"
        );
    }

    #[test]
    fn test_null_renders_and_missing_is_verbatim() {
        let root = json!({"a": null, "b": {"c": true}});
        assert_eq!(VariableResolver::resolve_value("{{a}}", &root), "null");
        assert_eq!(VariableResolver::resolve_value("{{b.c}}", &root), "true");
        assert_eq!(VariableResolver::resolve_value("{{b.c.d}}", &root), "{{b.c.d}}");
        assert_eq!(VariableResolver::resolve_value("{{a.d}}", &root), "{{a.d}}");
    }

    #[test]
    fn test_variable_set_without_value_renders_null() {
        let mut ctx = test_context();
        ctx.conversation
            .variables
            .insert("x".to_string(), Value::Null);
        assert_eq!(
            VariableResolver::resolve("v={{conversation.variables.x}}", &ctx),
            "v=null"
        );
    }

    #[test]
    fn test_text_without_placeholders_untouched() {
        let ctx = test_context();
        assert_eq!(VariableResolver::resolve("Plain { braces }", &ctx), "Plain { braces }");
    }
}
