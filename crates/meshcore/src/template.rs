//! Value resolver: `{{ path }}` placeholders resolved against the
//! execution context.
//!
//! Resolution is pure with respect to the context (the only ambient reads
//! are the `env.*` / `secrets.*` dispatch arms, which consult the process
//! environment). A path referencing an absent location resolves to "no
//! value" and never fails the node; templates render absent/null as the
//! empty string.

use std::env;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::Value;

use crate::context::ExecutionContext;

static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([^}]+?)\s*\}\}").expect("placeholder regex is valid"));

static SINGLE_PLACEHOLDER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\{\{\s*([^}]+?)\s*\}\}$").expect("single placeholder regex is valid")
});

/// Resolve a dotted path against the context.
///
/// Dispatch by first segment:
/// - `inputs`: the initial input payload, or a nested lookup into it;
/// - `secrets.<name>`: env var `<NAME>` upper-cased, then exact-case,
///   then empty string; any other depth is absent;
/// - `env.<name>`: env var or empty string; same depth constraint;
/// - a node id present in the context: that node's `output` field, or a
///   nested lookup into its full result;
/// - anything else: a nested lookup into the context itself.
pub fn resolve_path(path: &str, ctx: &ExecutionContext) -> Option<Value> {
    let path = path.trim();
    if path.is_empty() {
        return None;
    }
    let segments: Vec<&str> = path.split('.').collect();
    match segments[0] {
        "inputs" => {
            if segments.len() == 1 {
                Some(ctx.initial_input().clone())
            } else {
                lookup_segments(ctx.initial_input(), &segments[1..]).cloned()
            }
        }
        "secrets" => {
            if segments.len() != 2 {
                return None;
            }
            let name = segments[1];
            let value = env::var(name.to_uppercase())
                .or_else(|_| env::var(name))
                .unwrap_or_default();
            Some(Value::String(value))
        }
        "env" => {
            if segments.len() != 2 {
                return None;
            }
            Some(Value::String(env::var(segments[1]).unwrap_or_default()))
        }
        first if ctx.contains(first) => {
            let result = ctx.get(first)?;
            if segments.len() == 1 {
                result.get("output").cloned()
            } else {
                lookup_segments(result, &segments[1..]).cloned()
            }
        }
        _ => {
            let head = ctx.get(segments[0])?;
            lookup_segments(head, &segments[1..]).cloned()
        }
    }
}

/// Walk successive segments into a JSON structure: objects index by key,
/// arrays by all-digit segments, anything else is absent.
pub fn lookup_segments<'a>(root: &'a Value, segments: &[&str]) -> Option<&'a Value> {
    let mut current = root;
    for seg in segments {
        current = match current {
            Value::Object(map) => map.get(*seg)?,
            Value::Array(items) => {
                if seg.is_empty() || !seg.chars().all(|c| c.is_ascii_digit()) {
                    return None;
                }
                items.get(seg.parse::<usize>().ok()?)?
            }
            _ => return None,
        };
    }
    Some(current)
}

/// Replace every `{{ expr }}` occurrence with the string form of the
/// resolved value; absent and null render as the empty string.
pub fn render_template(text: &str, ctx: &ExecutionContext) -> String {
    PLACEHOLDER_RE
        .replace_all(text, |caps: &regex::Captures<'_>| {
            match resolve_path(caps[1].trim(), ctx) {
                Some(value) => value_to_string(&value),
                None => String::new(),
            }
        })
        .into_owned()
}

/// Recursively render a structure: strings through [`render_template`],
/// maps and sequences element by element, everything else unchanged.
pub fn render_value(value: &Value, ctx: &ExecutionContext) -> Value {
    match value {
        Value::String(s) => Value::String(render_template(s, ctx)),
        Value::Array(items) => Value::Array(items.iter().map(|v| render_value(v, ctx)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), render_value(v, ctx)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// If the whole string is exactly one placeholder, return its inner
/// expression. Lets callers bind the resolved value with its JSON type
/// instead of stringifying it.
pub fn single_placeholder(text: &str) -> Option<String> {
    SINGLE_PLACEHOLDER_RE
        .captures(text)
        .map(|caps| caps[1].trim().to_string())
}

pub fn contains_placeholder(text: &str) -> bool {
    PLACEHOLDER_RE.is_match(text)
}

fn value_to_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::NodeResult;
    use serde_json::json;

    fn context() -> ExecutionContext {
        let mut ctx = ExecutionContext::new(json!({
            "user": {"name": "Ada", "tags": ["ops", "ml"]},
            "limit": 5
        }));
        ctx.insert_result(
            "fetch",
            NodeResult::success(json!({"items": [{"id": 42}]}))
                .with("status_code", 200)
                .into_value(),
        );
        ctx
    }

    #[test]
    fn inputs_bare_returns_whole_payload() {
        let ctx = context();
        let value = resolve_path("inputs", &ctx).unwrap();
        assert_eq!(value["limit"], json!(5));
    }

    #[test]
    fn inputs_nested_lookup() {
        let ctx = context();
        assert_eq!(resolve_path("inputs.user.name", &ctx), Some(json!("Ada")));
        assert_eq!(resolve_path("inputs.user.tags.1", &ctx), Some(json!("ml")));
    }

    #[test]
    fn node_id_defaults_to_output_field() {
        let ctx = context();
        let value = resolve_path("fetch", &ctx).unwrap();
        assert_eq!(value["items"][0]["id"], json!(42));
    }

    #[test]
    fn node_id_with_rest_walks_full_result() {
        let ctx = context();
        assert_eq!(resolve_path("fetch.status_code", &ctx), Some(json!(200)));
        assert_eq!(
            resolve_path("fetch.output.items.0.id", &ctx),
            Some(json!(42))
        );
    }

    #[test]
    fn absent_paths_resolve_to_none_never_panic() {
        let ctx = context();
        for path in [
            "",
            "missing",
            "missing.deeper",
            "inputs.user.age",
            "inputs.user.tags.9",
            "inputs.user.tags.x",
            "inputs.limit.anything",
            "fetch.output.items.0.id.deeper",
        ] {
            assert_eq!(resolve_path(path, &ctx), None, "path {path:?}");
        }
    }

    #[test]
    fn env_and_secrets_dispatch() {
        let ctx = ExecutionContext::default();
        std::env::set_var("MESH_TPL_TOKEN", "s3cret");
        std::env::set_var("mesh_tpl_exact", "exact");

        // secrets upper-cases first, falls back to exact case
        assert_eq!(
            resolve_path("secrets.mesh_tpl_token", &ctx),
            Some(json!("s3cret"))
        );
        assert_eq!(
            resolve_path("secrets.mesh_tpl_exact", &ctx),
            Some(json!("exact"))
        );
        assert_eq!(
            resolve_path("secrets.mesh_tpl_absent", &ctx),
            Some(json!(""))
        );
        assert_eq!(resolve_path("env.MESH_TPL_TOKEN", &ctx), Some(json!("s3cret")));
        assert_eq!(resolve_path("env.mesh_tpl_nope", &ctx), Some(json!("")));

        // depth other than two segments is absent
        assert_eq!(resolve_path("secrets", &ctx), None);
        assert_eq!(resolve_path("secrets.a.b", &ctx), None);
        assert_eq!(resolve_path("env.a.b", &ctx), None);
    }

    #[test]
    fn render_substitutes_each_placeholder_once() {
        let ctx = context();
        let text = "hi {{ inputs.user.name }}, limit={{inputs.limit}}, id={{ fetch.output.items.0.id }}";
        assert_eq!(render_template(text, &ctx), "hi Ada, limit=5, id=42");
    }

    #[test]
    fn render_missing_as_empty_string() {
        let ctx = context();
        assert_eq!(render_template("[{{ nope.path }}]", &ctx), "[]");
    }

    #[test]
    fn render_is_identity_without_placeholders() {
        let ctx = context();
        let text = "no placeholders { here } at all";
        assert_eq!(render_template(text, &ctx), text);
    }

    #[test]
    fn render_value_recurses_and_is_idempotent() {
        let ctx = context();
        let structure = json!({
            "greeting": "hi {{ inputs.user.name }}",
            "nested": {"ids": ["{{ fetch.output.items.0.id }}", 7]},
            "untouched": true
        });
        let rendered = render_value(&structure, &ctx);
        assert_eq!(
            rendered,
            json!({
                "greeting": "hi Ada",
                "nested": {"ids": ["42", 7]},
                "untouched": true
            })
        );
        // rendering the already-rendered structure changes nothing
        assert_eq!(render_value(&rendered, &ctx), rendered);
    }

    #[test]
    fn single_placeholder_detection() {
        assert_eq!(
            single_placeholder("{{ fetch.output }}").as_deref(),
            Some("fetch.output")
        );
        assert_eq!(single_placeholder("x {{ fetch.output }}"), None);
        assert!(contains_placeholder("x {{ y }}"));
        assert!(!contains_placeholder("x { y }"));
    }
}
