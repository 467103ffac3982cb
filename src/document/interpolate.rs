use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use serde_yaml::{Mapping, Value};

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$\{([^}]+)\}").expect("placeholder pattern compiles"));

const DEFAULT_SEPARATOR: &str = ":-";

/// Source of environment values consulted before the document itself.
pub type EnvLookup = Box<dyn Fn(&str) -> Option<String>>;

pub fn process_env() -> EnvLookup {
    Box::new(|name: &str| std::env::var(name).ok())
}

/// Expand every `${path}` / `${path:-default}` placeholder found in string
/// leaves of `value`, resolving against `context`.
pub fn expand(value: Value, context: &Value, env: &dyn Fn(&str) -> Option<String>) -> Value {
    match value {
        Value::String(text) => Value::String(expand_str(&text, context, env)),
        Value::Sequence(items) => Value::Sequence(
            items
                .into_iter()
                .map(|item| expand(item, context, env))
                .collect(),
        ),
        Value::Mapping(map) => {
            let mut expanded = Mapping::with_capacity(map.len());
            for (key, item) in map {
                expanded.insert(key, expand(item, context, env));
            }
            Value::Mapping(expanded)
        }
        other => other,
    }
}

pub fn expand_str(text: &str, context: &Value, env: &dyn Fn(&str) -> Option<String>) -> String {
    PLACEHOLDER
        .replace_all(text, |captures: &Captures<'_>| {
            let body = &captures[1];
            let (name, default) = match body.split_once(DEFAULT_SEPARATOR) {
                Some((name, default)) => (name, Some(default)),
                None => (body, None),
            };
            if let Some(value) = env(name) {
                return value;
            }
            if let Some(value) = lookup_path(context, name).and_then(stringify) {
                return value;
            }
            match default {
                Some(default) => default.to_string(),
                None => captures[0].to_string(),
            }
        })
        .into_owned()
}

/// Walk nested mappings following a dotted path.
pub fn lookup_path<'a>(root: &'a Value, path: &str) -> Option<&'a Value> {
    let mut current = root;
    for part in path.split('.') {
        current = current.as_mapping()?.get(part)?;
    }
    Some(current)
}

/// Textual form of a document value; `None` for null so that defaults apply.
pub fn stringify(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(text) => Some(text.clone()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Number(number) => Some(number.to_string()),
        Value::Tagged(tagged) => stringify(&tagged.value),
        compound => serde_json::to_string(compound).ok(),
    }
}
