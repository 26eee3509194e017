use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

/// A parsed `${type:name.output}` reference found in a property value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateRef {
    pub type_id: String,
    pub name: String,
    pub output: String,
}

fn pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\$\{([A-Za-z0-9:]+):([A-Za-z0-9_.-]+)\.([A-Za-z0-9_]+)\}").unwrap())
}

/// Extracts every well-formed `${type:name.output}` reference from a single
/// string value.
pub fn template_refs_in_str(s: &str) -> Vec<TemplateRef> {
    pattern()
        .captures_iter(s)
        .map(|c| TemplateRef {
            type_id: c[1].to_string(),
            name: c[2].to_string(),
            output: c[3].to_string(),
        })
        .collect()
}

/// Walks a JSON value tree and collects every template reference found in
/// any string leaf.
pub fn template_refs(value: &Value) -> Vec<TemplateRef> {
    let mut out = Vec::new();
    collect(value, &mut out);
    out
}

fn collect(value: &Value, out: &mut Vec<TemplateRef>) {
    match value {
        Value::String(s) => out.extend(template_refs_in_str(s)),
        Value::Array(items) => items.iter().for_each(|v| collect(v, out)),
        Value::Object(map) => map.values().for_each(|v| collect(v, out)),
        _ => {}
    }
}

/// Replaces every `${type:name.output}` occurrence in `s` using `resolve`,
/// which maps `(type_id, name, output)` to a resolved string. Returns the
/// first unresolved reference, if any.
pub fn resolve_str(
    s: &str,
    mut resolve: impl FnMut(&str, &str, &str) -> Option<String>,
) -> Result<String, TemplateRef> {
    let mut unresolved = None;
    let result = pattern()
        .replace_all(s, |caps: &regex::Captures| {
            let (type_id, name, output) = (&caps[1], &caps[2], &caps[3]);
            match resolve(type_id, name, output) {
                Some(v) => v,
                None => {
                    unresolved = Some(TemplateRef {
                        type_id: type_id.to_string(),
                        name: name.to_string(),
                        output: output.to_string(),
                    });
                    caps[0].to_string()
                }
            }
        })
        .into_owned();
    match unresolved {
        Some(reference) => Err(reference),
        None => Ok(result),
    }
}

/// Recursively resolves every reference in every string leaf of a JSON
/// value tree, using `resolve`. Returns the first unresolved reference, if
/// any; object key order is preserved.
pub fn resolve_value(
    value: &Value,
    resolve: &mut impl FnMut(&str, &str, &str) -> Option<String>,
) -> Result<Value, TemplateRef> {
    match value {
        Value::String(s) => resolve_str(s, &mut *resolve).map(Value::String),
        Value::Array(items) => {
            let mut resolved = Vec::with_capacity(items.len());
            for item in items {
                resolved.push(resolve_value(item, resolve)?);
            }
            Ok(Value::Array(resolved))
        }
        Value::Object(map) => {
            let mut resolved = serde_json::Map::with_capacity(map.len());
            for (k, v) in map {
                resolved.insert(k.clone(), resolve_value(v, resolve)?);
            }
            Ok(Value::Object(resolved))
        }
        other => Ok(other.clone()),
    }
}
