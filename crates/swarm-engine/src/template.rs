//! `${step_name.field.subfield}` template resolution against step outputs.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static PLACEHOLDER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$\{([A-Za-z0-9_]+(?:\.[A-Za-z0-9_]+)*)\}").expect("placeholder regex is valid")
});

/// Resolve every `${...}` placeholder in `template` against `step_results`.
///
/// A template without markers is returned verbatim. The first path segment
/// names a step; the rest traverse its output by field name, with numeric
/// segments indexing arrays. An unresolvable path leaves the original token
/// untouched rather than erroring.
pub fn resolve_template(template: &str, step_results: &HashMap<String, Value>) -> String {
    if !template.contains("${") {
        return template.to_string();
    }

    PLACEHOLDER
        .replace_all(template, |captures: &regex::Captures<'_>| {
            let path = &captures[1];
            match lookup_path(path, step_results) {
                Some(value) => value_as_string(value),
                None => captures[0].to_string(),
            }
        })
        .into_owned()
}

fn lookup_path<'a>(path: &str, step_results: &'a HashMap<String, Value>) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let step_name = segments.next()?;
    let mut current = step_results.get(step_name)?;

    for segment in segments {
        current = if let Ok(index) = segment.parse::<usize>() {
            current.get(index)?
        } else {
            current.get(segment)?
        };
    }

    Some(current)
}

fn value_as_string(value: &Value) -> String {
    match value {
        Value::String(inner) => inner.clone(),
        _ => value.to_string(),
    }
}
