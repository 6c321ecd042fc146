//! `{{name}}` placeholder substitution.
//!
//! A token is `{{` followed by one or more word characters (letters, digits,
//! underscore) and `}}`. Anything else that looks brace-like is left as
//! literal text.

use crate::error::Result;
use crate::PipelineError;
use regex::Regex;
use std::collections::HashMap;
use std::sync::OnceLock;

fn token_pattern() -> &'static Regex {
    static TOKEN: OnceLock<Regex> = OnceLock::new();
    TOKEN.get_or_init(|| Regex::new(r"\{\{(\w+)\}\}").expect("token pattern is a valid regex"))
}

fn name_pattern() -> &'static Regex {
    static NAME: OnceLock<Regex> = OnceLock::new();
    NAME.get_or_init(|| Regex::new(r"^\w+$").expect("name pattern is a valid regex"))
}

/// Replace every `{{name}}` token in `content` with its value from `variables`.
///
/// Values are inserted verbatim and never re-scanned, so a value containing
/// `{{other}}` stays as written. Fails with
/// [`PipelineError::MissingVariable`] naming the first token (in scan order)
/// that has no value; no partial output is produced.
///
/// # Example
///
/// ```
/// use prompt_pipeline::substitution::substitute;
/// use std::collections::HashMap;
///
/// let vars = HashMap::from([("name".to_string(), "Alice".to_string())]);
/// assert_eq!(substitute("Hi {{name}}!", &vars).unwrap(), "Hi Alice!");
/// ```
pub fn substitute(content: &str, variables: &HashMap<String, String>) -> Result<String> {
    let mut rendered = String::with_capacity(content.len());
    let mut last = 0;

    for caps in token_pattern().captures_iter(content) {
        let (Some(token), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let value = variables
            .get(name.as_str())
            .ok_or_else(|| PipelineError::MissingVariable(name.as_str().to_string()))?;
        rendered.push_str(&content[last..token.start()]);
        rendered.push_str(value);
        last = token.end();
    }

    rendered.push_str(&content[last..]);
    Ok(rendered)
}

/// Distinct variable names referenced by `content`, in first-occurrence order.
pub fn extract_variable_names(content: &str) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for caps in token_pattern().captures_iter(content) {
        if let Some(name) = caps.get(1) {
            if !names.iter().any(|n| n == name.as_str()) {
                names.push(name.as_str().to_string());
            }
        }
    }
    names
}

/// Whether `name` can be referenced as `{{name}}`.
pub fn is_valid_variable_name(name: &str) -> bool {
    name_pattern().is_match(name)
}
