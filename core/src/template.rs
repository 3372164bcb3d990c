//! URL templates with `:name` path tokens.
//!
//! A template is split once into literal text and token parts. A token is a
//! `:` followed by an identifier (ASCII letter or `_`, then letters, digits
//! or `_`); any other `:` is literal text, so `http://host:8080/x` contains
//! no tokens.

use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Part<'a> {
    Literal(&'a str),
    Token(&'a str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlTemplate<'a> {
    parts: Vec<Part<'a>>,
}

impl<'a> UrlTemplate<'a> {
    pub fn parse(template: &'a str) -> Self {
        let bytes = template.as_bytes();
        let mut parts = Vec::new();
        let mut literal_start = 0;
        let mut i = 0;
        while i < bytes.len() {
            if bytes[i] == b':' && bytes.get(i + 1).is_some_and(|&b| is_ident_start(b)) {
                let end = bytes[i + 1..]
                    .iter()
                    .position(|&b| !is_ident_continue(b))
                    .map_or(bytes.len(), |n| i + 1 + n);
                if literal_start < i {
                    parts.push(Part::Literal(&template[literal_start..i]));
                }
                parts.push(Part::Token(&template[i + 1..end]));
                literal_start = end;
                i = end;
            } else {
                i += 1;
            }
        }
        if literal_start < bytes.len() {
            parts.push(Part::Literal(&template[literal_start..]));
        }
        Self { parts }
    }

    pub fn parts(&self) -> &[Part<'a>] {
        &self.parts
    }

    pub fn tokens(&self) -> impl Iterator<Item = &'a str> + '_ {
        self.parts.iter().filter_map(|part| match part {
            Part::Token(name) => Some(*name),
            Part::Literal(_) => None,
        })
    }

    /// Substitute tokens from `values`. Tokens with no entry are written
    /// back unresolved as `:name`.
    pub fn render(&self, values: Option<&Map<String, Value>>) -> String {
        let mut out = String::new();
        for part in &self.parts {
            match part {
                Part::Literal(text) => out.push_str(text),
                Part::Token(name) => match values.and_then(|v| v.get(*name)) {
                    Some(value) => out.push_str(&display_value(value)),
                    None => {
                        out.push(':');
                        out.push_str(name);
                    }
                },
            }
        }
        out
    }
}

/// Text form of a value as sent on the wire: strings without quotes,
/// arrays as comma-separated elements.
pub(crate) fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        Value::Array(items) => items.iter().map(display_value).collect::<Vec<_>>().join(","),
        other => other.to_string(),
    }
}

fn is_ident_start(b: u8) -> bool {
    b.is_ascii_alphabetic() || b == b'_'
}

fn is_ident_continue(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}
