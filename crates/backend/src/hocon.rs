//! The subset of HOCON the engine configuration uses.
//!
//! [`serialize`] writes nested blocks with `key = value` pairs. [`parse`]
//! reads user override files: objects, arrays, quoted, triple-quoted and
//! unquoted strings, numbers, booleans, `null`, dotted keys, `=`/`:`
//! separators, comments, and repeated keys (objects merge, scalars are
//! replaced). Substitutions (`${...}`) and `+=` are rejected.

use std::fmt::Write as _;

use serde_json::{Number, Value};
use thiserror::Error;
use wharf_types::ConfigFragment;

use crate::merge::merge;

const INDENT: &str = "    ";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("line {line}, column {column}: {message}")]
pub struct HoconError {
    pub line: usize,
    pub column: usize,
    pub message: String,
}

/// Render `fragment` as HOCON.
pub fn serialize(fragment: &ConfigFragment) -> String {
    let mut out = String::new();
    write_members(&mut out, fragment, 0);
    out
}

fn write_members(out: &mut String, fragment: &ConfigFragment, depth: usize) {
    for (key, value) in fragment {
        out.push_str(&INDENT.repeat(depth));
        out.push_str(&render_key(key));
        match value {
            Value::Object(nested) => {
                out.push_str(" {\n");
                write_members(out, nested, depth + 1);
                out.push_str(&INDENT.repeat(depth));
                out.push_str("}\n");
            }
            other => {
                out.push_str(" = ");
                write_value(out, other, depth);
                out.push('\n');
            }
        }
    }
}

fn write_value(out: &mut String, value: &Value, depth: usize) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(flag) => out.push_str(if *flag { "true" } else { "false" }),
        Value::Number(number) => out.push_str(&number.to_string()),
        Value::String(text) => out.push_str(&render_string(text)),
        Value::Array(items) if items.iter().all(|item| !item.is_object() && !item.is_array()) => {
            out.push('[');
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    out.push_str(", ");
                }
                write_value(out, item, depth);
            }
            out.push(']');
        }
        Value::Array(items) => {
            out.push_str("[\n");
            for item in items {
                out.push_str(&INDENT.repeat(depth + 1));
                write_value(out, item, depth + 1);
                out.push('\n');
            }
            out.push_str(&INDENT.repeat(depth));
            out.push(']');
        }
        Value::Object(nested) => {
            out.push_str("{\n");
            write_members(out, nested, depth + 1);
            out.push_str(&INDENT.repeat(depth));
            out.push('}');
        }
    }
}

fn render_key(key: &str) -> String {
    let bare = !key.is_empty()
        && key
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_');
    if bare { key.to_string() } else { quote(key) }
}

fn render_string(text: &str) -> String {
    if text.contains('\n') && !text.contains("\"\"\"") {
        format!("\"\"\"{text}\"\"\"")
    } else {
        quote(text)
    }
}

fn quote(text: &str) -> String {
    let mut quoted = String::with_capacity(text.len() + 2);
    quoted.push('"');
    for ch in text.chars() {
        match ch {
            '"' => quoted.push_str("\\\""),
            '\\' => quoted.push_str("\\\\"),
            '\n' => quoted.push_str("\\n"),
            '\r' => quoted.push_str("\\r"),
            '\t' => quoted.push_str("\\t"),
            ch if ch.is_control() => {
                let _ = write!(quoted, "\\u{:04x}", ch as u32);
            }
            ch => quoted.push(ch),
        }
    }
    quoted.push('"');
    quoted
}

/// Parse HOCON text into a nested mapping.
pub fn parse(text: &str) -> Result<ConfigFragment, HoconError> {
    let mut parser = Parser {
        chars: text.chars().collect(),
        pos: 0,
    };
    parser.skip_whitespace_and_comments();
    let root = if parser.peek() == Some('{') {
        parser.bump();
        let object = parser.parse_members(Some('}'))?;
        parser.skip_whitespace_and_comments();
        object
    } else {
        parser.parse_members(None)?
    };
    if let Some(ch) = parser.peek() {
        return Err(parser.error(format!("unexpected '{ch}' after end of document")));
    }
    Ok(root)
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn peek_at(&self, offset: usize) -> Option<char> {
        self.chars.get(self.pos + offset).copied()
    }

    fn bump(&mut self) -> Option<char> {
        let ch = self.peek()?;
        self.pos += 1;
        Some(ch)
    }

    fn starts_with(&self, literal: &str) -> bool {
        literal
            .chars()
            .enumerate()
            .all(|(offset, ch)| self.peek_at(offset) == Some(ch))
    }

    fn error(&self, message: impl Into<String>) -> HoconError {
        let consumed = &self.chars[..self.pos.min(self.chars.len())];
        let line = consumed.iter().filter(|ch| **ch == '\n').count() + 1;
        let column = consumed.iter().rev().take_while(|ch| **ch != '\n').count() + 1;
        HoconError {
            line,
            column,
            message: message.into(),
        }
    }

    fn skip_comment(&mut self) -> bool {
        if self.peek() == Some('#') || self.starts_with("//") {
            while let Some(ch) = self.peek() {
                if ch == '\n' {
                    break;
                }
                self.pos += 1;
            }
            return true;
        }
        false
    }

    /// Skip spaces and tabs (not newlines) and trailing comments.
    fn skip_inline_space(&mut self) {
        loop {
            match self.peek() {
                Some(' ' | '\t' | '\r') => self.pos += 1,
                _ if self.skip_comment() => {}
                _ => break,
            }
        }
    }

    fn skip_whitespace_and_comments(&mut self) {
        loop {
            match self.peek() {
                Some(ch) if ch.is_whitespace() => self.pos += 1,
                _ if self.skip_comment() => {}
                _ => break,
            }
        }
    }

    fn parse_members(&mut self, close: Option<char>) -> Result<ConfigFragment, HoconError> {
        let mut object = ConfigFragment::new();
        loop {
            self.skip_whitespace_and_comments();
            while self.peek() == Some(',') {
                self.bump();
                self.skip_whitespace_and_comments();
            }
            match (self.peek(), close) {
                (None, None) => return Ok(object),
                (None, Some(close)) => return Err(self.error(format!("expected '{close}' before end of document"))),
                (Some(ch), Some(close)) if ch == close => {
                    self.bump();
                    return Ok(object);
                }
                _ => {}
            }

            if self.at_include() {
                self.skip_line();
                continue;
            }

            let path = self.parse_key_path()?;
            self.skip_inline_space();
            let value = match self.peek() {
                Some('{') => self.parse_value()?,
                Some('=' | ':') => {
                    self.bump();
                    self.skip_inline_space();
                    self.parse_value()?
                }
                Some('+') if self.peek_at(1) == Some('=') => {
                    return Err(self.error("'+=' is not supported"));
                }
                Some(ch) => return Err(self.error(format!("expected '=', ':' or '{{' after key, found '{ch}'"))),
                None => return Err(self.error("expected a value after key")),
            };
            insert_path(&mut object, &path, value);
            self.expect_separator(close)?;
        }
    }

    fn at_include(&self) -> bool {
        self.starts_with("include") && matches!(self.peek_at("include".len()), Some(' ' | '\t'))
    }

    fn skip_line(&mut self) {
        while let Some(ch) = self.bump() {
            if ch == '\n' {
                break;
            }
        }
    }

    fn expect_separator(&mut self, close: Option<char>) -> Result<(), HoconError> {
        self.skip_inline_space();
        match self.peek() {
            None | Some('\n' | ',') => Ok(()),
            Some(ch) if Some(ch) == close => Ok(()),
            Some(ch) => Err(self.error(format!("unexpected '{ch}' after value"))),
        }
    }

    fn parse_key_path(&mut self) -> Result<Vec<String>, HoconError> {
        let mut segments = Vec::new();
        loop {
            let segment = match self.peek() {
                Some('"') => self.parse_quoted()?,
                _ => {
                    let start = self.pos;
                    while let Some(ch) = self.peek() {
                        if ch.is_alphanumeric() || matches!(ch, '-' | '_') {
                            self.pos += 1;
                        } else {
                            break;
                        }
                    }
                    if self.pos == start {
                        return Err(self.error("expected a key"));
                    }
                    self.chars[start..self.pos].iter().collect()
                }
            };
            segments.push(segment);
            if self.peek() == Some('.') {
                self.bump();
            } else {
                return Ok(segments);
            }
        }
    }

    fn parse_value(&mut self) -> Result<Value, HoconError> {
        match self.peek() {
            Some('{') => {
                self.bump();
                self.parse_members(Some('}')).map(Value::Object)
            }
            Some('[') => {
                self.bump();
                self.parse_array()
            }
            Some('"') if self.starts_with("\"\"\"") => self.parse_triple_quoted().map(Value::String),
            Some('"') => self.parse_quoted().map(Value::String),
            Some('$') if self.peek_at(1) == Some('{') => Err(self.error("substitutions (${...}) are not supported")),
            Some(_) => self.parse_unquoted(),
            None => Err(self.error("expected a value")),
        }
    }

    fn parse_array(&mut self) -> Result<Value, HoconError> {
        let mut items = Vec::new();
        loop {
            self.skip_whitespace_and_comments();
            match self.peek() {
                Some(']') => {
                    self.bump();
                    return Ok(Value::Array(items));
                }
                Some(',') => {
                    self.bump();
                }
                None => return Err(self.error("expected ']' before end of document")),
                Some(_) => {
                    items.push(self.parse_value()?);
                    self.skip_inline_space();
                    match self.peek() {
                        Some(',' | '\n' | ']') => {}
                        Some(ch) => return Err(self.error(format!("unexpected '{ch}' in array"))),
                        None => return Err(self.error("expected ']' before end of document")),
                    }
                }
            }
        }
    }

    fn parse_quoted(&mut self) -> Result<String, HoconError> {
        self.bump();
        let mut text = String::new();
        loop {
            match self.bump() {
                None | Some('\n') => return Err(self.error("unterminated string")),
                Some('"') => return Ok(text),
                Some('\\') => {
                    let escaped = match self.bump() {
                        Some('n') => '\n',
                        Some('t') => '\t',
                        Some('r') => '\r',
                        Some('b') => '\u{8}',
                        Some('f') => '\u{c}',
                        Some('u') => self.parse_unicode_escape()?,
                        Some(ch @ ('"' | '\\' | '/')) => ch,
                        Some(ch) => return Err(self.error(format!("invalid escape '\\{ch}'"))),
                        None => return Err(self.error("unterminated string")),
                    };
                    text.push(escaped);
                }
                Some(ch) => text.push(ch),
            }
        }
    }

    fn parse_unicode_escape(&mut self) -> Result<char, HoconError> {
        let digits: String = (0..4).filter_map(|_| self.bump()).collect();
        u32::from_str_radix(&digits, 16)
            .ok()
            .and_then(char::from_u32)
            .ok_or_else(|| self.error(format!("invalid unicode escape '\\u{digits}'")))
    }

    fn parse_triple_quoted(&mut self) -> Result<String, HoconError> {
        self.pos += 3;
        let start = self.pos;
        while self.pos < self.chars.len() {
            if self.starts_with("\"\"\"") {
                // Extra quotes before the closing delimiter belong to the string.
                while self.peek_at(3) == Some('"') {
                    self.pos += 1;
                }
                let text = self.chars[start..self.pos].iter().collect();
                self.pos += 3;
                return Ok(text);
            }
            self.pos += 1;
        }
        Err(self.error("unterminated triple-quoted string"))
    }

    fn parse_unquoted(&mut self) -> Result<Value, HoconError> {
        let start = self.pos;
        while let Some(ch) = self.peek() {
            if matches!(ch, '\n' | ',' | '}' | ']' | '#' | '{' | '[' | '"') || self.starts_with("//") {
                break;
            }
            if ch == '$' && self.peek_at(1) == Some('{') {
                return Err(self.error("substitutions (${...}) are not supported"));
            }
            if matches!(ch, '=' | ':' | '`' | '^' | '!' | '@' | '*' | '\\') {
                return Err(self.error(format!("unexpected '{ch}' in unquoted value; quote the value")));
            }
            self.pos += 1;
        }
        let raw: String = self.chars[start..self.pos].iter().collect();
        let token = raw.trim();
        if token.is_empty() {
            return Err(self.error("expected a value"));
        }
        Ok(match token {
            "true" => Value::Bool(true),
            "false" => Value::Bool(false),
            "null" => Value::Null,
            _ => parse_number(token).unwrap_or_else(|| Value::String(token.to_string())),
        })
    }
}

fn parse_number(token: &str) -> Option<Value> {
    if let Ok(integer) = token.parse::<i64>() {
        return Some(Value::Number(integer.into()));
    }
    let looks_numeric = token
        .chars()
        .all(|ch| ch.is_ascii_digit() || matches!(ch, '.' | '-' | '+' | 'e' | 'E'))
        && token.chars().any(|ch| ch.is_ascii_digit());
    if !looks_numeric {
        return None;
    }
    token.parse::<f64>().ok().and_then(Number::from_f64).map(Value::Number)
}

/// Insert `value` at a dotted key path, merging objects with earlier values.
fn insert_path(object: &mut ConfigFragment, path: &[String], value: Value) {
    let Some((first, rest)) = path.split_first() else {
        return;
    };
    let value = rest.iter().rev().fold(value, |inner, segment| {
        let mut wrapper = ConfigFragment::new();
        wrapper.insert(segment.clone(), inner);
        Value::Object(wrapper)
    });
    match (object.get_mut(first), value) {
        (Some(Value::Object(existing)), Value::Object(incoming)) => {
            let merged = merge(std::mem::take(existing), &incoming);
            *existing = merged;
        }
        (_, value) => {
            object.insert(first.clone(), value);
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn parses_common_forms() {
        let text = r#"
# comment
backend {
  default = "slurm"
  providers.Local.config {
    concurrent-job-limit = 5   // trailing
    root: /data/out
  }
}
database.db.connectionTimeout = 5000
flags = [1, "two", true]
"#;
        let parsed = parse(text).unwrap();
        assert_eq!(
            Value::Object(parsed),
            json!({
                "backend": {
                    "default": "slurm",
                    "providers": {"Local": {"config": {"concurrent-job-limit": 5, "root": "/data/out"}}}
                },
                "database": {"db": {"connectionTimeout": 5000}},
                "flags": [1, "two", true]
            })
        );
    }

    #[test]
    fn repeated_objects_merge() {
        let parsed = parse("a { x = 1 }\na { y = 2 }\na.x = 3\n").unwrap();
        assert_eq!(Value::Object(parsed), json!({"a": {"x": 3, "y": 2}}));
    }

    #[test]
    fn triple_quoted_strings_keep_newlines() {
        let parsed = parse("submit = \"\"\"\nsbatch ${script}\n\"\"\"\n").unwrap();
        assert_eq!(parsed["submit"], json!("\nsbatch ${script}\n"));
    }

    #[test]
    fn include_lines_are_skipped() {
        let parsed = parse("include required(classpath(\"application\"))\nx = 1\n").unwrap();
        assert_eq!(Value::Object(parsed), json!({"x": 1}));
    }

    #[test]
    fn reports_position_of_errors() {
        let error = parse("a {\n  b = = 1\n}").unwrap_err();
        assert_eq!(error.line, 2);

        let error = parse("a = ${other}").unwrap_err();
        assert!(error.message.contains("substitutions"), "{error}");

        assert!(parse("a { b = 1").is_err());
        assert!(parse("a += 1").is_err());
    }

    #[test]
    fn serialized_output_parses_back() {
        let fragment = json!({
            "backend": {
                "default": "Local",
                "providers": {"Local": {"config": {
                    "concurrent-job-limit": 1000,
                    "submit": "if [ -z \"${x}\" ]; then\n  /bin/bash ${script}\nfi",
                    "filesystems": {"local": {"localization": ["soft-link", "copy"]}}
                }}}
            },
            "google": {"auths": [{"name": "application-default", "scheme": "application_default"}]},
            "odd.key": "quoted \"value\""
        });
        let fragment = fragment.as_object().cloned().unwrap();
        let text = serialize(&fragment);
        assert!(text.contains("submit = \"\"\""), "{text}");
        assert!(text.contains("\"odd.key\""), "{text}");
        assert_eq!(parse(&text).unwrap(), fragment);
    }
}
