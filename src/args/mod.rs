//! Raw argument extraction (positional / options / passthrough).
//!
//! extract = parse(prepare(tokens))
//!   prepare : split combined short options  (-pVALUE, -p=VALUE -> -p VALUE)
//!   parse   : classify tokens left to right, `--` starts the passthrough tail
//!
//! Total: never fails, odd tokens degrade to positional or flag options.

use std::collections::HashMap;

/// Value attached to a parsed option.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionValue {
    /// Option given without a following value (`--flag`, `-x --next`).
    Flag,
    /// Option followed by a plain token (`--branch dev`, `-bdev`).
    Text(String),
}

impl OptionValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            OptionValue::Flag => None,
            OptionValue::Text(s) => Some(s),
        }
    }
}

/// Result of splitting a raw argument vector.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedArguments {
    pub positional: Vec<String>,
    pub options: HashMap<String, OptionValue>,
    pub passthrough: Vec<String>,
}

impl ParsedArguments {
    pub fn option(&self, name: &str) -> Option<&OptionValue> {
        self.options.get(name)
    }

    /// String value of an option; `None` when absent or given as a bare flag.
    pub fn text(&self, name: &str) -> Option<&str> {
        self.option(name).and_then(OptionValue::as_text)
    }

    /// Boolean reading of an option: bare flags are true, string values are
    /// interpreted with the usual yes/no spellings.
    pub fn enabled(&self, name: &str) -> bool {
        match self.option(name) {
            None => false,
            Some(OptionValue::Flag) => true,
            Some(OptionValue::Text(raw)) => matches!(
                raw.trim().to_ascii_lowercase().as_str(),
                "true" | "1" | "yes" | "y"
            ),
        }
    }
}

/// Split the raw tokens into positional arguments, options and the
/// passthrough tail.
pub fn extract<I, S>(tokens: I) -> ParsedArguments
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    parse(prepare(tokens))
}

/// Rewrite `-pVALUE` / `-p=VALUE` into `-p`, `VALUE`. Everything else is
/// passed through in order.
pub fn prepare<I, S>(tokens: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    tokens
        .into_iter()
        .flat_map(|token| match split_short(token.as_ref()) {
            Some((flag, value)) => vec![flag.to_string(), value.to_string()],
            None => vec![token.as_ref().to_string()],
        })
        .collect()
}

/// `-` + non-dash character + at least one more character.
fn split_short(token: &str) -> Option<(&str, &str)> {
    let mut chars = token.char_indices();
    if chars.next()?.1 != '-' {
        return None;
    }
    if chars.next()?.1 == '-' {
        return None;
    }
    let (value_start, next) = chars.next()?;
    let value = if next == '=' {
        &token[value_start + 1..]
    } else {
        &token[value_start..]
    };
    Some((&token[..value_start], value))
}

/// Reduction state threaded through the classification pass.
#[derive(Default)]
struct Scan {
    positional: Vec<String>,
    options: HashMap<String, OptionValue>,
    pending: Option<String>,
}

impl Scan {
    fn step(mut self, token: &str) -> Self {
        if is_option(token) {
            self.settle();
            self.pending = Some(option_name(token).to_string());
        } else if let Some(name) = self.pending.take() {
            self.options.insert(name, OptionValue::Text(token.to_string()));
        } else {
            self.positional.push(token.to_string());
        }
        self
    }

    /// A registered option with no value yet becomes a flag.
    fn settle(&mut self) {
        if let Some(name) = self.pending.take() {
            self.options.insert(name, OptionValue::Flag);
        }
    }

    fn finish(mut self, passthrough: Vec<String>) -> ParsedArguments {
        self.settle();
        ParsedArguments {
            positional: self.positional,
            options: self.options,
            passthrough,
        }
    }
}

/// Classify already-prepared tokens. Tokens after the first `--` are never
/// inspected.
pub fn parse(tokens: Vec<String>) -> ParsedArguments {
    let (head, passthrough) = match tokens.iter().position(|t| t == "--") {
        Some(idx) => (&tokens[..idx], tokens[idx + 1..].to_vec()),
        None => (&tokens[..], Vec::new()),
    };
    head.iter()
        .fold(Scan::default(), |scan, token| scan.step(token))
        .finish(passthrough)
}

fn is_option(raw: &str) -> bool {
    raw.starts_with('-')
}

fn option_name(raw: &str) -> &str {
    raw.strip_prefix("--")
        .or_else(|| raw.strip_prefix('-'))
        .unwrap_or(raw)
}
