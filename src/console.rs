//! Text front end for a [`Registry`], one command per line.

use serde_json::Value;

use crate::error::{PrimerError, Result};
use crate::managed::{ObjectName, Registry};

pub const HELP: &str = "\
commands:
  help                              show this text
  list                              registered object names
  describe <name>                   attributes and operations as JSON
  get <name> <attribute>            read an attribute
  set <name> <attribute> <value>    write an attribute
  invoke <name> <operation> [args]  call an operation

values are JSON when they parse as JSON; quote strings that contain spaces";

/// Arguments are JSON when they parse as JSON, plain strings otherwise.
fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn render(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub struct Console {
    registry: Registry,
}

impl Console {
    pub fn new(registry: Registry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    /// Runs one command line. Blank lines produce an empty response.
    pub fn execute(&mut self, line: &str) -> Result<String> {
        let line = line.trim();
        let (command, rest) = line.split_once(char::is_whitespace).unwrap_or((line, ""));
        let rest = rest.trim();

        match command {
            "" => Ok(String::new()),
            "help" => Ok(HELP.to_string()),
            "list" => Ok(self
                .registry
                .names()
                .map(ToString::to_string)
                .collect::<Vec<_>>()
                .join("\n")),
            "describe" => {
                let name = rest.parse::<ObjectName>()?;
                let descriptor = self.registry.describe(&name)?;
                serde_json::to_string_pretty(&descriptor)
                    .map_err(|err| PrimerError::invalid_argument("describe", err.to_string()))
            }
            "get" => {
                let (name, attribute) = two_words(command, rest)?;
                let value = self.registry.get_attribute(&name.parse()?, attribute)?;
                Ok(render(&value))
            }
            "set" => {
                let (name, rest) = two_words(command, rest)?;
                let (attribute, raw) = rest
                    .split_once(char::is_whitespace)
                    .ok_or_else(|| usage(command, "set <name> <attribute> <value>"))?;
                self.registry
                    .set_attribute(&name.parse()?, attribute, parse_value(raw.trim()))?;
                Ok("ok".to_string())
            }
            "invoke" => {
                let words = split_args(command, rest)?;
                let (name, operation, args) = match words.as_slice() {
                    [name, operation, args @ ..] => (*name, *operation, args),
                    _ => return Err(usage(command, "invoke <name> <operation> [args]")),
                };
                let args: Vec<Value> = args.iter().copied().map(parse_value).collect();
                let value = self.registry.invoke(&name.parse()?, operation, &args)?;
                Ok(render(&value))
            }
            other => Err(PrimerError::UnknownCommand(other.to_string())),
        }
    }
}

/// Splits on whitespace, keeping double-quoted JSON strings (escapes
/// included) in one piece.
fn split_args<'a>(command: &str, rest: &'a str) -> Result<Vec<&'a str>> {
    let mut words = Vec::new();
    let mut start = None;
    let mut in_quotes = false;
    let mut escaped = false;

    for (i, c) in rest.char_indices() {
        if in_quotes {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_quotes = false,
                _ => {}
            }
            continue;
        }
        if c.is_whitespace() {
            if let Some(from) = start.take() {
                words.push(&rest[from..i]);
            }
        } else {
            start.get_or_insert(i);
            if c == '"' {
                in_quotes = true;
            }
        }
    }

    if in_quotes {
        return Err(PrimerError::invalid_argument(command, "unterminated quoted string"));
    }
    if let Some(from) = start {
        words.push(&rest[from..]);
    }
    Ok(words)
}

fn usage(command: &str, expected: &str) -> PrimerError {
    PrimerError::invalid_argument(command, format!("usage: {expected}"))
}

fn two_words<'a>(command: &str, rest: &'a str) -> Result<(&'a str, &'a str)> {
    rest.split_once(char::is_whitespace)
        .map(|(first, second)| (first, second.trim()))
        .filter(|(_, second)| !second.is_empty())
        .ok_or_else(|| usage(command, "<name> <attribute>"))
}
