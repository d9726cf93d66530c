//! Turning a model reply into an [`Action`].
//!
//! Replies are expected to hold one JSON object with `thoughts` and
//! `command`, but models wrap it in prose and code fences often enough that
//! the parser looks for a fenced ```json block first and falls back to the
//! first balanced `{...}` region. In function-calling mode the function call
//! names the command and the content only carries thoughts.
//!
//! Choosing an unregistered command is not a parse error; that is for the
//! registry to reject.

use std::sync::LazyLock;

use regex_lite::Regex;
use serde_json::{Map, Value};
use thinkloop_core::command::CommandArgs;
use thinkloop_core::history::{Action, AgentThoughts};
use thinkloop_core::message::Message;

static FENCED_JSON: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:json|JSON)?[ \t]*\r?\n?(\{.*?\})\s*```").expect("Invalid fenced JSON regex")
});

/// Why a reply could not be turned into an action.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("No JSON object found in the response")]
    NoJson,

    #[error("Invalid JSON in the response: {0}")]
    InvalidJson(String),

    #[error("Response does not match the required format: {0}")]
    InvalidFormat(String),
}

pub struct ResponseParser;

impl ResponseParser {
    /// Parse an assistant message into an action.
    pub fn parse(message: &Message) -> Result<Action, ParseError> {
        match &message.function_call {
            Some(call) => {
                let args = parse_function_args(&call.arguments)?;
                let thoughts = Self::extract_object(&message.content)
                    .ok()
                    .and_then(|obj| obj.get("thoughts").map(thoughts_from))
                    .unwrap_or_else(|| AgentThoughts {
                        text: message.content.trim().to_string(),
                        ..AgentThoughts::default()
                    });
                Ok(Action {
                    name: non_empty(&call.name),
                    args,
                    thoughts,
                })
            }
            None => Self::parse_text(&message.content),
        }
    }

    /// Parse a plain-text reply holding a `{"thoughts": ..., "command": ...}` object.
    pub fn parse_text(text: &str) -> Result<Action, ParseError> {
        let obj = Self::extract_object(text)?;

        let thoughts = obj.get("thoughts").map(thoughts_from).unwrap_or_default();

        let (name, args) = match obj.get("command") {
            None | Some(Value::Null) => (None, CommandArgs::new()),
            Some(Value::Object(command)) => {
                let name = match command.get("name") {
                    None | Some(Value::Null) => None,
                    Some(Value::String(s)) => non_empty(s),
                    Some(other) => {
                        return Err(ParseError::InvalidFormat(format!(
                            "command.name must be a string, got {other}"
                        )));
                    }
                };
                let args = match command.get("args") {
                    None | Some(Value::Null) => CommandArgs::new(),
                    Some(Value::Object(args)) => args.clone(),
                    Some(other) => {
                        return Err(ParseError::InvalidFormat(format!(
                            "command.args must be an object, got {other}"
                        )));
                    }
                };
                (name, args)
            }
            Some(other) => {
                return Err(ParseError::InvalidFormat(format!(
                    "command must be an object, got {other}"
                )));
            }
        };

        Ok(Action { name, args, thoughts })
    }

    /// Find and decode the JSON object in `text`.
    pub fn extract_object(text: &str) -> Result<Map<String, Value>, ParseError> {
        let candidates = Self::candidates(text);
        if candidates.is_empty() {
            return Err(ParseError::NoJson);
        }

        let mut first_error = None;
        for candidate in candidates {
            match serde_json::from_str::<Value>(candidate) {
                Ok(Value::Object(obj)) => return Ok(obj),
                Ok(_) => {}
                Err(e) => {
                    first_error.get_or_insert_with(|| e.to_string());
                }
            }
        }
        Err(first_error.map_or(ParseError::NoJson, ParseError::InvalidJson))
    }

    /// Fenced block first, then the first balanced `{...}` region.
    fn candidates(text: &str) -> Vec<&str> {
        let mut found = Vec::new();
        if let Some(m) = FENCED_JSON.captures(text).and_then(|c| c.get(1)) {
            found.push(m.as_str());
        }
        if let Some(region) = first_balanced_object(text) {
            if !found.contains(&region) {
                found.push(region);
            }
        }
        found
    }
}

/// The first `{...}` region with balanced braces, ignoring braces inside
/// JSON strings.
fn first_balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

fn parse_function_args(raw: &str) -> Result<CommandArgs, ParseError> {
    if raw.trim().is_empty() {
        return Ok(CommandArgs::new());
    }
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(args)) => Ok(args),
        Ok(Value::Null) => Ok(CommandArgs::new()),
        Ok(other) => Err(ParseError::InvalidFormat(format!(
            "function arguments must be an object, got {other}"
        ))),
        Err(e) => Err(ParseError::InvalidJson(e.to_string())),
    }
}

fn non_empty(name: &str) -> Option<String> {
    let trimmed = name.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Lenient: missing fields are empty, non-string values are stringified,
/// and a bare string becomes the thought text.
fn thoughts_from(value: &Value) -> AgentThoughts {
    let field = |obj: &Map<String, Value>, key: &str| -> String {
        match obj.get(key) {
            None | Some(Value::Null) => String::new(),
            Some(Value::String(s)) => s.clone(),
            Some(Value::Array(items)) => items
                .iter()
                .map(|i| match i {
                    Value::String(s) => format!("- {s}"),
                    other => format!("- {other}"),
                })
                .collect::<Vec<_>>()
                .join("\n"),
            Some(other) => other.to_string(),
        }
    };

    match value {
        Value::Object(obj) => {
            let self_criticism = match field(obj, "self_criticism") {
                s if s.is_empty() => field(obj, "criticism"),
                s => s,
            };
            AgentThoughts {
                observations: field(obj, "observations"),
                text: field(obj, "text"),
                reasoning: field(obj, "reasoning"),
                self_criticism,
                plan: field(obj, "plan"),
                speak: field(obj, "speak"),
            }
        }
        Value::String(s) => AgentThoughts {
            text: s.clone(),
            ..AgentThoughts::default()
        },
        _ => AgentThoughts::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const PAYLOAD: &str = r#"{
  "thoughts": {
    "text": "I should write the file",
    "reasoning": "The goal asks for it",
    "plan": "- write\n- finish",
    "self_criticism": "None",
    "speak": "Writing the file"
  },
  "command": {"name": "write_file", "args": {"filename": "output.txt", "contents": "Washington"}}
}"#;

    #[test]
    fn parses_bare_json() {
        let action = ResponseParser::parse(&Message::assistant(PAYLOAD)).unwrap();
        assert_eq!(action.name.as_deref(), Some("write_file"));
        assert_eq!(action.args["filename"], json!("output.txt"));
        assert_eq!(action.thoughts.text, "I should write the file");
        assert_eq!(action.thoughts.speak, "Writing the file");
    }

    #[test]
    fn fenced_block_in_prose_matches_bare_payload() {
        let bare = ResponseParser::parse(&Message::assistant(PAYLOAD)).unwrap();
        let wrapped = format!(
            "Sure! Here is my next step {{as requested}}:\n\n```json\n{PAYLOAD}\n```\n\nLet me know if {{anything}} else is needed."
        );
        let parsed = ResponseParser::parse(&Message::assistant(wrapped)).unwrap();
        assert_eq!(parsed, bare);
    }

    #[test]
    fn unfenced_json_in_prose_is_found() {
        let bare = ResponseParser::parse(&Message::assistant(PAYLOAD)).unwrap();
        let wrapped = format!("My answer follows.\n{PAYLOAD}\nThat's all.");
        assert_eq!(ResponseParser::parse(&Message::assistant(wrapped)).unwrap(), bare);
    }

    #[test]
    fn braces_inside_strings_do_not_confuse_the_scan() {
        let text = r#"Answer: {"command": {"name": "write_file", "args": {"filename": "a.txt", "contents": "fn main() { }"}}} trailing }"#;
        let action = ResponseParser::parse_text(text).unwrap();
        assert_eq!(action.args["contents"], json!("fn main() { }"));
    }

    #[test]
    fn no_json_is_an_error() {
        assert_eq!(
            ResponseParser::parse(&Message::assistant("I think I'm done here.")).unwrap_err(),
            ParseError::NoJson
        );
    }

    #[test]
    fn truncated_json_is_an_error() {
        let err = ResponseParser::parse_text(r#"{"command": {"name": "finish", "args": {"#).unwrap_err();
        assert_eq!(err, ParseError::NoJson);

        let err = ResponseParser::parse_text("```json\n{\"command\": nope}\n```").unwrap_err();
        assert!(matches!(err, ParseError::InvalidJson(_)));
    }

    #[test]
    fn wrong_shapes_are_format_errors() {
        let err = ResponseParser::parse_text(r#"{"command": "finish"}"#).unwrap_err();
        assert!(matches!(err, ParseError::InvalidFormat(_)));
        let err = ResponseParser::parse_text(r#"{"command": {"name": "finish", "args": [1]}}"#).unwrap_err();
        assert!(matches!(err, ParseError::InvalidFormat(_)));
    }

    #[test]
    fn missing_or_empty_command_is_no_command() {
        let action = ResponseParser::parse_text(r#"{"thoughts": {"text": "hmm"}}"#).unwrap();
        assert!(!action.has_command());
        assert_eq!(action.thoughts.text, "hmm");

        let action = ResponseParser::parse_text(r#"{"command": {"name": "  ", "args": {}}}"#).unwrap();
        assert!(action.name.is_none());
    }

    #[test]
    fn unknown_command_name_is_not_a_parse_error() {
        let action = ResponseParser::parse_text(r#"{"command": {"name": "fly_to_moon"}}"#).unwrap();
        assert_eq!(action.name.as_deref(), Some("fly_to_moon"));
        assert!(action.args.is_empty());
    }

    #[test]
    fn function_call_takes_precedence() {
        let message = Message::assistant(r#"{"thoughts": {"text": "use the function"}, "command": {"name": "ignored"}}"#)
            .with_function_call("read_file", r#"{"filename": "a.txt"}"#);
        let action = ResponseParser::parse(&message).unwrap();
        assert_eq!(action.name.as_deref(), Some("read_file"));
        assert_eq!(action.args["filename"], json!("a.txt"));
        assert_eq!(action.thoughts.text, "use the function");
    }

    #[test]
    fn function_call_with_plain_text_thoughts() {
        let message = Message::assistant("Reading the file first.")
            .with_function_call("get_current_datetime", "");
        let action = ResponseParser::parse(&message).unwrap();
        assert!(action.args.is_empty());
        assert_eq!(action.thoughts.text, "Reading the file first.");

        let bad = Message::assistant("").with_function_call("read_file", "{not json");
        assert!(matches!(ResponseParser::parse(&bad), Err(ParseError::InvalidJson(_))));
    }

    #[test]
    fn lenient_thoughts() {
        let action = ResponseParser::parse_text(
            r#"{"thoughts": {"plan": ["read", "write"], "criticism": "too slow", "text": 3}}"#,
        )
        .unwrap();
        assert_eq!(action.thoughts.plan, "- read\n- write");
        assert_eq!(action.thoughts.self_criticism, "too slow");
        assert_eq!(action.thoughts.text, "3");
    }
}
