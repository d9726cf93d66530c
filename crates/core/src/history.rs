//! The episodic action ledger.
//!
//! One episode per cycle: the action the model proposed, what happened when
//! it ran, and a one-line summary for later prompts. The episode at the
//! cursor may be in progress (action recorded, no result yet); everything
//! before the cursor is completed and immutable.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::command::CommandArgs;
use crate::error::{CommandError, FailureKind, HistoryError};

/// Free-form reasoning the model attaches to each action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentThoughts {
    #[serde(default)]
    pub observations: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub reasoning: String,
    #[serde(default)]
    pub self_criticism: String,
    #[serde(default)]
    pub plan: String,
    /// Summary of the thoughts, to say to the user
    #[serde(default)]
    pub speak: String,
}

/// The model's proposed command for one cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// `None` when the model proposed no command
    pub name: Option<String>,
    #[serde(default)]
    pub args: CommandArgs,
    #[serde(default)]
    pub thoughts: AgentThoughts,
}

impl Action {
    pub fn new(name: impl Into<String>, args: CommandArgs) -> Self {
        Self {
            name: Some(name.into()),
            args,
            thoughts: AgentThoughts::default(),
        }
    }

    /// An action that proposes no command.
    pub fn none() -> Self {
        Self {
            name: None,
            args: CommandArgs::new(),
            thoughts: AgentThoughts::default(),
        }
    }

    pub fn with_thoughts(mut self, thoughts: AgentThoughts) -> Self {
        self.thoughts = thoughts;
        self
    }

    /// Whether a command name is present and non-empty.
    pub fn has_command(&self) -> bool {
        self.name.as_deref().is_some_and(|n| !n.trim().is_empty())
    }

    /// Same command name and same arguments. Thoughts are not compared.
    pub fn same_invocation(&self, other: &Action) -> bool {
        self.name == other.name && self.args == other.args
    }

    /// `name(arg=value, ...)` for prompts and logs.
    pub fn format_call(&self) -> String {
        let args: Vec<String> = self
            .args
            .iter()
            .map(|(k, v)| format!("{k}={v}"))
            .collect();
        format!("{}({})", self.name.as_deref().unwrap_or(""), args.join(", "))
    }
}

/// The outcome of one action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ActionResult {
    Success {
        output: Value,
    },
    Error {
        kind: FailureKind,
        message: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        hint: Option<String>,
    },
    /// The user declined the action and left feedback instead.
    Interrupted {
        feedback: String,
    },
}

const SUMMARY_OUTPUT_LIMIT: usize = 500;

impl ActionResult {
    pub fn success(output: impl Into<Value>) -> Self {
        Self::Success { output: output.into() }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    /// One-line description for the history section of the prompt.
    pub fn summary(&self) -> String {
        match self {
            Self::Success { output } => {
                let text = match output {
                    Value::String(s) => s.clone(),
                    Value::Null => "(no output)".to_string(),
                    other => other.to_string(),
                };
                format!("`{}`", truncate(&text, SUMMARY_OUTPUT_LIMIT))
            }
            Self::Error { kind, message, hint } => match hint {
                Some(hint) => format!("{kind}: {message} ({hint})"),
                None => format!("{kind}: {message}"),
            },
            Self::Interrupted { feedback } => {
                format!("The user interrupted the action with the following feedback: \"{feedback}\"")
            }
        }
    }
}

impl From<CommandError> for ActionResult {
    fn from(err: CommandError) -> Self {
        Self::Error {
            kind: err.kind(),
            hint: err.hint().map(String::from),
            message: err.to_string(),
        }
    }
}

fn truncate(text: &str, limit: usize) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }
    let head: String = text.chars().take(limit).collect();
    format!("{head}... (truncated)")
}

/// One cycle's record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Episode {
    pub action: Action,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<ActionResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
}

impl Episode {
    pub fn is_complete(&self) -> bool {
        self.result.is_some()
    }
}

#[derive(Deserialize)]
struct StoredHistory {
    #[serde(default)]
    episodes: Vec<Episode>,
}

/// Ordered episodes plus a cursor at the first non-completed one.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "StoredHistory")]
pub struct ActionHistory {
    episodes: Vec<Episode>,
    #[serde(skip_deserializing)]
    cursor: usize,
}

impl From<StoredHistory> for ActionHistory {
    fn from(stored: StoredHistory) -> Self {
        // Recompute the cursor instead of trusting the file
        let cursor = stored
            .episodes
            .iter()
            .take_while(|e| e.is_complete())
            .count();
        let mut episodes = stored.episodes;
        episodes.truncate(cursor + 1);
        Self { episodes, cursor }
    }
}

impl ActionHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.episodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.episodes.is_empty()
    }

    /// Index of the in-progress episode, or `len()` when there is none.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn get(&self, index: usize) -> Option<&Episode> {
        self.episodes.get(index)
    }

    pub fn episodes(&self) -> &[Episode] {
        &self.episodes
    }

    /// The in-progress episode, if any.
    pub fn current(&self) -> Option<&Episode> {
        self.episodes.get(self.cursor)
    }

    pub fn has_incomplete(&self) -> bool {
        self.cursor < self.episodes.len()
    }

    /// Start a new in-progress episode. Returns its index.
    pub fn append(&mut self, action: Action) -> std::result::Result<usize, HistoryError> {
        if self.has_incomplete() {
            return Err(HistoryError::EpisodeInProgress { index: self.cursor });
        }
        self.episodes.push(Episode {
            action,
            result: None,
            summary: None,
        });
        Ok(self.cursor)
    }

    /// Complete the in-progress episode at `index`.
    ///
    /// Without an explicit summary the result's own summary is used.
    pub fn record_result(
        &mut self,
        index: usize,
        result: ActionResult,
        summary: Option<String>,
    ) -> std::result::Result<(), HistoryError> {
        if index != self.cursor || !self.has_incomplete() {
            return Err(HistoryError::NotInProgress { index });
        }
        let episode = &mut self.episodes[index];
        episode.summary = Some(summary.unwrap_or_else(|| result.summary()));
        episode.result = Some(result);
        self.cursor += 1;
        Ok(())
    }

    /// Drop the in-progress episode, if there is one.
    pub fn rewind_incomplete(&mut self) -> Option<Episode> {
        if self.has_incomplete() {
            self.episodes.pop()
        } else {
            None
        }
    }

    /// The last `n` completed episodes, oldest first.
    pub fn recent(&self, n: usize) -> &[Episode] {
        let start = self.cursor.saturating_sub(n);
        &self.episodes[start..self.cursor]
    }

    /// The action of the most recently completed episode.
    pub fn previous_action(&self) -> Option<&Action> {
        self.episodes[..self.cursor].last().map(|e| &e.action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn action(name: &str, value: Value) -> Action {
        Action::new(name, value.as_object().cloned().unwrap_or_default())
    }

    #[test]
    fn append_then_record_advances_cursor() {
        let mut history = ActionHistory::new();
        let idx = history.append(action("read_file", json!({"filename": "a.txt"}))).unwrap();
        assert_eq!(idx, 0);
        assert_eq!(history.cursor(), 0);
        assert!(history.current().is_some());

        history.record_result(idx, ActionResult::success("hello"), None).unwrap();
        assert_eq!(history.cursor(), 1);
        assert_eq!(history.len(), 1);
        assert!(history.current().is_none());
        assert_eq!(history.get(0).unwrap().summary.as_deref(), Some("`hello`"));
    }

    #[test]
    fn cannot_append_while_in_progress() {
        let mut history = ActionHistory::new();
        history.append(Action::none()).unwrap();
        let err = history.append(Action::none()).unwrap_err();
        assert_eq!(err, HistoryError::EpisodeInProgress { index: 0 });
    }

    #[test]
    fn completed_episodes_are_immutable() {
        let mut history = ActionHistory::new();
        let idx = history.append(action("a", json!({}))).unwrap();
        history.record_result(idx, ActionResult::success("first"), None).unwrap();

        let before = history.get(0).cloned();
        assert_eq!(
            history.record_result(0, ActionResult::success("second"), None).unwrap_err(),
            HistoryError::NotInProgress { index: 0 }
        );
        assert!(history.rewind_incomplete().is_none());
        assert_eq!(history.get(0).cloned(), before);
    }

    #[test]
    fn cursor_is_monotonic_and_bounded() {
        let mut history = ActionHistory::new();
        let mut last_cursor = 0;
        for i in 0..20 {
            let idx = history.append(action("step", json!({"i": i}))).unwrap();
            assert!(history.cursor() <= history.len());
            assert!(history.cursor() >= last_cursor);
            if i % 3 == 0 {
                history.rewind_incomplete();
            } else {
                history.record_result(idx, ActionResult::success(i), None).unwrap();
            }
            assert!(history.cursor() <= history.len());
            assert!(history.cursor() >= last_cursor);
            last_cursor = history.cursor();
        }
        assert_eq!(history.len(), history.cursor());
    }

    #[test]
    fn rewind_drops_only_in_progress_episode() {
        let mut history = ActionHistory::new();
        let idx = history.append(action("a", json!({}))).unwrap();
        history.record_result(idx, ActionResult::success("ok"), None).unwrap();
        history.append(action("b", json!({}))).unwrap();

        let dropped = history.rewind_incomplete().unwrap();
        assert_eq!(dropped.action.name.as_deref(), Some("b"));
        assert_eq!(history.len(), 1);
        assert_eq!(history.cursor(), 1);
    }

    #[test]
    fn recent_returns_completed_window_in_order() {
        let mut history = ActionHistory::new();
        for i in 0..5 {
            let idx = history.append(action("step", json!({"i": i}))).unwrap();
            history.record_result(idx, ActionResult::success(i), None).unwrap();
        }
        history.append(action("pending", json!({}))).unwrap();

        let window = history.recent(3);
        let indices: Vec<i64> = window.iter().map(|e| e.action.args["i"].as_i64().unwrap()).collect();
        assert_eq!(indices, vec![2, 3, 4]);
        assert_eq!(history.recent(50).len(), 5);
    }

    #[test]
    fn previous_action_ignores_in_progress() {
        let mut history = ActionHistory::new();
        assert!(history.previous_action().is_none());

        let idx = history.append(action("search", json!({"query": "x"}))).unwrap();
        history.record_result(idx, ActionResult::success("found"), None).unwrap();
        history.append(action("other", json!({}))).unwrap();

        assert_eq!(history.previous_action().unwrap().name.as_deref(), Some("search"));
    }

    #[test]
    fn same_invocation_compares_name_and_args_only() {
        let a = action("search", json!({"query": "x"}));
        let b = action("search", json!({"query": "x"})).with_thoughts(AgentThoughts {
            text: "different".into(),
            ..AgentThoughts::default()
        });
        let c = action("search", json!({"query": "y"}));
        assert!(a.same_invocation(&b));
        assert!(!a.same_invocation(&c));
    }

    #[test]
    fn has_command_treats_blank_as_none() {
        assert!(!Action::none().has_command());
        assert!(!action("  ", json!({})).has_command());
        assert!(action("finish", json!({})).has_command());
    }

    #[test]
    fn error_result_summary_includes_hint() {
        let result = ActionResult::from(CommandError::UnknownCommand {
            name: "fly_to_moon".into(),
            reason: None,
        });
        let summary = result.summary();
        assert!(summary.starts_with("UnknownCommandError"));
        assert!(summary.contains("fly_to_moon"));
        assert!(summary.contains("Do not try to use this command again."));
    }

    #[test]
    fn long_output_is_truncated_in_summary() {
        let result = ActionResult::success("x".repeat(2_000));
        assert!(result.summary().ends_with("... (truncated)`"));
    }

    #[test]
    fn deserialization_recomputes_cursor() {
        let mut history = ActionHistory::new();
        let idx = history.append(action("a", json!({}))).unwrap();
        history.record_result(idx, ActionResult::success("ok"), None).unwrap();
        history.append(action("b", json!({}))).unwrap();

        let json = serde_json::to_string(&history).unwrap();
        let restored: ActionHistory = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.cursor(), 1);
        assert_eq!(restored.len(), 2);
        assert!(restored.has_incomplete());
    }

    #[test]
    fn action_format_call() {
        let a = action("write_file", json!({"filename": "out.txt"}));
        assert_eq!(a.format_call(), "write_file(filename=\"out.txt\")");
    }
}
