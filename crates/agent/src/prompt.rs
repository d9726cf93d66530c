//! Prompt construction.
//!
//! One prompt per think step:
//! 1. System message: identity, constraints, resources, commands, best
//!    practices, goals
//! 2. Context section, when a context provider has open items
//! 3. Progress section: the recent history window, one line per cycle
//! 4. The request for exactly one command in the fixed response shape
//! 5. Corrective notes from failed parse attempts, if any
//!
//! The same inputs always produce the same messages.

use serde_json::json;
use thinkloop_core::agent::{AIDirectives, AIProfile};
use thinkloop_core::command::Command;
use thinkloop_core::history::{ActionHistory, Episode};
use thinkloop_core::message::Message;
use thinkloop_core::provider::FunctionDefinition;

/// What the model is asked to answer with.
pub struct Prompt {
    pub messages: Vec<Message>,
    /// Non-empty only in function-calling mode
    pub functions: Vec<FunctionDefinition>,
}

/// Inputs for a single prompt.
pub struct PromptInput<'a> {
    pub profile: &'a AIProfile,
    pub directives: &'a AIDirectives,
    /// Available commands, in registry order
    pub commands: &'a [&'a Command],
    pub history: &'a ActionHistory,
    /// Rendered body of the `## Context` section
    pub context: Option<String>,
    /// Notes about earlier unusable replies in this think step
    pub corrections: &'a [String],
}

#[derive(Debug, Clone)]
pub struct PromptBuilder {
    use_functions: bool,
    history_window: usize,
}

impl Default for PromptBuilder {
    fn default() -> Self {
        Self {
            use_functions: false,
            history_window: 10,
        }
    }
}

impl PromptBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer commands as functions instead of listing them in the prompt.
    pub fn with_functions(mut self, use_functions: bool) -> Self {
        self.use_functions = use_functions;
        self
    }

    /// How many completed episodes to show.
    pub fn with_history_window(mut self, episodes: usize) -> Self {
        self.history_window = episodes;
        self
    }

    pub fn build(&self, input: &PromptInput<'_>) -> Prompt {
        let mut messages = vec![Message::system(self.system_prompt(input))];

        if let Some(context) = &input.context {
            messages.push(Message::system(format!("## Context\n{context}")));
        }

        let recent = input.history.recent(self.history_window);
        if !recent.is_empty() {
            let first_cycle = input.history.cursor() - recent.len() + 1;
            messages.push(Message::system(render_progress(recent, first_cycle)));
        }

        messages.push(Message::user(self.response_request()));

        for note in input.corrections {
            messages.push(Message::user(format!(
                "Your previous response could not be used: {note}\n\
                 Respond again with exactly one JSON object in the format described above."
            )));
        }

        let functions = if self.use_functions {
            input.commands.iter().map(|c| c.to_definition()).collect()
        } else {
            Vec::new()
        };

        Prompt { messages, functions }
    }

    fn system_prompt(&self, input: &PromptInput<'_>) -> String {
        let profile = input.profile;
        let directives = input.directives;

        let mut out = format!(
            "You are {}, {}.\n\n\
             Your decisions must always be made independently without seeking user assistance. \
             Play to your strengths as an LLM and pursue simple strategies with no legal complications.",
            profile.ai_name, profile.ai_role
        );

        push_section(
            &mut out,
            "Constraints",
            "You operate within the following constraints:",
            &directives.constraints,
        );
        push_section(
            &mut out,
            "Resources",
            "You can leverage access to the following resources:",
            &directives.resources,
        );

        if !self.use_functions {
            let listed: Vec<String> = input.commands.iter().map(|c| c.signature()).collect();
            push_section(
                &mut out,
                "Commands",
                "These are the ONLY commands you can use. \
                 Any action you perform must be possible through one of these commands:",
                &listed,
            );
        }

        push_section(&mut out, "Best practices", "", &directives.best_practices);
        push_section(
            &mut out,
            "Goals",
            "For your task, you must fulfill the following goals:",
            &profile.goals,
        );
        out
    }

    fn response_request(&self) -> String {
        let thoughts = json!({
            "observations": "Relevant observations from your last action (if any)",
            "text": "Thoughts",
            "reasoning": "Reasoning behind the thoughts",
            "self_criticism": "Constructive self-criticism",
            "plan": "Short markdown-style bullet list that conveys the long-term plan",
            "speak": "Summary of thoughts, to say to user"
        });

        if self.use_functions {
            let format = json!({ "thoughts": thoughts });
            format!(
                "Determine exactly one command to use next based on the given goals \
                 and the progress you have made so far. Call it as a function, and put \
                 your thoughts in the message content using this JSON format:\n```json\n{}\n```",
                pretty(&format)
            )
        } else {
            let format = json!({
                "thoughts": thoughts,
                "command": {
                    "name": "command name",
                    "args": { "arg name": "value" }
                }
            });
            format!(
                "Determine exactly one command to use next based on the given goals \
                 and the progress you have made so far, and respond with one JSON object \
                 in this format:\n```json\n{}\n```",
                pretty(&format)
            )
        }
    }
}

fn pretty(value: &serde_json::Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}

fn push_section(out: &mut String, title: &str, intro: &str, items: &[String]) {
    if items.is_empty() {
        return;
    }
    out.push_str(&format!("\n\n## {title}\n"));
    if !intro.is_empty() {
        out.push_str(intro);
        out.push('\n');
    }
    for (i, item) in items.iter().enumerate() {
        out.push_str(&format!("{}. {}\n", i + 1, item));
    }
    // Sections are separated by a blank line, not a trailing newline
    while out.ends_with('\n') {
        out.pop();
    }
}

/// `Cycle N: name(args) -> summary`, oldest first.
fn render_progress(episodes: &[Episode], first_cycle: usize) -> String {
    let mut out = String::from("## Progress\n");
    for (i, episode) in episodes.iter().enumerate() {
        let summary = episode.summary.as_deref().unwrap_or("(no result)");
        let call = if episode.action.has_command() {
            episode.action.format_call()
        } else {
            "no command".to_string()
        };
        out.push_str(&format!("Cycle {}: {call} -> {summary}\n", first_cycle + i));
    }
    out.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;
    use thinkloop_core::command::handler_fn;
    use thinkloop_core::error::CommandError;
    use thinkloop_core::history::{Action, ActionResult};
    use thinkloop_core::schema::JsonSchema;

    fn commands() -> Vec<Command> {
        vec![
            Command::new("write_file", "Write a file", handler_fn(|_, _| async { Ok(Value::Null) }))
                .with_parameter("filename", JsonSchema::string().required())
                .with_parameter("contents", JsonSchema::string().required()),
            Command::new("finish", "Finish the task", handler_fn(|_, _| async { Ok(Value::Null) }))
                .with_parameter("reason", JsonSchema::string().required()),
        ]
    }

    fn profile() -> AIProfile {
        AIProfile {
            ai_name: "Writer".into(),
            ai_role: "an assistant that writes files".into(),
            goals: vec!["Write 'Washington' to output.txt".into()],
        }
    }

    fn record(history: &mut ActionHistory, action: Action, result: ActionResult) {
        let idx = history.append(action).unwrap();
        history.record_result(idx, result, None).unwrap();
    }

    fn args(value: serde_json::Value) -> thinkloop_core::CommandArgs {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn system_prompt_has_every_section() {
        let cmds = commands();
        let refs: Vec<&Command> = cmds.iter().collect();
        let history = ActionHistory::new();
        let directives = AIDirectives::standard();
        let profile = profile();
        let prompt = PromptBuilder::new().build(&PromptInput {
            profile: &profile,
            directives: &directives,
            commands: &refs,
            history: &history,
            context: None,
            corrections: &[],
        });

        assert_eq!(prompt.messages.len(), 2);
        let system = &prompt.messages[0].content;
        assert!(system.starts_with("You are Writer, an assistant that writes files."));
        assert!(system.contains("## Constraints"));
        assert!(system.contains("## Resources"));
        assert!(system.contains("## Best practices"));
        assert!(system.contains("1. write_file: Write a file. Params: (filename: string, contents: string)"));
        assert!(system.contains("2. finish: Finish the task"));
        assert!(system.contains("## Goals\nFor your task, you must fulfill the following goals:\n1. Write 'Washington' to output.txt"));
        assert!(prompt.messages[1].content.contains("\"command\""));
        assert!(prompt.functions.is_empty());
    }

    #[test]
    fn progress_lists_recent_window_with_cycle_numbers() {
        let cmds = commands();
        let refs: Vec<&Command> = cmds.iter().collect();
        let mut history = ActionHistory::new();
        for i in 0..4 {
            record(
                &mut history,
                Action::new("write_file", args(serde_json::json!({"filename": format!("{i}.txt")}))),
                ActionResult::success("ok"),
            );
        }
        record(
            &mut history,
            Action::new("fly_to_moon", Default::default()),
            CommandError::UnknownCommand { name: "fly_to_moon".into(), reason: None }.into(),
        );

        let directives = AIDirectives::default();
        let profile = profile();
        let prompt = PromptBuilder::new().with_history_window(2).build(&PromptInput {
            profile: &profile,
            directives: &directives,
            commands: &refs,
            history: &history,
            context: None,
            corrections: &[],
        });

        let progress = prompt
            .messages
            .iter()
            .find(|m| m.content.starts_with("## Progress"))
            .unwrap();
        assert!(!progress.content.contains("Cycle 3"));
        assert!(progress.content.contains("Cycle 4: write_file(filename=\"3.txt\") -> `ok`"));
        assert!(progress.content.contains("Cycle 5: fly_to_moon() -> UnknownCommandError"));
    }

    #[test]
    fn context_and_corrections_are_included() {
        let history = ActionHistory::new();
        let directives = AIDirectives::default();
        let profile = profile();
        let corrections = vec!["No JSON object found in the response".to_string()];
        let prompt = PromptBuilder::new().build(&PromptInput {
            profile: &profile,
            directives: &directives,
            commands: &[],
            history: &history,
            context: Some("1. notes.md".into()),
            corrections: &corrections,
        });

        assert_eq!(prompt.messages[1].content, "## Context\n1. notes.md");
        let last = prompt.messages.last().unwrap();
        assert!(last.content.contains("No JSON object found"));
    }

    #[test]
    fn function_mode_sends_definitions_instead_of_listing() {
        let cmds = commands();
        let refs: Vec<&Command> = cmds.iter().collect();
        let history = ActionHistory::new();
        let directives = AIDirectives::default();
        let profile = profile();
        let prompt = PromptBuilder::new().with_functions(true).build(&PromptInput {
            profile: &profile,
            directives: &directives,
            commands: &refs,
            history: &history,
            context: None,
            corrections: &[],
        });

        assert_eq!(prompt.functions.len(), 2);
        assert_eq!(prompt.functions[0].name, "write_file");
        assert!(!prompt.messages[0].content.contains("## Commands"));
        assert!(!prompt.messages.last().unwrap().content.contains("\"command\""));
    }

    #[test]
    fn identical_inputs_build_identical_prompts() {
        let cmds = commands();
        let refs: Vec<&Command> = cmds.iter().collect();
        let mut history = ActionHistory::new();
        record(&mut history, Action::new("finish", Default::default()), ActionResult::success("x"));
        let directives = AIDirectives::standard();
        let profile = profile();
        let input = PromptInput {
            profile: &profile,
            directives: &directives,
            commands: &refs,
            history: &history,
            context: None,
            corrections: &[],
        };
        let builder = PromptBuilder::new();
        assert_eq!(builder.build(&input).messages, builder.build(&input).messages);
    }
}
