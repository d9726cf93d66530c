//! Terminal user interaction: shows the agent's thoughts, asks for
//! authorization, and answers `ask_user` questions from stdin.

use async_trait::async_trait;
use thinkloop_core::history::Action;
use thinkloop_core::interaction::{Authorization, UserInteraction};
use tokio::io::{self, AsyncBufReadExt, BufReader, Lines, Stdin};
use tokio::sync::Mutex;
use tracing::warn;

pub struct ConsoleInteraction {
    lines: Mutex<Lines<BufReader<Stdin>>>,
}

impl ConsoleInteraction {
    pub fn new() -> Self {
        Self {
            lines: Mutex::new(BufReader::new(io::stdin()).lines()),
        }
    }

    /// Print `prompt` and read one line. `None` on end of input.
    async fn read_line(&self, prompt: &str) -> Option<String> {
        print!("{prompt}");
        use std::io::Write;
        let _ = std::io::stdout().flush();

        match self.lines.lock().await.next_line().await {
            Ok(line) => line,
            Err(e) => {
                warn!(error = %e, "Failed to read from stdin");
                None
            }
        }
    }
}

impl Default for ConsoleInteraction {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl UserInteraction for ConsoleInteraction {
    async fn authorize(&self, action: &Action) -> Authorization {
        let name = action.name.as_deref().unwrap_or("the agent");
        let prompt = format!(
            "  Enter 'y' to authorise the command, 'y -N' to run N commands without asking, \
             'n' to exit, or type feedback for {name}\n  Input: "
        );
        match self.read_line(&prompt).await {
            Some(line) => Authorization::parse(&line),
            None => Authorization::Exit,
        }
    }

    async fn ask(&self, question: &str) -> Option<String> {
        println!();
        println!("  Question: {question}");
        self.read_line("  Answer: ").await
    }

    async fn present(&self, ai_name: &str, action: &Action) {
        println!("{}", render_action(ai_name, action));
    }
}

/// The thoughts and next action block printed before each command.
pub fn render_action(ai_name: &str, action: &Action) -> String {
    let thoughts = &action.thoughts;
    let mut out = String::new();

    let mut field = |label: &str, text: &str| {
        if !text.trim().is_empty() {
            out.push_str(&format!("  {label}: {}\n", text.trim()));
        }
    };
    field(&format!("{} THOUGHTS", ai_name.to_uppercase()), &thoughts.text);
    field("REASONING", &thoughts.reasoning);
    field("CRITICISM", &thoughts.self_criticism);
    field("SPEAK", &thoughts.speak);

    if !thoughts.plan.trim().is_empty() {
        out.push_str("  PLAN:\n");
        for line in thoughts.plan.lines().filter(|l| !l.trim().is_empty()) {
            out.push_str(&format!("    {}\n", line.trim()));
        }
    }

    if action.has_command() {
        out.push_str(&format!("  NEXT ACTION: {}", action.format_call()));
    } else {
        out.push_str("  NEXT ACTION: none");
    }
    out
}
