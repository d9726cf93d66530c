//! The `finish` command ends the run.
//!
//! It does nothing itself; the agent loop stops after recording it and
//! reports the returned reason.

use serde_json::Value;
use thinkloop_core::command::{Command, FINISH_COMMAND, handler_fn};
use thinkloop_core::schema::JsonSchema;

use crate::str_arg;

pub fn finish() -> Command {
    Command::new(
        FINISH_COMMAND,
        "Use this to shut down once you have completed your task, or when there are insurmountable problems that make it impossible for you to finish your task",
        handler_fn(|args, _ctx| async move {
            str_arg(&args, FINISH_COMMAND, "reason").map(|reason| Value::String(reason.to_string()))
        }),
    )
    .with_parameter(
        "reason",
        JsonSchema::string()
            .describe("A summary to the user of how the goals were accomplished")
            .required(),
    )
}
