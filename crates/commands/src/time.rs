use serde_json::Value;
use thinkloop_core::command::{Command, handler_fn};

pub fn get_current_datetime() -> Command {
    Command::new(
        "get_current_datetime",
        "Get the current date and time",
        handler_fn(|_args, _ctx| async {
            let now = chrono::Utc::now();
            Ok(Value::String(format!(
                "The current date and time is {}",
                now.format("%Y-%m-%d %H:%M:%S UTC")
            )))
        }),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use thinkloop_core::command::CommandArgs;

    use crate::testing::{memory_ctx, run};

    #[tokio::test]
    async fn reports_utc_time() {
        let (_ws, ctx) = memory_ctx();
        let out = run(get_current_datetime(), CommandArgs::new(), ctx).await.unwrap();
        let text = out.as_str().unwrap();
        assert!(text.starts_with("The current date and time is "));
        assert!(text.ends_with("UTC"));
    }
}
