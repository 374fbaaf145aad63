use tracing::{info, warn};

/// Built-in system instruction used when no prompt file is configured.
pub const DEFAULT_SYSTEM_PROMPT: &str = "\
You explain how this application works: its architecture, data flow and the
technologies it uses. Help the user understand or modify the system below.

- An axum HTTP server streams chat replies from a hosted language model to the
  browser as server-sent events.
- Each chat session has an opaque id and lives either as a JSON file in a
  chats directory or as a row in a SQLite `chats` table
  (id, messages as JSON, title, last_modified), chosen by configuration.
- After each streamed reply the whole transcript is saved with an upsert keyed
  by id; the last write wins.
- A session title is derived from the first user message, and the home page
  lists sessions newest first.
- A separate endpoint sends an image plus an instruction to an image model and
  returns the edited image.

Keep explanations clear, accurate and grounded in this structure. When asked
about extensions, give practical next steps.";

/// System prompt text: the configured file if readable, else the default.
pub fn load_system_prompt(path: Option<&str>) -> String {
    let Some(path) = path else {
        return DEFAULT_SYSTEM_PROMPT.to_string();
    };
    match std::fs::read_to_string(path) {
        Ok(text) if !text.trim().is_empty() => {
            info!(path, "loaded system prompt");
            text
        }
        Ok(_) => {
            warn!(path, "system prompt file is empty, using default");
            DEFAULT_SYSTEM_PROMPT.to_string()
        }
        Err(e) => {
            warn!(path, error = %e, "failed to load system prompt, using default");
            DEFAULT_SYSTEM_PROMPT.to_string()
        }
    }
}
