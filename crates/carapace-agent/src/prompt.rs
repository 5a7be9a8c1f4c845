use std::path::PathBuf;
use tracing::warn;

const DEFAULT_PROMPT: &str = "You are Carapace, a helpful AI assistant. \
    You answer concisely and accurately. When tools are available, use them \
    for any task that needs live data or side effects rather than guessing. \
    Always confirm with the user before destructive actions.";

/// System-prompt source policy: explicit config override, else the
/// workspace IDENTITY.md, else the built-in default.
pub struct SystemPromptBuilder {
    override_prompt: Option<String>,
    workspace_dir: PathBuf,
}

impl SystemPromptBuilder {
    pub fn new(override_prompt: Option<String>) -> Self {
        let workspace_dir = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".carapace")
            .join("workspace");
        Self {
            override_prompt,
            workspace_dir,
        }
    }

    pub fn with_workspace_dir(mut self, dir: PathBuf) -> Self {
        self.workspace_dir = dir;
        self
    }

    pub fn build(&self) -> String {
        if let Some(ref prompt) = self.override_prompt {
            return prompt.clone();
        }

        let identity = self.workspace_dir.join("IDENTITY.md");
        if identity.exists() {
            match std::fs::read_to_string(&identity) {
                Ok(text) => return text,
                Err(e) => {
                    warn!(path = %identity.display(), error = %e, "failed to read IDENTITY.md, using default prompt");
                }
            }
        }

        DEFAULT_PROMPT.to_string()
    }
}
