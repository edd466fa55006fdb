//! Prefix commands understood by the bot (`!dog <question>`, `!stats`, `!help`).

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Commands {
    pub chat: String,
    pub stats: String,
    pub help: String,
}

impl Default for Commands {
    fn default() -> Self {
        Self {
            chat: "!dog".to_string(),
            stats: "!stats".to_string(),
            help: "!help".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    /// Forward the (command-stripped) prompt to the model.
    Chat(String),
    Stats,
    Help,
    /// Ordinary channel chatter; remembered but not answered.
    Ignored,
}

impl Commands {
    /// Classify a message. Matching is case-insensitive and the chat command
    /// wins over the others.
    pub fn parse(&self, text: &str) -> Command {
        let lower = text.trim_start().to_lowercase();

        if starts_with_command(&lower, &self.chat) {
            return Command::Chat(self.strip_command(text));
        }
        if starts_with_command(&lower, &self.stats) {
            return Command::Stats;
        }
        if starts_with_command(&lower, &self.help) {
            return Command::Help;
        }
        Command::Ignored
    }

    /// Remove a leading chat command and surrounding whitespace.
    pub fn strip_command(&self, text: &str) -> String {
        let trimmed = text.trim();
        let prefix_len = self.chat.len();
        match trimmed.get(..prefix_len) {
            Some(head) if head.eq_ignore_ascii_case(&self.chat) => {
                trimmed[prefix_len..].trim().to_string()
            }
            _ => trimmed.to_string(),
        }
    }
}

fn starts_with_command(lower: &str, command: &str) -> bool {
    !command.is_empty() && lower.starts_with(&command.to_lowercase())
}
