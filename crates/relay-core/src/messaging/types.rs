use crate::domain::{ChatId, MessageId, UserId};

/// Incoming text update, already stripped of Telegram specifics.
#[derive(Clone, Debug)]
pub struct TextMessage {
    pub chat_id: ChatId,
    /// The user's message; the reply is threaded under it.
    pub message_id: Option<MessageId>,
    pub user_id: UserId,
    pub username: Option<String>,
    pub text: String,
}

/// Bot commands understood by the relay.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    Start,
    /// Forget everything (hard delete).
    Reset,
    /// Start over but keep the archived history.
    New,
}

impl Command {
    /// Parse `/cmd` or `/cmd@botname args...`. Returns `None` for unknown commands.
    ///
    /// A bare `start` (no slash) is also accepted as the greeting.
    pub fn parse(text: &str) -> Option<Self> {
        if text.trim().eq_ignore_ascii_case("start") {
            return Some(Command::Start);
        }
        let first = text.split_whitespace().next()?;
        let name = first.strip_prefix('/')?.split('@').next()?.to_lowercase();
        match name.as_str() {
            "start" => Some(Command::Start),
            "reset" => Some(Command::Reset),
            "new" => Some(Command::New),
            _ => None,
        }
    }
}

/// Capabilities / limits of a messenger implementation.
#[derive(Clone, Copy, Debug)]
pub struct MessagingCapabilities {
    pub supports_edit: bool,
    pub supports_chat_actions: bool,
    pub max_message_len: usize,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_commands_with_bot_suffix_and_args() {
        assert_eq!(Command::parse("/start"), Some(Command::Start));
        assert_eq!(Command::parse("/Reset@relay_bot now"), Some(Command::Reset));
        assert_eq!(Command::parse("  /new  "), Some(Command::New));
        assert_eq!(Command::parse("/unknown"), None);
        assert_eq!(Command::parse("Start"), Some(Command::Start));
        assert_eq!(Command::parse("start over please"), None);
        assert_eq!(Command::parse(""), None);
    }
}
