//! Slash commands answered directly, without a generation

use crate::suggest::{SuggestionMatcher, format_lookup};
use crate::topic;

/// Status line for `/start`
pub const START_TEXT: &str = "Webhook online \u{2705}  Streaming model replies. Send me a message.";

/// Command list for `/help`
pub const HELP_TEXT: &str = "/start - status\n/help - this help\n/buy <keywords> - quick gear links\n/topics - example scenarios";

const BUY_USAGE: &str = "Usage: /buy <keywords>  e.g., /buy radio";
const BUY_NO_MATCH: &str = "No matching items yet, try different keywords.";

/// A recognized bot command
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Start,
    Help,
    /// Explicit catalog lookup; keywords may be empty
    Buy(String),
    Topics,
    Unknown(String),
}

impl Command {
    /// Parse a message starting with `/`
    ///
    /// Accepts the `/cmd@BotName` form used in group chats.
    #[must_use]
    pub fn parse(text: &str) -> Option<Self> {
        let text = text.trim();
        let rest = text.strip_prefix('/')?;

        let (head, args) = rest
            .split_once(char::is_whitespace)
            .map_or((rest, ""), |(h, a)| (h, a.trim()));
        let name = head.split('@').next().unwrap_or(head).to_lowercase();

        Some(match name.as_str() {
            "start" => Self::Start,
            "help" => Self::Help,
            "buy" => Self::Buy(args.to_string()),
            "topics" => Self::Topics,
            _ => Self::Unknown(name),
        })
    }

    /// Reply text for this command
    #[must_use]
    pub fn reply(&self, matcher: &SuggestionMatcher) -> String {
        match self {
            Self::Start => START_TEXT.to_string(),
            Self::Help => HELP_TEXT.to_string(),
            Self::Topics => topic::topics_text(),
            Self::Buy(keywords) if keywords.is_empty() => BUY_USAGE.to_string(),
            Self::Buy(keywords) => {
                let items = matcher.lookup(keywords);
                if items.is_empty() {
                    BUY_NO_MATCH.to_string()
                } else {
                    format_lookup(&items)
                }
            }
            Self::Unknown(name) => format!("Unknown command /{name}.\n\n{HELP_TEXT}"),
        }
    }
}
