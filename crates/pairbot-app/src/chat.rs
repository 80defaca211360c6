//! Chat participants
//!
//! Two participants can be addressed from the host: `@superduper` forwards
//! the prompt to the worker's question endpoint together with the active
//! document, and `@review-bot` accepts anything and answers nothing.

use std::fmt;

/// A chat participant the host can address with `@handle`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Participant {
    Superduper,
    ReviewBot,
}

impl Participant {
    pub const ALL: [Participant; 2] = [Participant::Superduper, Participant::ReviewBot];

    pub fn handle(&self) -> &'static str {
        match self {
            Participant::Superduper => "superduper",
            Participant::ReviewBot => "review-bot",
        }
    }

    pub fn from_handle(handle: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.handle() == handle)
    }

    /// Whether a request to this participant produces an answer
    pub fn answers(&self) -> bool {
        matches!(self, Participant::Superduper)
    }
}

impl fmt::Display for Participant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.handle())
    }
}

/// One chat request typed by the user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatRequest {
    pub participant: Participant,
    pub prompt: String,
}

/// Parse `@handle prompt`, or `ask prompt` as shorthand for `@superduper`.
///
/// Returns `None` for lines that are not chat requests or name an unknown
/// participant.
pub fn parse_chat_line(line: &str) -> Option<ChatRequest> {
    let line = line.trim();

    if let Some(rest) = line.strip_prefix('@') {
        let (handle, prompt) = rest.split_once(char::is_whitespace).unwrap_or((rest, ""));
        let participant = Participant::from_handle(handle)?;
        return Some(ChatRequest {
            participant,
            prompt: prompt.trim().to_string(),
        });
    }

    let (command, prompt) = line.split_once(char::is_whitespace)?;
    if command == "ask" && !prompt.trim().is_empty() {
        return Some(ChatRequest {
            participant: Participant::Superduper,
            prompt: prompt.trim().to_string(),
        });
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ask_shorthand() {
        let req = parse_chat_line("ask why is this slow?").unwrap();
        assert_eq!(req.participant, Participant::Superduper);
        assert_eq!(req.prompt, "why is this slow?");
    }

    #[test]
    fn test_parse_handles() {
        let req = parse_chat_line("@superduper  explain  ").unwrap();
        assert_eq!(req.participant, Participant::Superduper);
        assert_eq!(req.prompt, "explain");

        let req = parse_chat_line("@review-bot anything at all").unwrap();
        assert_eq!(req.participant, Participant::ReviewBot);
        assert!(!req.participant.answers());
    }

    #[test]
    fn test_parse_handle_without_prompt() {
        let req = parse_chat_line("@review-bot").unwrap();
        assert_eq!(req.prompt, "");
    }

    #[test]
    fn test_parse_rejects_other_lines() {
        assert!(parse_chat_line("@cat meow").is_none());
        assert!(parse_chat_line("ask").is_none());
        assert!(parse_chat_line("ask   ").is_none());
        assert!(parse_chat_line("start").is_none());
        assert!(parse_chat_line("").is_none());
    }

    #[test]
    fn test_display() {
        assert_eq!(Participant::ReviewBot.to_string(), "@review-bot");
        assert_eq!(
            Participant::from_handle("superduper"),
            Some(Participant::Superduper)
        );
    }
}
