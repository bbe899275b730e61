mod command_parser;
mod command_registry;
mod router;

pub use command_parser::{parse_command, ChatCommand};
pub use command_registry::CHAT_HELP_COMMANDS;
pub use router::{
    classify_response, AnswerResult, TurnOutcome, DEFAULT_CITATION_TITLE, EDIT_IMAGE_FUNCTION,
    EDIT_PROMPT_ARG, FALLBACK_ANSWER_TEXT,
};
