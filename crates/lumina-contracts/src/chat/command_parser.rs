use std::collections::BTreeMap;

use serde_json::Value;

use super::command_registry::{CommandSpec, NO_ARG_COMMANDS, PATH_COMMANDS, RAW_ARG_COMMANDS};

/// One line of chat-loop input: a slash command or a message for the
/// assistant (`action == "chat"`).
#[derive(Debug, Clone, PartialEq)]
pub struct ChatCommand {
    pub action: String,
    pub raw: String,
    pub message: Option<String>,
    pub command_args: BTreeMap<String, Value>,
}

impl ChatCommand {
    fn new(action: &str, raw: &str) -> Self {
        Self {
            action: action.to_string(),
            raw: raw.to_string(),
            message: None,
            command_args: BTreeMap::new(),
        }
    }

    pub fn arg_str(&self, key: &str) -> Option<&str> {
        self.command_args
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
    }
}

fn find_action(command: &str, specs: &[CommandSpec]) -> Option<&'static str> {
    specs
        .iter()
        .find(|spec| spec.command == command)
        .map(|spec| spec.action)
}

fn parse_single_path_arg(arg: &str) -> String {
    if arg.trim().is_empty() {
        return String::new();
    }
    match shell_words::split(arg) {
        Ok(parts) => parts
            .into_iter()
            .filter(|value| !value.is_empty())
            .collect::<Vec<String>>()
            .join(" "),
        Err(_) => arg.trim().to_string(),
    }
}

pub fn parse_command(text: &str) -> ChatCommand {
    let raw_trimmed = text.trim();
    if raw_trimmed.is_empty() {
        return ChatCommand::new("noop", text);
    }

    if let Some(slash_tail) = raw_trimmed.strip_prefix('/') {
        let command_len = slash_tail
            .chars()
            .take_while(|ch| ch.is_ascii_alphanumeric() || *ch == '_')
            .count();
        if command_len > 0 {
            let command = slash_tail[..command_len].to_ascii_lowercase();
            let arg = slash_tail[command_len..].trim();

            if let Some(action) = find_action(&command, PATH_COMMANDS) {
                let mut parsed = ChatCommand::new(action, text);
                parsed.command_args.insert(
                    "path".to_string(),
                    Value::String(parse_single_path_arg(arg)),
                );
                return parsed;
            }

            if let Some(action) = find_action(&command, RAW_ARG_COMMANDS) {
                let mut parsed = ChatCommand::new(action, text);
                parsed
                    .command_args
                    .insert("style".to_string(), Value::String(arg.to_string()));
                return parsed;
            }

            if let Some(action) = find_action(&command, NO_ARG_COMMANDS) {
                return ChatCommand::new(action, text);
            }

            let mut parsed = ChatCommand::new("unknown", text);
            parsed
                .command_args
                .insert("command".to_string(), Value::String(command));
            parsed
                .command_args
                .insert("arg".to_string(), Value::String(arg.to_string()));
            return parsed;
        }
    }

    let mut parsed = ChatCommand::new("chat", text);
    parsed.message = Some(raw_trimmed.to_string());
    parsed
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::parse_command;

    #[test]
    fn blank_input_is_noop() {
        assert_eq!(parse_command("   ").action, "noop");
    }

    #[test]
    fn plain_text_is_a_chat_message() {
        let parsed = parse_command("  make the sofa green  ");
        assert_eq!(parsed.action, "chat");
        assert_eq!(parsed.message.as_deref(), Some("make the sofa green"));
    }

    #[test]
    fn upload_accepts_quoted_paths() {
        let parsed = parse_command("/upload \"/tmp/living room.jpg\"");
        assert_eq!(parsed.action, "upload");
        assert_eq!(parsed.command_args["path"], json!("/tmp/living room.jpg"));

        let alias = parse_command("/open room.png");
        assert_eq!(alias.action, "upload");
        assert_eq!(alias.arg_str("path"), Some("room.png"));
    }

    #[test]
    fn style_keeps_multi_word_names() {
        let parsed = parse_command("/style Art Deco");
        assert_eq!(parsed.action, "select_style");
        assert_eq!(parsed.arg_str("style"), Some("Art Deco"));
        assert_eq!(parse_command("/style").arg_str("style"), None);
    }

    #[test]
    fn no_arg_commands_and_aliases() {
        assert_eq!(parse_command("/styles").action, "list_styles");
        assert_eq!(parse_command("/RESET").action, "reset");
        assert_eq!(parse_command("/new").action, "reset");
        assert_eq!(parse_command("/exit").action, "quit");
        assert_eq!(parse_command("/save").action, "save");
    }

    #[test]
    fn unknown_command_keeps_its_argument() {
        let parsed = parse_command("/magic foo bar");
        assert_eq!(parsed.action, "unknown");
        assert_eq!(parsed.command_args["command"], json!("magic"));
        assert_eq!(parsed.command_args["arg"], json!("foo bar"));
    }

    #[test]
    fn bare_slash_is_sent_as_chat() {
        let parsed = parse_command("/ what?");
        assert_eq!(parsed.action, "chat");
        assert_eq!(parsed.message.as_deref(), Some("/ what?"));
    }
}
