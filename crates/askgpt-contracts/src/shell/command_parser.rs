use super::command_registry::{CommandKind, COMMANDS};

/// One line of shell input, classified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShellCommand {
    Noop,
    /// Plain text: another line of the pending question.
    Append(String),
    Attach(Vec<String>),
    ListImages,
    Clear,
    Send(Option<String>),
    SetModel(String),
    Help,
    Quit,
    Unknown { command: String, arg: String },
}

fn find_kind(command: &str) -> Option<CommandKind> {
    COMMANDS
        .iter()
        .find(|spec| spec.command == command)
        .map(|spec| spec.kind)
}

fn parse_path_args(arg: &str) -> Vec<String> {
    if arg.trim().is_empty() {
        return Vec::new();
    }
    match shell_words::split(arg) {
        Ok(parts) => parts
            .into_iter()
            .filter(|value| !value.is_empty())
            .collect(),
        Err(_) => arg
            .split_whitespace()
            .map(str::to_string)
            .filter(|value| !value.is_empty())
            .collect(),
    }
}

pub fn parse_shell_line(text: &str) -> ShellCommand {
    let line = text.trim_end_matches(['\r', '\n']);
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return ShellCommand::Noop;
    }

    let Some(slash_tail) = trimmed.strip_prefix('/') else {
        return ShellCommand::Append(line.to_string());
    };
    let command_len = slash_tail
        .chars()
        .take_while(|ch| ch.is_ascii_alphanumeric() || *ch == '_')
        .count();
    if command_len == 0 {
        return ShellCommand::Append(line.to_string());
    }

    let command = slash_tail[..command_len].to_ascii_lowercase();
    let arg = slash_tail[command_len..].trim();

    match find_kind(&command) {
        Some(CommandKind::Attach) => ShellCommand::Attach(parse_path_args(arg)),
        Some(CommandKind::ListImages) => ShellCommand::ListImages,
        Some(CommandKind::Clear) => ShellCommand::Clear,
        Some(CommandKind::Send) => {
            ShellCommand::Send(Some(arg.to_string()).filter(|value| !value.is_empty()))
        }
        Some(CommandKind::SetModel) => ShellCommand::SetModel(arg.to_string()),
        Some(CommandKind::Help) => ShellCommand::Help,
        Some(CommandKind::Quit) => ShellCommand::Quit,
        None => ShellCommand::Unknown {
            command,
            arg: arg.to_string(),
        },
    }
}
