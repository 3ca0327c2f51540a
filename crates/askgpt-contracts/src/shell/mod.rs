mod command_parser;
mod command_registry;

pub use command_parser::{parse_shell_line, ShellCommand};
pub use command_registry::SHELL_HELP_COMMANDS;
