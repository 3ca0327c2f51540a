#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum CommandKind {
    Attach,
    ListImages,
    Clear,
    Send,
    SetModel,
    Help,
    Quit,
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct CommandSpec {
    pub command: &'static str,
    pub kind: CommandKind,
}

pub(crate) const COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        command: "attach",
        kind: CommandKind::Attach,
    },
    CommandSpec {
        command: "images",
        kind: CommandKind::ListImages,
    },
    CommandSpec {
        command: "clear",
        kind: CommandKind::Clear,
    },
    CommandSpec {
        command: "send",
        kind: CommandKind::Send,
    },
    CommandSpec {
        command: "model",
        kind: CommandKind::SetModel,
    },
    CommandSpec {
        command: "help",
        kind: CommandKind::Help,
    },
    CommandSpec {
        command: "quit",
        kind: CommandKind::Quit,
    },
    CommandSpec {
        command: "exit",
        kind: CommandKind::Quit,
    },
];

pub const SHELL_HELP_COMMANDS: &[(&str, &str)] = &[
    ("/attach <paths...>", "attach jpg/jpeg/png images (quote paths with spaces)"),
    ("/images", "list attached images"),
    ("/clear", "drop the pending question and images"),
    ("/send [text]", "send the question (optionally appending text first)"),
    ("/model <id>", "switch the chat model"),
    ("/help", "show this list"),
    ("/quit", "leave the shell"),
];
