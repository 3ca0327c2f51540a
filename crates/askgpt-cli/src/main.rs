use std::fs;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use askgpt_contracts::images::{MimeLabeling, UploadedImage};
use askgpt_contracts::shell::{parse_shell_line, ShellCommand, SHELL_HELP_COMMANDS};
use askgpt_engine::{
    default_transport_registry, AskSession, ClientConfig, SessionOptions, DEFAULT_MODEL,
};
use clap::{Args, Parser, Subcommand};

const TITLE: &str = "Ask GPT 4";

#[derive(Debug, Parser)]
#[command(
    name = "askgpt",
    version,
    about = "Ask a hosted chat model a question, optionally with images"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Send one question and exit.
    Ask(AskArgs),
    /// Interactive shell: type a question, attach images, /send.
    Chat(ChatArgs),
}

#[derive(Debug, Args)]
struct SessionArgs {
    #[arg(long, default_value = DEFAULT_MODEL)]
    model: String,
    #[arg(long, default_value = "openai")]
    provider: String,
    #[arg(long, default_value = "qa")]
    qa_dir: PathBuf,
    #[arg(long)]
    events: Option<PathBuf>,
    /// Tag every image as image/jpeg, whatever its real format.
    #[arg(long)]
    legacy_jpeg_mime: bool,
    /// Keep a timestamped copy of each attached image in the qa directory.
    #[arg(long)]
    archive_images: bool,
}

#[derive(Debug, Parser)]
struct AskArgs {
    #[command(flatten)]
    session: SessionArgs,
    #[arg(long, short, default_value = "")]
    question: String,
    #[arg(long = "image", short)]
    images: Vec<PathBuf>,
}

#[derive(Debug, Parser)]
struct ChatArgs {
    #[command(flatten)]
    session: SessionArgs,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("askgpt error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    match cli.command {
        Command::Ask(args) => run_ask(args),
        Command::Chat(args) => {
            let mut session = open_session(&args.session)?;
            let stdin = io::stdin();
            let stdout = io::stdout();
            run_shell(&mut session, stdin.lock(), &mut stdout.lock())?;
            Ok(0)
        }
    }
}

fn open_session(args: &SessionArgs) -> Result<AskSession> {
    let config = ClientConfig::from_env()?;
    let mut registry = default_transport_registry(&config)?;
    let available = registry.names().join(", ");
    let transport = registry
        .take(&args.provider)
        .ok_or_else(|| anyhow!("unknown provider '{}' (available: {available})", args.provider))?;

    fs::create_dir_all(&args.qa_dir)
        .with_context(|| format!("failed to create {}", args.qa_dir.display()))?;

    AskSession::new(
        transport,
        SessionOptions {
            model: args.model.clone(),
            qa_dir: args.qa_dir.clone(),
            labeling: if args.legacy_jpeg_mime {
                MimeLabeling::AlwaysJpeg
            } else {
                MimeLabeling::Detected
            },
            archive_images: args.archive_images,
            events_path: args.events.clone(),
        },
    )
}

fn run_ask(args: AskArgs) -> Result<i32> {
    let images = args
        .images
        .iter()
        .map(|path| UploadedImage::from_path(path))
        .collect::<Result<Vec<_>>>()?;
    let mut session = open_session(&args.session)?;
    let answer = session.submit_with(&args.question, &images, |text| println!("{text}"))?;
    log::info!("logged to {}", answer.log_path.display());
    Ok(0)
}

/// Pending form contents between submissions.
#[derive(Debug, Default)]
struct ShellInput {
    lines: Vec<String>,
    images: Vec<UploadedImage>,
}

impl ShellInput {
    fn question(&self) -> String {
        self.lines.join("\n")
    }

    fn clear(&mut self) {
        self.lines.clear();
        self.images.clear();
    }
}

fn run_shell<R: BufRead, W: Write>(session: &mut AskSession, input: R, out: &mut W) -> Result<()> {
    writeln!(out, "{TITLE}")?;
    writeln!(out, "Type your question, /attach images, then /send. /help lists commands.")?;
    out.flush()?;

    let mut pending = ShellInput::default();
    for line in input.lines() {
        let line = line.context("failed to read input")?;
        match parse_shell_line(&line) {
            ShellCommand::Noop => {}
            ShellCommand::Append(text) => pending.lines.push(text),
            ShellCommand::Attach(paths) => {
                if paths.is_empty() {
                    writeln!(out, "usage: /attach <paths...>")?;
                }
                for raw in paths {
                    attach(&mut pending, Path::new(&raw), out)?;
                }
            }
            ShellCommand::ListImages => {
                if pending.images.is_empty() {
                    writeln!(out, "no images attached")?;
                }
                for (idx, image) in pending.images.iter().enumerate() {
                    writeln!(out, "{}. {} ({} bytes)", idx + 1, image.name, image.bytes.len())?;
                }
            }
            ShellCommand::Clear => {
                pending.clear();
                writeln!(out, "cleared")?;
            }
            ShellCommand::Send(extra) => {
                if let Some(extra) = extra {
                    pending.lines.push(extra);
                }
                send(session, &pending, out)?;
                pending.clear();
            }
            ShellCommand::SetModel(model) => {
                if model.is_empty() {
                    writeln!(out, "model: {}", session.model())?;
                } else {
                    session.set_model(model);
                    writeln!(out, "model set to {}", session.model())?;
                }
            }
            ShellCommand::Help => {
                for (usage, summary) in SHELL_HELP_COMMANDS {
                    writeln!(out, "  {usage:<20} {summary}")?;
                }
            }
            ShellCommand::Quit => break,
            ShellCommand::Unknown { command, .. } => {
                writeln!(out, "unknown command /{command} (try /help)")?;
            }
        }
        out.flush()?;
    }
    Ok(())
}

fn attach<W: Write>(pending: &mut ShellInput, path: &Path, out: &mut W) -> Result<()> {
    match UploadedImage::from_path(path) {
        Ok(image) => {
            writeln!(out, "attached {}", image.name)?;
            pending.images.push(image);
        }
        Err(err) => writeln!(out, "error: {err:#}")?,
    }
    Ok(())
}

fn send<W: Write>(session: &mut AskSession, pending: &ShellInput, out: &mut W) -> Result<()> {
    let question = pending.question();
    let mut rendered = Ok(());
    let result = session.submit_with(&question, &pending.images, |text| {
        rendered = writeln!(out, "\nResponse\n{text}\n");
    });
    rendered?;
    match result {
        Ok(answer) => writeln!(out, "(saved to {})", answer.log_path.display())?,
        Err(err) => writeln!(out, "error: {err:#}")?,
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::io::Cursor;

    use askgpt_contracts::qa_log::question_hash;
    use askgpt_engine::{AskSession, DryrunTransport, SessionOptions, SessionState};
    use clap::Parser;

    use super::{run_shell, Cli, Command};

    fn dryrun_session(dir: &std::path::Path) -> anyhow::Result<AskSession> {
        AskSession::new(
            Box::new(DryrunTransport),
            SessionOptions {
                qa_dir: dir.to_path_buf(),
                ..SessionOptions::default()
            },
        )
    }

    fn drive(session: &mut AskSession, script: &str) -> anyhow::Result<String> {
        let mut out = Vec::new();
        run_shell(session, Cursor::new(script.to_string()), &mut out)?;
        Ok(String::from_utf8(out)?)
    }

    #[test]
    fn shell_sends_multi_line_question_and_logs_it() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let mut session = dryrun_session(temp.path())?;

        let output = drive(&mut session, "What is\n2+2?\n/send\n/quit\n")?;

        assert!(output.starts_with("Ask GPT 4\n"));
        assert!(output.contains("[dryrun gpt-4-turbo] What is\n2+2?"));
        let log_path = temp
            .path()
            .join(format!("qa-{}.txt", question_hash("What is\n2+2?")));
        let raw = fs::read_to_string(log_path)?;
        assert!(raw.contains("question = 'What is\\n2+2?'"));
        assert_eq!(session.state(), SessionState::Idle);
        Ok(())
    }

    #[test]
    fn shell_attaches_images_and_reports_bad_ones() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let image_path = temp.path().join("cat.png");
        fs::write(&image_path, [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a])?;
        let mut session = dryrun_session(temp.path())?;

        let script = format!(
            "/attach \"{}\" notes.txt\n/images\n/send Describe\n",
            image_path.display()
        );
        let output = drive(&mut session, &script)?;

        assert!(output.contains("attached cat.png"));
        assert!(output.contains("error: unsupported image notes.txt"));
        assert!(output.contains("1. cat.png (8 bytes)"));
        assert!(output.contains("[dryrun gpt-4-turbo] Describe (1 image(s))"));
        Ok(())
    }

    #[test]
    fn shell_sends_empty_question_and_switches_model() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let mut session = dryrun_session(temp.path())?;

        let output = drive(&mut session, "/model gpt-4o\n/send\n/bogus\n")?;

        assert!(output.contains("model set to gpt-4o"));
        assert!(output.contains("[dryrun gpt-4o] "));
        assert!(output.contains("unknown command /bogus"));
        assert!(temp
            .path()
            .join(format!("qa-{}.txt", question_hash("")))
            .exists());
        Ok(())
    }

    #[test]
    fn shell_clear_drops_pending_question() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let mut session = dryrun_session(temp.path())?;

        let output = drive(&mut session, "draft\n/clear\nfinal\n/send\n")?;

        assert!(output.contains("[dryrun gpt-4-turbo] final"));
        assert!(!output.contains("draft\nfinal"));
        Ok(())
    }

    #[test]
    fn ask_arguments_parse() {
        let cli = Cli::parse_from([
            "askgpt",
            "ask",
            "--question",
            "What is 2+2?",
            "--image",
            "a.png",
            "-i",
            "b.jpg",
            "--provider",
            "dryrun",
            "--legacy-jpeg-mime",
        ]);
        let Command::Ask(args) = cli.command else {
            panic!("expected ask subcommand");
        };
        assert_eq!(args.question, "What is 2+2?");
        assert_eq!(args.images.len(), 2);
        assert_eq!(args.session.provider, "dryrun");
        assert_eq!(args.session.model, "gpt-4-turbo");
        assert!(args.session.legacy_jpeg_mime);
        assert!(!args.session.archive_images);
    }
}
