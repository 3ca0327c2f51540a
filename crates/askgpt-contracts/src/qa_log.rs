use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Local};
use sha2::{Digest, Sha256};

use crate::memo::CacheKey;

pub const DEFAULT_QA_DIR: &str = "qa";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum WriteMode {
    /// Truncate and write (`"w"`).
    #[default]
    Truncate,
    /// Append to the end (`"a"`).
    Append,
}

impl WriteMode {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim() {
            "w" => Ok(WriteMode::Truncate),
            "a" => Ok(WriteMode::Append),
            other => bail!("unsupported write mode '{other}' (expected \"w\" or \"a\")"),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WriteMode::Truncate => "w",
            WriteMode::Append => "a",
        }
    }
}

/// Writes `data` to `path`. The handle is closed when this returns, on
/// success or failure. Missing parent directories are an error.
pub fn write_to_disk(path: &Path, mode: WriteMode, data: impl AsRef<[u8]>) -> Result<()> {
    let mut options = OpenOptions::new();
    match mode {
        WriteMode::Truncate => options.write(true).create(true).truncate(true),
        WriteMode::Append => options.create(true).append(true),
    };
    let mut file = options
        .open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    file.write_all(data.as_ref())
        .with_context(|| format!("failed to write {}", path.display()))?;
    file.flush()
        .with_context(|| format!("failed to flush {}", path.display()))?;
    Ok(())
}

/// A pending disk write, comparable by value so it can be memoized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiskWrite {
    pub path: PathBuf,
    pub mode: WriteMode,
    pub data: Vec<u8>,
}

impl DiskWrite {
    pub fn apply(&self) -> Result<()> {
        write_to_disk(&self.path, self.mode, &self.data)
    }

    /// sha256 over mode, raw path bytes and data. Paths that are not valid
    /// UTF-8 still get distinct keys.
    pub fn cache_key(&self) -> CacheKey {
        let path = self.path.as_os_str().as_encoded_bytes();
        let mut hasher = Sha256::new();
        hasher.update(self.mode.as_str().as_bytes());
        hasher.update((path.len() as u64).to_le_bytes());
        hasher.update(path);
        hasher.update(&self.data);
        hex::encode(hasher.finalize())
    }
}

/// First 8 bytes of sha256(question), hex encoded.
pub fn question_hash(question: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(question.as_bytes());
    let digest = hasher.finalize();
    hex::encode(&digest[..8])
}

pub fn format_record(question: &str, response: &str) -> String {
    format!(
        "\nquestion = {}\n\nresponse = {}\n",
        quote_literal(question),
        quote_literal(response)
    )
}

/// Quoted, escaped rendering of `text`: single quotes unless the text holds a
/// `'` and no `"`. Control, separator and format characters are written as
/// `\xNN`, `\uNNNN` or `\UNNNNNNNN`.
pub fn quote_literal(text: &str) -> String {
    let quote = if text.contains('\'') && !text.contains('"') {
        '"'
    } else {
        '\''
    };
    let mut out = String::with_capacity(text.len() + 2);
    out.push(quote);
    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if c == quote => {
                out.push('\\');
                out.push(c);
            }
            c if is_unprintable(c) => push_escaped(&mut out, c),
            c => out.push(c),
        }
    }
    out.push(quote);
    out
}

fn is_unprintable(ch: char) -> bool {
    ch.is_control()
        || (ch.is_whitespace() && ch != ' ')
        || matches!(
            ch,
            '\u{ad}'
                | '\u{600}'..='\u{605}'
                | '\u{180e}'
                | '\u{200b}'..='\u{200f}'
                | '\u{202a}'..='\u{202e}'
                | '\u{2060}'..='\u{2064}'
                | '\u{2066}'..='\u{206f}'
                | '\u{feff}'
                | '\u{fff9}'..='\u{fffb}'
                | '\u{e000}'..='\u{f8ff}'
        )
}

fn push_escaped(out: &mut String, ch: char) {
    let code = ch as u32;
    let escaped = match code {
        0..=0xff => format!("\\x{code:02x}"),
        0x100..=0xffff => format!("\\u{code:04x}"),
        _ => format!("\\U{code:08x}"),
    };
    out.push_str(&escaped);
}

/// `<local timestamp>-<upload name>`, with `:` replaced so the result is a
/// valid file name everywhere.
pub fn archive_file_name(upload_name: &str, now: DateTime<Local>) -> String {
    let stamp = now.format("%Y-%m-%d %H:%M:%S%.6f").to_string();
    format!("{}-{}", stamp.replace(':', "-"), upload_name)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub path: PathBuf,
    pub question: String,
    pub response: String,
}

impl LogRecord {
    pub fn contents(&self) -> String {
        format_record(&self.question, &self.response)
    }

    pub fn to_write(&self) -> DiskWrite {
        DiskWrite {
            path: self.path.clone(),
            mode: WriteMode::Truncate,
            data: self.contents().into_bytes(),
        }
    }
}

/// Question/answer log: one text file per distinct question.
#[derive(Debug, Clone)]
pub struct QaLog {
    dir: PathBuf,
}

impl Default for QaLog {
    fn default() -> Self {
        Self::new(DEFAULT_QA_DIR)
    }
}

impl QaLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_for(&self, question: &str) -> PathBuf {
        self.dir.join(format!("qa-{}.txt", question_hash(question)))
    }

    pub fn record_for(&self, question: &str, response: &str) -> LogRecord {
        LogRecord {
            path: self.path_for(question),
            question: question.to_string(),
            response: response.to_string(),
        }
    }

    /// Overwrites the question's log file with this exchange.
    pub fn write(&self, question: &str, response: &str) -> Result<LogRecord> {
        let record = self.record_for(question, response);
        record.to_write().apply()?;
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use chrono::TimeZone;

    use super::*;

    #[test]
    fn log_file_holds_labeled_fields() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let log = QaLog::new(temp.path().join("qa"));
        fs::create_dir_all(log.dir())?;

        let record = log.write("Q1", "A1")?;
        assert_eq!(
            record.path,
            temp.path()
                .join("qa")
                .join(format!("qa-{}.txt", question_hash("Q1")))
        );
        let raw = fs::read_to_string(&record.path)?;
        assert!(raw.contains("question = 'Q1'"));
        assert!(raw.contains("response = 'A1'"));
        Ok(())
    }

    #[test]
    fn same_question_overwrites_previous_record() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let log = QaLog::new(temp.path());
        log.write("Q1", "first answer")?;
        let second = log.write("Q1", "second answer")?;

        let raw = fs::read_to_string(second.path)?;
        assert!(raw.contains("response = 'second answer'"));
        assert!(!raw.contains("first answer"));
        Ok(())
    }

    #[test]
    fn missing_directory_is_an_error() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let log = QaLog::new(temp.path().join("absent"));
        let err = log.write("Q", "A").unwrap_err();
        assert!(err.to_string().contains("failed to open"));
        Ok(())
    }

    #[test]
    fn append_mode_keeps_existing_content() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join("notes.txt");
        write_to_disk(&path, WriteMode::parse("w")?, "one\n")?;
        write_to_disk(&path, WriteMode::parse("a")?, "two\n")?;
        assert_eq!(fs::read_to_string(&path)?, "one\ntwo\n");
        assert!(WriteMode::parse("rb").is_err());
        Ok(())
    }

    #[test]
    fn question_hash_is_stable() {
        assert_eq!(question_hash("Q1"), question_hash("Q1"));
        assert_ne!(question_hash("Q1"), question_hash("Q2"));
        assert_eq!(question_hash("").len(), 16);
    }

    #[test]
    fn quote_literal_escapes_like_a_repr() {
        assert_eq!(quote_literal("plain"), "'plain'");
        assert_eq!(quote_literal("it's"), "\"it's\"");
        assert_eq!(quote_literal("both ' and \""), "'both \\' and \"'");
        assert_eq!(quote_literal("line\nbreak\\"), "'line\\nbreak\\\\'");
    }

    #[test]
    fn quote_literal_hex_escapes_unprintable_characters() {
        assert_eq!(quote_literal("bell\u{7}del\u{7f}"), "'bell\\x07del\\x7f'");
        assert_eq!(quote_literal("a\u{a0}b"), "'a\\xa0b'");
        assert_eq!(quote_literal("x\u{2028}y\u{200b}"), "'x\\u2028y\\u200b'");
        assert_eq!(quote_literal("caf\u{e9} \u{1f600}"), "'caf\u{e9} \u{1f600}'");
    }

    #[test]
    fn disk_write_keys_cover_path_mode_and_data() {
        let write = |path: &str, mode, data: &str| DiskWrite {
            path: PathBuf::from(path),
            mode,
            data: data.as_bytes().to_vec(),
        };
        let base = write("qa/a.txt", WriteMode::Truncate, "x");
        assert_eq!(base.cache_key(), base.clone().cache_key());
        assert_ne!(base.cache_key(), write("qa/b.txt", WriteMode::Truncate, "x").cache_key());
        assert_ne!(base.cache_key(), write("qa/a.txt", WriteMode::Append, "x").cache_key());
        assert_ne!(base.cache_key(), write("qa/a.txt", WriteMode::Truncate, "y").cache_key());
    }

    #[cfg(unix)]
    #[test]
    fn disk_write_keys_accept_non_utf8_paths() {
        use std::ffi::OsString;
        use std::os::unix::ffi::OsStringExt;

        let dir = PathBuf::from(OsString::from_vec(vec![b'q', b'a', 0xff]));
        let first = DiskWrite {
            path: dir.join("one.txt"),
            mode: WriteMode::Truncate,
            data: b"1".to_vec(),
        };
        let second = DiskWrite {
            path: dir.join("two.txt"),
            ..first.clone()
        };
        assert_ne!(first.cache_key(), second.cache_key());
    }

    #[test]
    fn archive_name_has_no_colons() {
        let now = Local.with_ymd_and_hms(2024, 3, 5, 14, 7, 9).single();
        let Some(now) = now else {
            return;
        };
        assert_eq!(
            archive_file_name("cat.png", now),
            "2024-03-05 14-07-09.000000-cat.png"
        );
    }
}
