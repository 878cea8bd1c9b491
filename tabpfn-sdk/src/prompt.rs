//! Interactive email prompt with a bounded wait.
//!
//! The prompt reads a single stdin line on a background thread and waits
//! for it with a timeout: no answer resolves to
//! [`PromptOutcome::Timeout`] instead of hanging the host. Malformed
//! input downgrades to a non-accepting outcome, never an error.

use std::io::Write;
use std::sync::mpsc;
use std::sync::OnceLock;
use std::time::Duration;

use regex::Regex;

const EMAIL_PATTERN: &str = r"^[a-zA-Z0-9._%+-]+@[a-zA-Z0-9.-]+\.[a-zA-Z]{2,}$";

const PRIVACY_POLICY_URL: &str = "https://priorlabs.ai/privacy_policy/";

/// Default wait for an answer on a TTY.
pub const DEFAULT_PROMPT_TIMEOUT: Duration = Duration::from_secs(15);

/// Outcome of an email prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptOutcome {
    /// A syntactically valid email was entered.
    Accepted { email: String },
    /// Input was entered but is not a valid email address.
    Declined,
    /// The prompt was skipped (empty input or read failure).
    Dismissed,
    /// No answer within the bounded wait.
    Timeout,
}

/// Text shown before the input line.
#[derive(Debug, Clone)]
pub struct PromptText {
    pub title: String,
    pub body: String,
    pub hint: String,
}

/// The default newsletter prompt.
pub fn default_prompt() -> PromptText {
    PromptText {
        title: "📬 Stay in the loop? (Optional)".to_owned(),
        body: "Thank you for using TabPFN! We'd love to keep you updated on TabPFN news:\n\
               • Major releases\n\
               • Critical bug fixes\n\
               • Research highlights"
            .to_owned(),
        hint: "Enter your email (optional) and press Enter. Leave blank to skip.\n\
               We'll store it securely, use it only for these updates, and never share it.\n\
               You can opt out anytime."
            .to_owned(),
    }
}

/// Something that can ask the user for an email address.
///
/// The seam exists so [`flows::subscribe`](crate::flows::subscribe) is
/// testable without a terminal.
pub trait EmailPrompter {
    fn prompt(&self, text: &PromptText) -> PromptOutcome;
}

/// Prompter for a plain terminal: prints the text, reads one line with a
/// bounded wait.
#[derive(Debug, Clone)]
pub struct TtyPrompter {
    pub timeout: Duration,
}

impl Default for TtyPrompter {
    fn default() -> Self {
        TtyPrompter {
            timeout: DEFAULT_PROMPT_TIMEOUT,
        }
    }
}

impl EmailPrompter for TtyPrompter {
    fn prompt(&self, text: &PromptText) -> PromptOutcome {
        println!("\n{}", text.title);
        println!("{}", text.body);
        println!("{}\n", text.hint);
        println!("Privacy Policy: {PRIVACY_POLICY_URL}\n");

        match read_line_with_timeout(self.timeout) {
            ReadResult::Line(raw) => classify_input(&raw),
            ReadResult::Failed => PromptOutcome::Dismissed,
            ReadResult::TimedOut => PromptOutcome::Timeout,
        }
    }
}

enum ReadResult {
    Line(String),
    Failed,
    TimedOut,
}

/// Read one stdin line on a worker thread, waiting up to `timeout`.
///
/// On timeout the worker stays blocked on stdin; it is detached and exits
/// with the process, same as any abandoned input prompt.
fn read_line_with_timeout(timeout: Duration) -> ReadResult {
    let (sender, receiver) = mpsc::channel();
    let worker = std::thread::Builder::new()
        .name("tabpfn-prompt".to_owned())
        .spawn(move || {
            print!("Email (optional, press Enter to skip): ");
            let _ = std::io::stdout().flush();
            let mut line = String::new();
            let result = match std::io::stdin().read_line(&mut line) {
                Ok(_) => Some(line),
                Err(_) => None,
            };
            let _ = sender.send(result);
        });
    if worker.is_err() {
        return ReadResult::Failed;
    }
    match receiver.recv_timeout(timeout) {
        Ok(Some(line)) => ReadResult::Line(line),
        Ok(None) => ReadResult::Failed,
        Err(_) => ReadResult::TimedOut,
    }
}

/// Map raw prompt input to an outcome. Empty input is a dismissal; input
/// that is not a valid email is a decline, not an error.
pub fn classify_input(raw: &str) -> PromptOutcome {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return PromptOutcome::Dismissed;
    }
    if !is_valid_email(trimmed) {
        return PromptOutcome::Declined;
    }
    PromptOutcome::Accepted {
        email: trimmed.to_owned(),
    }
}

fn is_valid_email(text: &str) -> bool {
    static EMAIL_RE: OnceLock<Option<Regex>> = OnceLock::new();
    EMAIL_RE
        .get_or_init(|| Regex::new(EMAIL_PATTERN).ok())
        .as_ref()
        .is_some_and(|re| re.is_match(text))
}
