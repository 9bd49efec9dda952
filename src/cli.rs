//! Command-line argument parsing.

use std::path::PathBuf;

use crate::error::ConfigError;
use crate::pipeline::types::Classification;

/// Exit code when no model endpoint answered.
pub const EXIT_UNAVAILABLE: u8 = 2;

pub const USAGE: &str = "\
Usage:
  mailsweep classify --sender <addr> --subject <text> [--body <text>]
  mailsweep check-rules --rules <file>
  mailsweep evaluate --rules <file> --messages <file> [--all-matches] [--no-classify]
  mailsweep resolve --rules <file> --results <file>
  mailsweep serve [--rules <file>] [--bind <addr>]

Environment:
  OLLAMA_ENDPOINT, OLLAMA_MODEL, OPENAI_API_KEY, OPENAI_MODEL, OPENAI_BASE_URL,
  CLASSIFIER_TIMEOUT_SECS, MAILSWEEP_REVIEW_LABEL, MAILSWEEP_BIND, RUST_LOG";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Classify {
        sender: String,
        subject: String,
        body: String,
    },
    CheckRules {
        rules: PathBuf,
    },
    Evaluate {
        rules: PathBuf,
        messages: PathBuf,
        all_matches: bool,
        classify: bool,
    },
    Resolve {
        rules: PathBuf,
        results: PathBuf,
    },
    Serve {
        rules: Option<PathBuf>,
        bind: Option<String>,
    },
    Help,
}

/// Parse arguments (without the program name).
pub fn parse_args<I, S>(args: I) -> Result<Command, ConfigError>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut args = args.into_iter().map(Into::into);
    let Some(sub) = args.next() else {
        return Ok(Command::Help);
    };

    let mut opts = Options::default();
    while let Some(arg) = args.next() {
        let (flag, inline) = match arg.split_once('=') {
            Some((f, v)) if f.starts_with("--") => (f.to_string(), Some(v.to_string())),
            _ => (arg.clone(), None),
        };
        match flag.as_str() {
            "--all-matches" => opts.all_matches = true,
            "--no-classify" => opts.no_classify = true,
            "-h" | "--help" => return Ok(Command::Help),
            "--sender" | "--subject" | "--body" | "--rules" | "--messages" | "--results"
            | "--bind" => {
                let value = match inline {
                    Some(v) => v,
                    None => args.next().ok_or_else(|| ConfigError::InvalidValue {
                        key: flag.clone(),
                        message: "expected a value".into(),
                    })?,
                };
                opts.values.push((flag, value));
            }
            other => {
                return Err(ConfigError::InvalidValue {
                    key: other.to_string(),
                    message: "unknown argument".into(),
                });
            }
        }
    }

    let command = match sub.as_str() {
        "classify" => Command::Classify {
            sender: opts.required("--sender")?,
            subject: opts.required("--subject")?,
            body: opts.get("--body").unwrap_or_default(),
        },
        "check-rules" => Command::CheckRules {
            rules: opts.required("--rules")?.into(),
        },
        "evaluate" => Command::Evaluate {
            rules: opts.required("--rules")?.into(),
            messages: opts.required("--messages")?.into(),
            all_matches: opts.all_matches,
            classify: !opts.no_classify,
        },
        "resolve" => Command::Resolve {
            rules: opts.required("--rules")?.into(),
            results: opts.required("--results")?.into(),
        },
        "serve" => Command::Serve {
            rules: opts.get("--rules").map(PathBuf::from),
            bind: opts.get("--bind"),
        },
        "help" | "-h" | "--help" => Command::Help,
        other => {
            return Err(ConfigError::InvalidValue {
                key: "command".into(),
                message: format!("unknown command '{other}'"),
            });
        }
    };
    Ok(command)
}

/// Process exit code for a `classify` run. Ambiguous answers still succeed;
/// an unreachable model does not, even though `review` is printed.
pub fn classify_exit_code(classification: &Classification) -> u8 {
    if classification.is_unavailable() {
        EXIT_UNAVAILABLE
    } else {
        0
    }
}

#[derive(Default)]
struct Options {
    values: Vec<(String, String)>,
    all_matches: bool,
    no_classify: bool,
}

impl Options {
    /// Last occurrence wins.
    fn get(&self, flag: &str) -> Option<String> {
        self.values
            .iter()
            .rev()
            .find(|(f, _)| f == flag)
            .map(|(_, v)| v.clone())
    }

    fn required(&self, flag: &str) -> Result<String, ConfigError> {
        self.get(flag).ok_or_else(|| ConfigError::MissingRequired {
            key: flag.to_string(),
            hint: "See `mailsweep --help`.".into(),
        })
    }
}
