//! Command gate: tokenize a raw caller string and decide whether it is an admissible
//! invocation of the one allowed program. Pure; never touches the filesystem or spawns.
//!
//! Tokens are separated by runs of whitespace, so `ls  -la` and `ls -la` are the same
//! command and no empty tokens exist. Shell syntax is never interpreted: any argument
//! containing a forbidden substring rejects the whole command.

use std::collections::HashSet;

use crate::config::SandboxConfig;

/// One argument after the program name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    /// `--name`, matched exactly against the long-option allowlist.
    Long(String),
    /// `-xyz`; holds the full token including the dash.
    Short(String),
    /// Anything not starting with `-`; a candidate path.
    Positional(String),
}

impl Arg {
    fn classify(token: &str) -> Self {
        if token.starts_with("--") {
            Arg::Long(token.to_string())
        } else if token.starts_with('-') {
            Arg::Short(token.to_string())
        } else {
            Arg::Positional(token.to_string())
        }
    }
}

/// A command that passed every check. Only [`CommandPolicy::validate`] constructs one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedCommand {
    program: String,
    args: Vec<Arg>,
}

impl ValidatedCommand {
    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[Arg] {
        &self.args
    }

    /// First positional argument; the listing target when present.
    pub fn first_positional(&self) -> Option<&str> {
        self.args.iter().find_map(|a| match a {
            Arg::Positional(p) => Some(p.as_str()),
            _ => None,
        })
    }
}

/// Why a raw command was refused. Kept for logs; callers only ever see a fixed message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Rejection {
    #[error("command is {len} bytes, limit is {limit}")]
    TooLong { len: usize, limit: usize },

    #[error("empty command")]
    Empty,

    #[error("program {0:?} is not allowed")]
    Program(String),

    #[error("argument {token:?} contains forbidden sequence {forbidden:?}")]
    Forbidden { token: String, forbidden: String },

    #[error("long option {0:?} is not allowed")]
    LongOption(String),

    #[error("short option {letter:?} in {token:?} is not allowed")]
    ShortOption { token: String, letter: char },
}

/// Grammar for admissible commands: program name, option allowlists, and forbidden substrings.
#[derive(Debug, Clone)]
pub struct CommandPolicy {
    program: String,
    long_options: HashSet<String>,
    short_options: HashSet<char>,
    forbidden: Vec<String>,
    max_command_bytes: usize,
}

impl Default for CommandPolicy {
    fn default() -> Self {
        Self::from_config(&SandboxConfig::default())
    }
}

impl CommandPolicy {
    pub fn from_config(config: &SandboxConfig) -> Self {
        Self {
            program: config.program.clone(),
            long_options: config.long_options.iter().cloned().collect(),
            short_options: config.short_options.chars().collect(),
            forbidden: config
                .forbidden
                .iter()
                .filter(|f| !f.is_empty())
                .cloned()
                .collect(),
            max_command_bytes: config.max_command_bytes,
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Accept or reject the whole command. All-or-nothing: the first failing token decides.
    pub fn validate(&self, raw: &str) -> Result<ValidatedCommand, Rejection> {
        if raw.len() > self.max_command_bytes {
            return Err(Rejection::TooLong {
                len: raw.len(),
                limit: self.max_command_bytes,
            });
        }
        let mut tokens = raw.split_whitespace();
        let program = tokens.next().ok_or(Rejection::Empty)?;
        if program != self.program {
            return Err(Rejection::Program(program.to_string()));
        }

        let mut args = Vec::new();
        for token in tokens {
            self.check_forbidden(token)?;
            let arg = Arg::classify(token);
            match &arg {
                Arg::Long(opt) => {
                    if !self.long_options.contains(opt.as_str()) {
                        return Err(Rejection::LongOption(opt.clone()));
                    }
                }
                Arg::Short(bundle) => {
                    if let Some(letter) = bundle[1..]
                        .chars()
                        .find(|c| !self.short_options.contains(c))
                    {
                        return Err(Rejection::ShortOption {
                            token: bundle.clone(),
                            letter,
                        });
                    }
                }
                Arg::Positional(_) => {}
            }
            args.push(arg);
        }

        Ok(ValidatedCommand {
            program: program.to_string(),
            args,
        })
    }

    fn check_forbidden(&self, token: &str) -> Result<(), Rejection> {
        match self.forbidden.iter().find(|f| token.contains(f.as_str())) {
            Some(f) => Err(Rejection::Forbidden {
                token: token.to_string(),
                forbidden: f.clone(),
            }),
            None => Ok(()),
        }
    }
}
