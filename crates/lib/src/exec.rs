//! Safe execution layer: run the one allowed binary with validated arguments.
//! No shell is used; arguments are passed as a list to avoid injection.

use std::ffi::OsStr;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;

use crate::config::SandboxConfig;
use crate::error::ListingError;

/// Result of a child that ran to completion. Stderr output wins over stdout regardless of exit code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success(String),
    Failure(String),
}

/// Spawns the configured program and collects its output.
#[derive(Debug, Clone)]
pub struct Executor {
    program: String,
    max_output_bytes: usize,
    timeout: Option<Duration>,
}

impl Executor {
    pub fn from_config(config: &SandboxConfig) -> Self {
        Self {
            program: config.program.clone(),
            max_output_bytes: config.max_output_bytes,
            timeout: (config.timeout_ms > 0).then(|| Duration::from_millis(config.timeout_ms)),
        }
    }

    /// Run `program args...` in `cwd`, reading stdout and stderr concurrently until the child exits.
    pub async fn run<I, S>(&self, args: I, cwd: &Path) -> Result<Outcome, ListingError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        let mut child = Command::new(&self.program)
            .args(args)
            .current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(ListingError::Spawn)?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let cap = self.max_output_bytes;

        let finished = {
            let work = async {
                tokio::join!(
                    read_capped(stdout, cap),
                    read_capped(stderr, cap),
                    child.wait()
                )
            };
            match self.timeout {
                Some(limit) => tokio::time::timeout(limit, work).await.ok(),
                None => Some(work.await),
            }
        };

        let Some((out, err, status)) = finished else {
            let after = self.timeout.unwrap_or_default();
            if let Err(e) = child.kill().await {
                log::debug!("killing timed out {} failed: {}", self.program, e);
            }
            return Err(ListingError::TimedOut { after });
        };

        let status = status?;
        let (out, err) = (out?, err?);
        log::debug!(
            "{} exited with {} ({} stdout bytes, {} stderr bytes)",
            self.program,
            status,
            out.len(),
            err.len()
        );

        if err.is_empty() {
            Ok(Outcome::Success(out.into_text(cap)))
        } else {
            Ok(Outcome::Failure(err.into_text(cap)))
        }
    }
}

/// Bytes read from one stream, at most `cap` of them kept.
#[derive(Debug, Default)]
struct Captured {
    bytes: Vec<u8>,
    truncated: bool,
}

impl Captured {
    fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    fn len(&self) -> usize {
        self.bytes.len()
    }

    fn into_text(self, cap: usize) -> String {
        let mut text = String::from_utf8_lossy(&self.bytes).into_owned();
        if self.truncated {
            text.push_str(&format!("\n[output truncated at {} bytes]", cap));
        }
        text
    }
}

/// Drain `reader` to EOF, keeping the first `cap` bytes. Keeps reading past the cap so the child never blocks on a full pipe.
async fn read_capped<R>(reader: Option<R>, cap: usize) -> std::io::Result<Captured>
where
    R: AsyncRead + Unpin,
{
    let mut captured = Captured::default();
    let Some(mut reader) = reader else {
        return Ok(captured);
    };
    let mut buf = [0u8; 8192];
    loop {
        let n = reader.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        let room = cap.saturating_sub(captured.bytes.len());
        let keep = n.min(room);
        captured.bytes.extend_from_slice(&buf[..keep]);
        if keep < n {
            captured.truncated = true;
        }
    }
    Ok(captured)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn temp_dir_with(files: &[&str]) -> std::path::PathBuf {
        let dir = std::env::temp_dir().join(format!("lsgate-exec-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(&dir).unwrap();
        for f in files {
            std::fs::write(dir.join(f), b"x").unwrap();
        }
        dir
    }

    fn executor(program: &str) -> Executor {
        Executor::from_config(&SandboxConfig {
            program: program.to_string(),
            ..SandboxConfig::default()
        })
    }

    #[tokio::test]
    async fn lists_working_directory() {
        let dir = temp_dir_with(&["a.txt", "b.txt"]);
        let out = executor("ls").run(Vec::<String>::new(), &dir).await.unwrap();
        match out {
            Outcome::Success(text) => {
                assert!(text.contains("a.txt"));
                assert!(text.contains("b.txt"));
            }
            other => panic!("expected success, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn stderr_output_is_failure_and_stdout_is_discarded() {
        let dir = temp_dir_with(&["a.txt"]);
        let out = executor("ls")
            .run(["a.txt", "missing.txt"], &dir)
            .await
            .unwrap();
        match out {
            Outcome::Failure(text) => {
                assert!(text.contains("missing.txt"));
                assert!(!text.contains("a.txt\n"));
            }
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn nonzero_exit_without_stderr_is_success() {
        let dir = temp_dir_with(&[]);
        let out = executor("false").run(Vec::<String>::new(), &dir).await.unwrap();
        assert_eq!(out, Outcome::Success(String::new()));
    }

    #[tokio::test]
    async fn missing_binary_is_spawn_error() {
        let dir = temp_dir_with(&[]);
        let err = executor("lsgate-no-such-binary")
            .run(Vec::<String>::new(), &dir)
            .await
            .unwrap_err();
        assert!(matches!(err, ListingError::Spawn(_)));
    }

    #[tokio::test]
    async fn output_is_capped() {
        let names: Vec<String> = (0..50).map(|i| format!("file-{:03}.txt", i)).collect();
        let refs: Vec<&str> = names.iter().map(String::as_str).collect();
        let dir = temp_dir_with(&refs);
        let out = Executor::from_config(&SandboxConfig {
            max_output_bytes: 32,
            ..SandboxConfig::default()
        })
        .run(Vec::<String>::new(), &dir)
        .await
        .unwrap();
        let Outcome::Success(text) = out else {
            panic!("expected success");
        };
        assert!(text.starts_with("file-000.txt"));
        assert!(text.ends_with("[output truncated at 32 bytes]"));
        assert!(!text.contains("file-049.txt"));
    }

    #[tokio::test]
    async fn slow_child_times_out() {
        let dir = temp_dir_with(&[]);
        let err = Executor::from_config(&SandboxConfig {
            program: "sleep".to_string(),
            timeout_ms: 100,
            ..SandboxConfig::default()
        })
        .run(["5"], &dir)
        .await
        .unwrap_err();
        assert!(matches!(err, ListingError::TimedOut { after } if after == Duration::from_millis(100)));
    }

    #[test]
    fn zero_timeout_disables_the_limit() {
        let exec = Executor::from_config(&SandboxConfig {
            timeout_ms: 0,
            ..SandboxConfig::default()
        });
        assert_eq!(exec.timeout, None);
    }
}
