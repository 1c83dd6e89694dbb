//! The full listing pipeline: validate, resolve, execute, dispatch.
//!
//! A [`Sandbox`] is built once at startup and shared read-only (`Arc<Sandbox>`) by every
//! connection; each call to [`Sandbox::handle`] owns its own tokens, target, and child.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use crate::command::{CommandPolicy, Rejection, ValidatedCommand};
use crate::config::SandboxConfig;
use crate::dispatch::{dispatch, Reply};
use crate::error::{rejected_message, ListingError};
use crate::exec::{Executor, Outcome};
use crate::resolve::{resolve, ResolvedTarget};

#[derive(Debug, Clone)]
pub struct Sandbox {
    root: PathBuf,
    confine: bool,
    policy: CommandPolicy,
    executor: Executor,
}

impl Sandbox {
    /// Open the sandbox at `root`. The root must exist and be a directory; it is canonicalized once here.
    pub fn open(root: &Path, config: &SandboxConfig) -> Result<Self> {
        let meta = std::fs::metadata(root).with_context(|| {
            format!(
                "sandbox root not found: {} (run `lsgate init` or set sandbox.root)",
                root.display()
            )
        })?;
        if !meta.is_dir() {
            anyhow::bail!("sandbox root is not a directory: {}", root.display());
        }
        let root = std::fs::canonicalize(root)
            .with_context(|| format!("canonicalizing sandbox root {}", root.display()))?;
        Ok(Self {
            root,
            confine: config.confine,
            policy: CommandPolicy::from_config(config),
            executor: Executor::from_config(config),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn program(&self) -> &str {
        self.policy.program()
    }

    pub fn validate(&self, raw: &str) -> Result<ValidatedCommand, Rejection> {
        self.policy.validate(raw)
    }

    pub async fn resolve(&self, cmd: &ValidatedCommand) -> Result<ResolvedTarget, ListingError> {
        resolve(cmd, &self.root, self.confine).await
    }

    /// Validate, resolve, and run `raw`. Stops at the first failing stage; nothing is spawned unless the
    /// command is valid and its target directory exists.
    pub async fn run(&self, raw: &str) -> Result<Outcome, ListingError> {
        let cmd = self.validate(raw)?;
        let target = self.resolve(&cmd).await?;
        self.executor.run(&target.args, &target.cwd).await
    }

    /// Run `raw` and produce the one reply the caller gets.
    pub async fn handle(&self, raw: &str) -> Reply {
        dispatch(self.run(raw).await, self.program())
    }

    /// Reply for inbound messages whose payload is not a string at all.
    pub fn reject_malformed(&self) -> Reply {
        Reply::Error(rejected_message(self.program()))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn temp_sandbox(config: &SandboxConfig) -> Sandbox {
        let dir = std::env::temp_dir().join(format!("lsgate-sandbox-{}", uuid::Uuid::new_v4()));
        std::fs::create_dir_all(dir.join("docs")).unwrap();
        std::fs::write(dir.join("a.txt"), b"a").unwrap();
        std::fs::write(dir.join("b.txt"), b"b").unwrap();
        std::fs::write(dir.join("docs").join("inner.md"), b"c").unwrap();
        Sandbox::open(&dir, config).unwrap()
    }

    #[tokio::test]
    async fn plain_ls_lists_root() {
        let sb = temp_sandbox(&SandboxConfig::default());
        let reply = sb.handle("ls").await;
        let Reply::Content(text) = reply else {
            panic!("expected content, got {:?}", reply);
        };
        assert!(text.contains("a.txt"));
        assert!(text.contains("b.txt"));
        assert!(text.contains("docs"));
    }

    #[tokio::test]
    async fn relative_subdirectory_is_listed() {
        let sb = temp_sandbox(&SandboxConfig::default());
        let reply = sb.handle("ls -1 docs").await;
        assert_eq!(reply, Reply::Content("inner.md\n".to_string()));
    }

    #[tokio::test]
    async fn nonexistent_absolute_path_is_error() {
        let sb = temp_sandbox(&SandboxConfig::default());
        let reply = sb.handle("ls /nonexistent").await;
        assert_eq!(reply, Reply::Error("Dir or file does not exist".to_string()));
    }

    #[tokio::test]
    async fn rejected_commands_never_reach_the_filesystem() {
        let config = SandboxConfig {
            program: "lsgate-no-such-binary".to_string(),
            ..SandboxConfig::default()
        };
        let sb = temp_sandbox(&config);
        let err = sb.run("ls -la").await.unwrap_err();
        assert!(matches!(err, ListingError::Rejected(_)));
        let err = sb.run("lsgate-no-such-binary missing").await.unwrap_err();
        assert!(matches!(err, ListingError::NotFound(_)));
        let err = sb.run("lsgate-no-such-binary").await.unwrap_err();
        assert!(matches!(err, ListingError::Spawn(_)));
        assert_eq!(sb.handle("lsgate-no-such-binary").await.payload(), "unknown");
    }

    #[tokio::test]
    async fn stderr_wins_over_stdout() {
        let sb = temp_sandbox(&SandboxConfig::default());
        let reply = sb.handle("ls docs missing-entry").await;
        match reply {
            Reply::Error(text) => {
                assert!(text.contains("missing-entry"));
                assert!(!text.contains("inner.md"));
            }
            other => panic!("expected error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn replies_never_show_the_root_path() {
        let sb = temp_sandbox(&SandboxConfig::default());
        let root = sb.root().display().to_string();

        let reply = sb.handle("ls -d docs").await;
        assert_eq!(reply, Reply::Content("docs\n".to_string()));

        let reply = sb.handle("ls docs missing").await;
        let Reply::Error(text) = reply else {
            panic!("expected error, got {:?}", reply);
        };
        assert!(text.contains("missing"));
        assert!(!text.contains(&root), "{text}");
    }

    #[tokio::test]
    async fn open_rejects_missing_root() {
        let missing = std::env::temp_dir().join(format!("lsgate-missing-{}", uuid::Uuid::new_v4()));
        assert!(Sandbox::open(&missing, &SandboxConfig::default()).is_err());
    }
}
