//! Run an external executable per work item.
//!
//! The item content is written to the child's stdin as a single
//! newline-terminated line of JSON. The item id and metadata are passed as
//! environment variables. Exit status zero means success.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use serde::Serialize;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

use crate::error::{BoxError, Error, Result};
use crate::item::{Handler, WorkItem};

/// Handler that pipes each item into a command.
///
/// The child sees:
/// - `DIGESTER_ITEM_ID`: the item id
/// - `DIGESTER_META_<KEY>`: one variable per metadata entry, key upper-cased
///   with non-alphanumerics replaced by `_`
#[derive(Debug, Clone)]
pub struct CommandHandler {
    command: PathBuf,
    args: Vec<String>,
}

impl CommandHandler {
    /// Relative paths resolve against the current working directory now,
    /// not at spawn time.
    pub fn new(command: impl AsRef<Path>) -> Result<Self> {
        let command = command.as_ref();
        let command = if command.is_relative() && command.components().count() > 1 {
            std::env::current_dir()?.join(command)
        } else {
            command.to_path_buf()
        };
        Ok(Self {
            command,
            args: Vec::new(),
        })
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn command(&self) -> &Path {
        &self.command
    }

    async fn run(&self, id: &str, env: Vec<(String, String)>, stdin: Vec<u8>) -> Result<()> {
        debug!(command = %self.command.display(), item.id = id, "running command");

        let mut child = Command::new(&self.command)
            .args(&self.args)
            .env("DIGESTER_ITEM_ID", id)
            .envs(env)
            .stdin(Stdio::piped())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()?;

        if let Some(mut pipe) = child.stdin.take() {
            match pipe.write_all(&stdin).await {
                Ok(()) => {}
                // The child is free to ignore its input.
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
                Err(e) => return Err(e.into()),
            }
            drop(pipe);
        }

        let status = child.wait().await?;
        if status.success() {
            Ok(())
        } else {
            Err(Error::Other(format!(
                "{} exited with status {}",
                self.command.display(),
                status.code().unwrap_or(-1)
            )))
        }
    }
}

fn env_key(key: &str) -> String {
    let key: String = key
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_uppercase()
            } else {
                '_'
            }
        })
        .collect();
    format!("DIGESTER_META_{key}")
}

#[async_trait]
impl<I> Handler<I> for CommandHandler
where
    I: WorkItem,
    I::Content: Serialize,
{
    async fn handle(&self, item: &I) -> std::result::Result<(), BoxError> {
        let mut stdin = serde_json::to_vec(&item.content()?)?;
        stdin.push(b'\n');
        let env: Vec<(String, String)> = item
            .metadata()
            .map(|m| m.iter().map(|(k, v)| (env_key(k), v.clone())).collect())
            .unwrap_or_default();

        self.run(item.id(), env, stdin).await?;
        Ok(())
    }
}
