//! Subcommand implementations.
//!
//! Results go to stdout; logs and prompts go to stderr.

#![allow(clippy::print_stdout, clippy::print_stderr)]

pub mod account;
pub mod addresses;
pub mod cart;
pub mod catalog;
pub mod orders;

use std::io::IsTerminal;

use async_trait::async_trait;
use mely_client::notify::Confirmer;
use serde::Serialize;
use thiserror::Error;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

/// Errors raised by the CLI itself, as opposed to the client.
#[derive(Debug, Error)]
pub enum CliError {
    /// Nothing usable was read from stdin.
    #[error("Expected {0} on stdin")]
    MissingInput(&'static str),

    /// An argument could not be interpreted.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// The cart did not end up the way the command asked.
    #[error("{0}")]
    NotApplied(String),
}

/// Output format chosen on the command line.
#[derive(Debug, Clone, Copy)]
pub struct Output {
    pub json: bool,
}

impl Output {
    /// Print `value` as pretty JSON, or `text` when JSON was not requested.
    pub fn emit<T: Serialize>(self, value: &T, text: impl FnOnce() -> String) {
        if self.json {
            match serde_json::to_string_pretty(value) {
                Ok(json) => println!("{json}"),
                Err(e) => tracing::error!(error = %e, "Could not serialize output"),
            }
        } else {
            println!("{}", text());
        }
    }
}

/// Read one trimmed line from stdin, prompting on stderr when interactive.
pub async fn read_secret_line(what: &'static str) -> Result<String, CliError> {
    if std::io::stdin().is_terminal() {
        eprint!("{what}: ");
    }
    let mut line = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await
        .map_err(|_| CliError::MissingInput(what))?;

    let line = line.trim().to_string();
    if line.is_empty() {
        return Err(CliError::MissingInput(what));
    }
    Ok(line)
}

/// Asks on the terminal before destructive actions.
pub struct PromptConfirmer;

#[async_trait]
impl Confirmer for PromptConfirmer {
    async fn confirm(&self, title: &str, detail: &str) -> bool {
        let mut stdin = BufReader::new(tokio::io::stdin());
        ask(&mut tokio::io::stderr(), &mut stdin, title, detail).await
    }
}

/// Write the prompt and read one answer. Any I/O failure counts as "no".
async fn ask<W, R>(prompt_to: &mut W, answers: &mut R, title: &str, detail: &str) -> bool
where
    W: AsyncWrite + Unpin,
    R: AsyncBufRead + Unpin,
{
    let prompt = format!("{title}: {detail} [y/N] ");
    if prompt_to.write_all(prompt.as_bytes()).await.is_err() || prompt_to.flush().await.is_err() {
        return false;
    }

    let mut answer = String::new();
    if answers.read_line(&mut answer).await.is_err() {
        return false;
    }
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes" | "s" | "si" | "sí")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};

    use super::*;

    /// Accepts writes but fails to flush.
    struct BrokenFlush;

    impl AsyncWrite for BrokenFlush {
        fn poll_write(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            buf: &[u8],
        ) -> Poll<io::Result<usize>> {
            Poll::Ready(Ok(buf.len()))
        }

        fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed")))
        }

        fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
            Poll::Ready(Ok(()))
        }
    }

    #[tokio::test]
    async fn test_affirmative_answers() {
        for answer in ["y\n", "YES\n", "si\n", "sí\n"] {
            let mut prompt = Vec::new();
            let mut answers = answer.as_bytes();
            assert!(ask(&mut prompt, &mut answers, "Remove item", "Remove Vincha?").await);
            assert_eq!(
                String::from_utf8(prompt).unwrap(),
                "Remove item: Remove Vincha? [y/N] "
            );
        }
    }

    #[tokio::test]
    async fn test_anything_else_is_no() {
        for answer in ["\n", "n\n", "maybe\n", ""] {
            let mut answers = answer.as_bytes();
            assert!(!ask(&mut Vec::new(), &mut answers, "Remove item", "?").await);
        }
    }

    #[tokio::test]
    async fn test_failed_flush_is_no() {
        let mut answers = "y\n".as_bytes();
        assert!(!ask(&mut BrokenFlush, &mut answers, "Remove item", "?").await);
    }
}
