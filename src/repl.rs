use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::info;

use crate::client::ClientHandle;
use crate::config::{ClientConfig, StressConfig};
use crate::dispatcher;
use crate::error::{ClientError, Result};
use crate::stress;

pub const PROMPT: &str = "Enter a string to send to the server (or '-exit' to quit): ";
pub const EXIT_COMMAND: &str = "-exit";
pub const CONCURRENCY_COMMAND: &str = "-concurrency";

/// One line of user input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command<'a> {
    Exit,
    Concurrency,
    Count(&'a str),
}

impl<'a> Command<'a> {
    /// Control words must match the whole line; anything else is counted.
    pub fn parse(line: &'a str) -> Self {
        let line = line.trim_end_matches(&['\r', '\n'][..]);
        match line {
            EXIT_COMMAND => Command::Exit,
            CONCURRENCY_COMMAND => Command::Concurrency,
            text => Command::Count(text),
        }
    }
}

/// Prompt, read a line, act on it, repeat.
///
/// Returns `Ok` on `-exit`. Ends with an error when input runs out or the
/// console client's connection is no longer usable. Server-side errors for a
/// single request are reported and the loop goes on.
pub async fn run<R, W>(
    mut input: R,
    mut output: W,
    console: &ClientHandle,
    config: &ClientConfig,
    stress_config: &StressConfig,
) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut raw = Vec::new();

    loop {
        output.write_all(PROMPT.as_bytes()).await?;
        output.flush().await?;

        raw.clear();
        let read = input
            .read_until(b'\n', &mut raw)
            .await
            .map_err(ClientError::InputRead)?;
        if read == 0 {
            return Err(ClientError::InputClosed);
        }
        // Invalid UTF-8 is replaced, not treated as a read failure.
        let line = String::from_utf8_lossy(&raw);

        match Command::parse(&line) {
            Command::Exit => {
                output.write_all(b"Client exited.\n").await?;
                output.flush().await?;
                return Ok(());
            }
            Command::Concurrency => {
                let report = stress::run(config, stress_config).await;
                info!("Concurrency test finished: {:?}", report);
                let summary = format!(
                    "concurrency: {} requests, {} succeeded, {} failed\n",
                    report.requests, report.succeeded, report.failed
                );
                output.write_all(summary.as_bytes()).await?;
            }
            Command::Count(text) => match dispatcher::send_message(console, text).await {
                Ok(count) => {
                    output
                        .write_all(format!("result={}\n", count).as_bytes())
                        .await?;
                }
                Err(e) if !e.is_fatal() => {
                    output.write_all(format!("error: {}\n", e).as_bytes()).await?;
                }
                Err(e) => return Err(e),
            },
        }
    }
}
