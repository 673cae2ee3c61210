//! JSON-lines console - one command per input line, one reply per output line
//!
//! The console never fails outward: a broken reader or writer ends the loop
//! and the caller moves on to the shutdown flush.

use std::future::Future;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{info, warn};

use crate::dispatch::{Command, DispatchHandle, Reply};

/// Serve commands from `input` until `shutdown` resolves.
///
/// When the input ends the loop keeps waiting for `shutdown`. A failed write
/// returns immediately.
pub async fn run<R, W, S>(handle: &DispatchHandle, input: R, mut output: W, shutdown: S)
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
    S: Future<Output = ()>,
{
    let mut lines = input.lines();
    let mut input_open = true;
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            biased;

            line = lines.next_line(), if input_open => match line {
                Ok(Some(line)) => {
                    let Some(reply) = reply_for_line(handle, &line).await else {
                        continue;
                    };
                    if let Err(e) = write_line(&mut output, &reply).await {
                        warn!(error = %e, "Console write failed, closing console");
                        return;
                    }
                }
                Ok(None) => {
                    info!("Console closed, waiting for shutdown signal");
                    input_open = false;
                }
                Err(e) => {
                    warn!(error = %e, "Console read failed, waiting for shutdown signal");
                    input_open = false;
                }
            },
            () = &mut shutdown => {
                info!("Shutdown signal received");
                return;
            }
        }
    }
}

/// Parse one line and dispatch it. Blank lines produce no output.
pub async fn reply_for_line(handle: &DispatchHandle, line: &str) -> Option<String> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }

    let command: Command = match serde_json::from_str(line) {
        Ok(command) => command,
        Err(e) => {
            let rejection = serde_json::json!({
                "kind": "invalid_command",
                "error": e.to_string(),
            });
            return Some(rejection.to_string());
        }
    };

    let reply = handle.dispatch(command).await.unwrap_or_else(Reply::from);
    Some(serde_json::to_value(&reply).unwrap_or_default().to_string())
}

async fn write_line<W: AsyncWrite + Unpin>(output: &mut W, line: &str) -> std::io::Result<()> {
    output.write_all(line.as_bytes()).await?;
    output.write_all(b"\n").await?;
    output.flush().await
}
