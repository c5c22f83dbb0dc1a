//! Replays JSON-lines ledger commands against a fresh in-memory engine.
//!
//! Every input line is one [`Command`]; every command yields one output line,
//! `{"ok": <result>}` or `{"error": "<message>"}`. A failed command does not
//! stop the replay. A line that is not JSON at all does.

pub mod command;

pub use command::{Command, ReplayError, Session};

use std::io::{BufRead, Write};

use anyhow::Context;
use serde_json::json;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReplaySummary {
    pub succeeded: usize,
    pub failed: usize,
}

pub fn replay<R, W>(session: &Session, input: R, mut output: W) -> anyhow::Result<ReplaySummary>
where
    R: BufRead,
    W: Write,
{
    let mut summary = ReplaySummary::default();

    for (index, line) in input.lines().enumerate() {
        let line_no = index + 1;
        let line = line.with_context(|| format!("reading line {line_no}"))?;
        if line.trim().is_empty() {
            continue;
        }

        let value: serde_json::Value =
            serde_json::from_str(&line).with_context(|| format!("line {line_no} is not valid JSON"))?;

        let result = serde_json::from_value::<Command>(value)
            .map_err(|e| ReplayError::InvalidCommand(e.to_string()))
            .and_then(|command| session.execute(command));

        let reply = match result {
            Ok(value) => {
                summary.succeeded += 1;
                json!({ "ok": value })
            }
            Err(err) => {
                summary.failed += 1;
                tracing::warn!(line = line_no, error = %err, "command failed");
                json!({ "error": err.to_string() })
            }
        };

        serde_json::to_writer(&mut output, &reply).context("writing result")?;
        writeln!(output).context("writing result")?;
    }

    output.flush().context("flushing output")?;
    Ok(summary)
}
