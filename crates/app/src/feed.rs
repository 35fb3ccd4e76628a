//! Line-delimited JSON feed into the in-process queues.
//!
//! Each line is `{"queue": "...", "to": "...", "body": ...}`. A string body
//! is published as-is; any other JSON value is published serialized.

use std::collections::BTreeMap;

use hubrelay_core::QueueMessage;
use hubrelay_domain::{HubRelayError, Result};
use hubrelay_infra::queue::QueueSender;
use serde::Deserialize;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[derive(Debug, Deserialize)]
struct FeedLine {
    queue: String,
    #[serde(default)]
    to: Option<String>,
    body: Value,
}

/// Counts of a finished feed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FeedSummary {
    pub published: usize,
    /// Unparseable lines or lines naming an unknown queue.
    pub rejected: usize,
}

/// Read lines until EOF or cancellation and publish each to its queue.
///
/// # Errors
///
/// Returns an error when reading fails or a queue is closed.
pub async fn feed_lines<R>(
    reader: R,
    senders: &BTreeMap<String, QueueSender>,
    cancel: &CancellationToken,
) -> Result<FeedSummary>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    let mut summary = FeedSummary::default();

    loop {
        let line = tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            line = lines.next_line() => line,
        };
        let Some(line) =
            line.map_err(|err| HubRelayError::Internal(format!("failed to read feed: {err}")))?
        else {
            break;
        };
        if line.trim().is_empty() {
            continue;
        }

        let parsed: FeedLine = match serde_json::from_str(&line) {
            Ok(parsed) => parsed,
            Err(err) => {
                warn!(error = %err, "Skipping malformed feed line");
                summary.rejected += 1;
                continue;
            }
        };

        let Some(sender) = senders.get(&parsed.queue) else {
            warn!(queue = %parsed.queue, "Skipping feed line for unknown queue");
            summary.rejected += 1;
            continue;
        };

        let body = match parsed.body {
            Value::String(body) => body,
            other => other.to_string(),
        };
        sender.publish(QueueMessage { body, to: parsed.to }).await?;
        summary.published += 1;
        debug!(queue = %parsed.queue, "Feed line published");
    }

    Ok(summary)
}
