//! Streaming status API: emit progress snapshots as they are observed.
//!
//! Unlike [`crate::workflow::poll_document`], which returns only once the
//! document is terminal, [`watch_stream`] yields a [`ProgressSnapshot`] after
//! every successful status fetch. The stream owns its poll loop: dropping it
//! stops polling, the same way a UI component tears down its poller.

use crate::config::ClientConfig;
use crate::error::{DocProcError, FetchError};
use crate::model::DocumentId;
use crate::poller::StatusPoller;
use crate::progress::{ProgressSnapshot, StatusCallback, StatusProgressCallback};
use crate::workflow::resolve_service;
use futures::Stream;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::{CancellationToken, DropGuard};
use tracing::{debug, info};

type SnapshotItem = Result<ProgressSnapshot, DocProcError>;

/// A stream of snapshots for one document.
///
/// Ends after the terminal snapshot. A server-reported failure, exhausted
/// retries, or any other fatal error is delivered as a final `Err` item.
pub struct SnapshotStream {
    inner: UnboundedReceiverStream<SnapshotItem>,
    _stop_on_drop: DropGuard,
}

impl Stream for SnapshotStream {
    type Item = SnapshotItem;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}

/// Forwards snapshots into the stream, then to the caller's own callback.
struct ChannelCallback {
    tx: mpsc::UnboundedSender<SnapshotItem>,
    inner: Option<StatusCallback>,
}

impl StatusProgressCallback for ChannelCallback {
    fn on_poll_start(&self, id: &str) {
        if let Some(ref cb) = self.inner {
            cb.on_poll_start(id);
        }
    }

    fn on_snapshot(&self, id: &str, snapshot: &ProgressSnapshot) {
        // Receiver gone means the stream was dropped; the loop is being cancelled.
        let _ = self.tx.send(Ok(snapshot.clone()));
        if let Some(ref cb) = self.inner {
            cb.on_snapshot(id, snapshot);
        }
    }

    fn on_retry(&self, id: &str, failures: u32, delay: Duration, error: &FetchError) {
        if let Some(ref cb) = self.inner {
            cb.on_retry(id, failures, delay, error);
        }
    }

    fn on_poll_end(&self, id: &str, outcome: &str) {
        if let Some(ref cb) = self.inner {
            cb.on_poll_end(id, outcome);
        }
    }
}

/// Watch a document, streaming snapshots until it is terminal.
///
/// Must be called from within a tokio runtime; the poll loop runs on a
/// spawned task.
///
/// # Errors
/// Returns `Err` only when no document service can be resolved.
pub fn watch_stream(id: DocumentId, config: &ClientConfig) -> Result<SnapshotStream, DocProcError> {
    let service = resolve_service(config)?;
    let (tx, rx) = mpsc::unbounded_channel();
    let forward = Arc::new(ChannelCallback {
        tx: tx.clone(),
        inner: config.status_callback.clone(),
    });
    let poller = StatusPoller::from_config(service, config).with_callback(forward);

    let cancel = CancellationToken::new();
    let token = cancel.clone();
    info!("Watching document {}", id);

    tokio::spawn(async move {
        let terminal = match poller.poll(&id, &token).await {
            Ok(outcome) => outcome.into_result().err(),
            // Only the stream's own drop cancels this token; nobody is listening.
            Err(DocProcError::Cancelled { .. }) => None,
            Err(e) => Some(e),
        };
        if let Some(e) = terminal {
            let _ = tx.send(Err(e));
        }
        debug!("Watch task for {} finished", id);
    });

    Ok(SnapshotStream {
        inner: UnboundedReceiverStream::new(rx),
        _stop_on_drop: cancel.drop_guard(),
    })
}
