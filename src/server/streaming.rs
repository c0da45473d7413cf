//! Relay of provider deltas to a chunked `text/plain` response.
//!
//! A pump task pulls deltas from the provider and pushes non-empty text into
//! a bounded channel; the response body drains the channel. The bound is the
//! backpressure: the pump stops pulling while the client is slow.
//!
//! When the client goes away the body, and with it the receiver, is dropped.
//! The pump notices through [`mpsc::Sender::closed`] even while it is parked
//! on the provider, and drops the provider stream, which releases the
//! outbound connection.
//!
//! A provider failure after text has been sent is forwarded as an `Err` item.
//! hyper then aborts the response without the terminating chunk, so clients
//! see a truncated transfer rather than a clean end of stream.

use axum::body::Body;
use bytes::Bytes;
use futures::StreamExt;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, error, info};

use crate::provider::{DeltaStream, ProviderError};

pub type RelayItem = Result<Bytes, ProviderError>;

/// Pull deltas until one carries text.
///
/// Returns `Ok(None)` if the provider finished without producing any text.
/// Errors here happen before the response is committed and can still be
/// reported with a proper status code.
pub async fn first_fragment(deltas: &mut DeltaStream) -> Result<Option<String>, ProviderError> {
    while let Some(delta) = deltas.next().await {
        if let Some(text) = delta?.into_text() {
            return Ok(Some(text));
        }
    }
    Ok(None)
}

/// Spawn the pump task and return the receiving end of the relay channel.
pub fn spawn_relay(
    request_id: String,
    first: Option<String>,
    mut deltas: DeltaStream,
    buffer: usize,
) -> mpsc::Receiver<RelayItem> {
    let (tx, rx) = mpsc::channel(buffer.max(1));

    tokio::spawn(async move {
        let mut forwarded = 0usize;

        if let Some(text) = first {
            if tx.send(Ok(Bytes::from(text))).await.is_err() {
                info!(request_id, "Client disconnected before first fragment");
                return;
            }
            forwarded += 1;
        }

        loop {
            let next = tokio::select! {
                biased;
                _ = tx.closed() => {
                    info!(request_id, forwarded, "Client disconnected, cancelling provider stream");
                    return;
                }
                next = deltas.next() => next,
            };

            match next {
                None => break,
                Some(Ok(delta)) => {
                    let Some(text) = delta.into_text() else {
                        continue;
                    };
                    if tx.send(Ok(Bytes::from(text))).await.is_err() {
                        info!(request_id, forwarded, "Client disconnected, cancelling provider stream");
                        return;
                    }
                    forwarded += 1;
                }
                Some(Err(e)) => {
                    error!(request_id, forwarded, "Provider stream failed mid-response: {e}");
                    let _ = tx.send(Err(e)).await;
                    return;
                }
            }
        }

        debug!(request_id, forwarded, "Chat stream complete");
    });

    rx
}

/// Wrap a relay channel as a streaming response body.
pub fn relay_body(rx: mpsc::Receiver<RelayItem>) -> Body {
    Body::from_stream(ReceiverStream::new(rx))
}
