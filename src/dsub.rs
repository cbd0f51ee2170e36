//! Document subscription (DSUB) notification plumbing.
//!
//! Completed Provide-and-Register transactions publish a
//! [`NewDocumentRegistered`] event per document entry onto a broadcast bus.
//! Subscribers consume the bus directly; an optional webhook pusher
//! delivers JSON notifications to configured consumer endpoints.

use serde::Serialize;
use tokio::sync::broadcast;

/// Default buffer size for the broadcast channel; slow receivers past this
/// lag drop the oldest events.
const DEFAULT_BUFFER_SIZE: usize = 256;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NewDocumentRegistered {
    pub document_unique_id: String,
    pub facility_id: Option<String>,
    pub correlation_id: String,
}

/// Thread-safe, cloneable publisher for document-registered events.
#[derive(Clone)]
pub struct DsubBroadcaster {
    sender: broadcast::Sender<NewDocumentRegistered>,
}

impl DsubBroadcaster {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_BUFFER_SIZE)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        DsubBroadcaster { sender }
    }

    /// Publish an event; returns the number of subscribers that saw it.
    pub fn publish(&self, event: NewDocumentRegistered) -> usize {
        self.sender.send(event).unwrap_or_default()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NewDocumentRegistered> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for DsubBroadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DsubBroadcaster {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DsubBroadcaster")
            .field("subscriber_count", &self.subscriber_count())
            .finish()
    }
}

/// Pushes registered-document notifications to consumer endpoints.
pub struct DsubNotifier;

impl DsubNotifier {
    /// Subscribe to the broadcaster and POST each event to every consumer
    /// URL. Delivery failures are logged and skipped; notification is
    /// best-effort by design of the profile binding used here.
    pub fn spawn(broadcaster: &DsubBroadcaster, consumer_urls: Vec<String>) {
        if consumer_urls.is_empty() {
            return;
        }
        let mut receiver = broadcaster.subscribe();
        let client = reqwest::Client::new();
        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(event) => {
                        for url in &consumer_urls {
                            let result = client.post(url).json(&event).send().await;
                            match result {
                                Ok(response) if response.status().is_success() => {
                                    tracing::debug!(
                                        url = %url,
                                        document = %event.document_unique_id,
                                        "DSUB notification delivered"
                                    );
                                }
                                Ok(response) => {
                                    tracing::warn!(
                                        url = %url,
                                        status = %response.status(),
                                        "DSUB consumer rejected notification"
                                    );
                                }
                                Err(e) => {
                                    tracing::warn!(
                                        url = %url,
                                        error = %e,
                                        "DSUB notification failed"
                                    );
                                }
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "DSUB notifier lagged; events dropped");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }
}
