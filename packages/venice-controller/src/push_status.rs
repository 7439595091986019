//! Push-status write-back.
//!
//! A single-producer side channel that writes `(key, value)` push status
//! records to the `pushJobStatusStore` real-time topic. That store is
//! itself created asynchronously during bootstrap, so the producer is
//! lazily initialized: up to 5 attempts, 1 second apart. A write failure
//! is logged and swallowed -- it must never fail the primary operation
//! that triggered it.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{error, warn};

use crate::metadata_store::MetadataStore;

const PUSH_STATUS_STORE_NAME: &str = "pushJobStatusStore";
const INIT_ATTEMPTS: u32 = 5;
const INIT_RETRY_DELAY: Duration = Duration::from_secs(1);

/// Sends a push status record to the underlying real-time topic. Narrow
/// seam so the write path can be swapped for a real message bus producer
/// without touching the lazy-init / fire-and-forget logic above it.
#[async_trait]
pub trait PushStatusProducer: Send + Sync {
    async fn send(&self, key: &str, value: &str, value_schema_id: u32);
}

/// Test/dev producer that records every send in memory.
#[derive(Default)]
pub struct RecordingPushStatusProducer {
    sent: Mutex<Vec<(String, String, u32)>>,
}

impl RecordingPushStatusProducer {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn sent(&self) -> Vec<(String, String, u32)> {
        self.sent.lock().clone()
    }
}

#[async_trait]
impl PushStatusProducer for RecordingPushStatusProducer {
    async fn send(&self, key: &str, value: &str, value_schema_id: u32) {
        self.sent.lock().push((key.to_string(), value.to_string(), value_schema_id));
    }
}

struct Initialized {
    value_schema_id: u32,
}

/// Lazily-initialized push-status writer.
pub struct PushStatusWriter<M: MetadataStore, P: PushStatusProducer> {
    metadata: Arc<M>,
    producer: Arc<P>,
    state: Mutex<Option<Initialized>>,
}

impl<M: MetadataStore, P: PushStatusProducer> PushStatusWriter<M, P> {
    #[must_use]
    pub fn new(metadata: Arc<M>, producer: Arc<P>) -> Self {
        Self {
            metadata,
            producer,
            state: Mutex::new(None),
        }
    }

    /// Attempts lazy initialization: up to 5 attempts, 1 second apart,
    /// reading the push-status store's registered value schema id.
    /// Returns `false` if the store is still not ready after all attempts.
    async fn ensure_initialized(&self) -> bool {
        if self.state.lock().is_some() {
            return true;
        }

        for attempt in 1..=INIT_ATTEMPTS {
            match self.metadata.get_value_schemas(PUSH_STATUS_STORE_NAME).await {
                Ok(schemas) if !schemas.is_empty() => {
                    let value_schema_id = schemas.last().map(|s| s.id).unwrap_or(1);
                    *self.state.lock() = Some(Initialized { value_schema_id });
                    return true;
                }
                Ok(_) => {
                    warn!(attempt, "push status store has no registered schema yet");
                }
                Err(e) => {
                    warn!(attempt, error = %e, "push status store not ready yet");
                }
            }
            if attempt < INIT_ATTEMPTS {
                tokio::time::sleep(INIT_RETRY_DELAY).await;
            }
        }
        false
    }

    /// Fire-and-forget write. Logs and returns on any failure, including
    /// failure to lazily initialize -- never propagates an error to the
    /// caller.
    pub async fn write(&self, key: &str, value: &str) {
        if !self.ensure_initialized().await {
            error!("dropping push status write, producer never initialized");
            return;
        }

        let value_schema_id = {
            let guard = self.state.lock();
            guard.as_ref().map(|s| s.value_schema_id)
        };

        let Some(value_schema_id) = value_schema_id else {
            error!("dropping push status write, producer state vanished");
            return;
        };

        self.producer.send(key, value, value_schema_id).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata_store::InMemoryMetadataStore;

    #[tokio::test]
    async fn write_drops_silently_when_store_never_initializes() {
        let metadata = Arc::new(InMemoryMetadataStore::new());
        let producer = Arc::new(RecordingPushStatusProducer::new());
        let writer = PushStatusWriter::new(metadata, producer.clone());

        writer.write("key-1", "value-1").await;
        assert!(producer.sent().is_empty());
    }

    #[tokio::test]
    async fn write_succeeds_once_schema_is_registered() {
        let metadata = Arc::new(InMemoryMetadataStore::new());
        metadata
            .add_value_schema(PUSH_STATUS_STORE_NAME, "\"string\"")
            .await
            .unwrap();
        let producer = Arc::new(RecordingPushStatusProducer::new());
        let writer = PushStatusWriter::new(metadata, producer.clone());

        writer.write("key-1", "value-1").await;
        let sent = producer.sent();
        assert_eq!(sent, vec![("key-1".to_string(), "value-1".to_string(), 1)]);
    }
}
