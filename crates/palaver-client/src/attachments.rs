//! Attachment fetch passthrough.
//!
//! Binary transfer mechanics live behind the store boundary; this only
//! starts the fetch and hands the progress channel to the caller.

use tokio::sync::mpsc;
use tracing::debug;

use palaver_shared::AttachmentToken;
use palaver_store::{FetchEvent, ReplicaStore};

use crate::error::Result;
use crate::ChatClient;

impl ChatClient {
    /// Start an attachment transfer. Progress ticks and the final
    /// completion or failure arrive on the returned channel.
    pub fn fetch_attachment(
        &self,
        token: &AttachmentToken,
    ) -> Result<mpsc::UnboundedReceiver<FetchEvent>> {
        debug!(token = %token.as_str(), "starting attachment fetch");
        Ok(self.inner.store.fetch_attachment(token)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::client_with_store;

    #[tokio::test]
    async fn fetch_streams_progress_then_bytes() {
        let (store, client) = client_with_store();
        let token = AttachmentToken("avatar".into());
        store.insert_blob(token.clone(), vec![7, 7, 7, 7]);

        let mut rx = client.fetch_attachment(&token).unwrap();
        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }

        assert!(matches!(events[0], FetchEvent::Progress { .. }));
        assert!(matches!(
            events.last(),
            Some(FetchEvent::Complete { bytes }) if bytes == &vec![7, 7, 7, 7]
        ));
    }
}
