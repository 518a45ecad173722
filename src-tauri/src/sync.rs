//! Full-snapshot document sync over the sessions' data channels.
//!
//! A local edit sends the whole markup on every open channel. A message
//! from a peer replaces the whole local document, whatever it held before:
//! there is no version check, so the last message received wins, even if it
//! was sent earlier than one already applied.

use tokio::sync::watch;

use crate::document::{Document, DocumentHandle, Origin, Revision};
use crate::peer::state::SessionTable;

pub struct DocumentSync {
    document: DocumentHandle,
    sessions: SessionTable,
}

impl DocumentSync {
    pub fn new(document: DocumentHandle, sessions: SessionTable) -> Self {
        Self { document, sessions }
    }

    pub fn document(&self) -> Document {
        self.document.snapshot()
    }

    pub fn handle(&self) -> &DocumentHandle {
        &self.document
    }

    pub fn subscribe(&self) -> watch::Receiver<Revision> {
        self.document.subscribe()
    }

    /// Stores the local edit and broadcasts it. Returns how many channels
    /// accepted the snapshot.
    pub async fn on_local_change(&self, document: Document) -> usize {
        self.publish(document, Origin::Local).await
    }

    /// Replaces the local document and sends it on every open channel of
    /// every tracked session. A failing channel does not stop the others.
    pub async fn publish(&self, document: Document, origin: Origin) -> usize {
        let markup = document.markup().to_string();
        self.document.replace(document, origin);

        let channels = self.sessions.open_channels();
        let mut delivered = 0;
        for (session, dc) in channels {
            match dc.send_text(markup.clone()).await {
                Ok(_) => delivered += 1,
                Err(e) => tracing::warn!("sync to session {session} failed: {e}"),
            }
        }
        tracing::debug!("broadcast {} bytes to {delivered} channel(s)", markup.len());
        delivered
    }

    /// Replaces the local document with a peer's snapshot, unconditionally.
    pub fn on_remote_message(&self, session: &str, payload: String) {
        tracing::debug!("snapshot of {} bytes from session {session}", payload.len());
        self.document
            .replace(Document::new(payload), Origin::Remote(session.to_string()));
    }
}
