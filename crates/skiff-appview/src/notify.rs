//! Per-board update broadcast.
//!
//! WebSocket sessions subscribe to the board they are viewing; the firehose
//! sink pings the channel whenever a record on that board changes. The
//! payload is a bare nudge, clients re-fetch board state over the HTTP API.

use skiff_types::RecordUri;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;
use tracing::trace;

const CHANNEL_CAPACITY: usize = 64;

/// Fan-out of board change notifications to live subscribers.
#[derive(Clone, Default)]
pub struct BoardNotifier {
    channels: Arc<RwLock<HashMap<RecordUri, broadcast::Sender<()>>>>,
}

impl BoardNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to changes on one board.
    pub fn subscribe(&self, board: &RecordUri) -> broadcast::Receiver<()> {
        let mut channels = self.channels.write().unwrap();
        channels
            .entry(board.clone())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Notify subscribers of a change on one board. Channels with no
    /// remaining subscribers are dropped.
    pub fn notify(&self, board: &RecordUri) {
        let mut channels = self.channels.write().unwrap();
        if let Some(tx) = channels.get(board) {
            if tx.send(()).is_err() {
                channels.remove(board);
            } else {
                trace!(%board, subscribers = tx.receiver_count(), "board change broadcast");
            }
        }
    }

    /// Number of boards with an active channel.
    pub fn board_count(&self) -> usize {
        self.channels.read().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skiff_types::{Collection, Did, RecordUri};

    fn board(rkey: &str) -> RecordUri {
        RecordUri::new(
            Did::new("did:plc:owner".to_string()).unwrap(),
            Collection::Board,
            rkey,
        )
        .unwrap()
    }

    #[tokio::test]
    async fn subscribers_receive_notifications() {
        let notifier = BoardNotifier::new();
        let mut rx1 = notifier.subscribe(&board("b1"));
        let mut rx2 = notifier.subscribe(&board("b1"));

        notifier.notify(&board("b1"));

        assert!(rx1.recv().await.is_ok());
        assert!(rx2.recv().await.is_ok());
    }

    #[tokio::test]
    async fn notifications_are_scoped_to_the_board() {
        let notifier = BoardNotifier::new();
        let mut rx = notifier.subscribe(&board("b1"));

        notifier.notify(&board("b2"));
        assert!(rx.try_recv().is_err());

        notifier.notify(&board("b1"));
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn abandoned_channels_are_pruned() {
        let notifier = BoardNotifier::new();
        let rx = notifier.subscribe(&board("b1"));
        drop(rx);

        assert_eq!(notifier.board_count(), 1);
        notifier.notify(&board("b1"));
        assert_eq!(notifier.board_count(), 0);
    }
}
