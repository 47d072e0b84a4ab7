//! Bridge from notify's callback to channels the dispatcher can `select!` on.

use crossbeam_channel::{Receiver, Sender, unbounded};
use notify::{Event, RecommendedWatcher, recommended_watcher};

/// Receiving side of the watcher: raw events and backend errors.
pub struct WatchStreams {
    pub events: Receiver<Event>,
    pub errors: Receiver<notify::Error>,
}

/// Sending side, owned by the watcher callback (or a test).
#[derive(Clone)]
pub struct WatchSenders {
    pub events: Sender<Event>,
    pub errors: Sender<notify::Error>,
}

impl WatchStreams {
    pub fn channel() -> (WatchSenders, WatchStreams) {
        let (events_tx, events_rx) = unbounded();
        let (errors_tx, errors_rx) = unbounded();
        (
            WatchSenders {
                events: events_tx,
                errors: errors_tx,
            },
            WatchStreams {
                events: events_rx,
                errors: errors_rx,
            },
        )
    }
}

/// Platform watcher that forwards everything into `senders`. Nothing is watched until
/// directories are added through the watch set. The streams end when the watcher is dropped.
pub fn create_fs_watcher(senders: WatchSenders) -> notify::Result<RecommendedWatcher> {
    recommended_watcher(move |res: notify::Result<Event>| match res {
        Ok(event) => {
            let _ = senders.events.send(event);
        }
        Err(err) => {
            let _ = senders.errors.send(err);
        }
    })
}
