//! Resources shared by every test procedure during a tick.

use core::fmt;

use crate::clock::Board;
use crate::notify::{Notification, NotificationSink, Publisher, Topic};
use crate::persist::{PersistentRegion, RecordStore, RegionError};

/// The board, the persisted record and the publisher, bundled so procedures
/// can borrow all three at once.
pub struct TestBench<B, R, S> {
    pub board: B,
    pub store: RecordStore<R>,
    pub publisher: Publisher<S>,
}

impl<B, R, S> TestBench<B, R, S>
where
    B: Board,
    R: PersistentRegion,
    S: NotificationSink,
{
    pub fn new(board: B, store: RecordStore<R>, publisher: Publisher<S>) -> Self {
        Self {
            board,
            store,
            publisher,
        }
    }

    /// Publishes on `topic`, waiting out the rate limit.
    pub fn notify(&mut self, topic: Topic, args: fmt::Arguments<'_>) {
        let notification = Notification::formatted(topic, args);
        self.publisher.publish(&mut self.board, &notification);
    }

    /// Reports a failed store on the storage topic and passes the result on.
    pub fn check_storage<T>(
        &mut self,
        what: &str,
        result: Result<T, RegionError>,
    ) -> Result<T, RegionError> {
        if let Err(error) = &result {
            self.notify(
                Topic::Storage,
                format_args!("failed to store {what}: {error}"),
            );
        }
        result
    }

    pub fn into_parts(self) -> (B, R, S) {
        (
            self.board,
            self.store.into_region(),
            self.publisher.into_sink(),
        )
    }
}
