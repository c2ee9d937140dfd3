//! Outbound notifications and the rate-limited publisher.
//!
//! The harness reports progress over a one-way channel that accepts at most
//! one message per second. [`Publisher`] enforces that limit in front of any
//! [`NotificationSink`], and [`NotificationLog`] keeps a bounded history of
//! what was sent for the console and the emulator transcript.

use core::fmt::{self, Write as _};
use core::time::Duration;

use heapless::{HistoryBuf, String};

use crate::clock::Monotonic;
use crate::config::DEFAULT_PUBLISH_INTERVAL;

/// Longest payload carried by a single notification.
pub const MAX_PAYLOAD_LEN: usize = 64;

/// Entries retained by a [`NotificationLog`] unless configured otherwise.
pub const NOTIFICATION_LOG_CAPACITY: usize = 64;

/// Monotonic identifier assigned to logged notifications.
pub type NotificationId = u32;

/// Channel label attached to each notification.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Topic {
    Suite,
    Test,
    Timing,
    Verdict,
    Tally,
    Watchdog,
    Config,
    Suspend,
    Storage,
}

impl Topic {
    /// Label used on the wire.
    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Topic::Suite => "suite",
            Topic::Test => "test",
            Topic::Timing => "timing",
            Topic::Verdict => "verdict",
            Topic::Tally => "tally",
            Topic::Watchdog => "watchdog",
            Topic::Config => "config",
            Topic::Suspend => "suspend",
            Topic::Storage => "storage",
        }
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A topic plus a bounded text payload.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct Notification {
    pub topic: Topic,
    pub payload: String<MAX_PAYLOAD_LEN>,
}

impl Notification {
    /// Builds a notification, truncating `payload` at a character boundary.
    #[must_use]
    pub fn new(topic: Topic, payload: &str) -> Self {
        let mut text = String::new();
        push_truncated(&mut text, payload);
        Self {
            topic,
            payload: text,
        }
    }

    /// Builds a notification from format arguments, truncating overflow.
    #[must_use]
    pub fn formatted(topic: Topic, args: fmt::Arguments<'_>) -> Self {
        let mut writer = TruncatingWriter {
            text: String::new(),
        };
        // The writer never reports an error; overflow is dropped.
        let _ = writer.write_fmt(args);
        Self {
            topic,
            payload: writer.text,
        }
    }
}

impl fmt::Display for Notification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.topic, self.payload)
    }
}

struct TruncatingWriter {
    text: String<MAX_PAYLOAD_LEN>,
}

impl fmt::Write for TruncatingWriter {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        push_truncated(&mut self.text, s);
        Ok(())
    }
}

fn push_truncated(text: &mut String<MAX_PAYLOAD_LEN>, input: &str) {
    for ch in input.chars() {
        if text.push(ch).is_err() {
            break;
        }
    }
}

/// Destination for published notifications. Delivery is best effort.
pub trait NotificationSink {
    fn emit(&mut self, notification: &Notification);
}

impl<T> NotificationSink for &mut T
where
    T: NotificationSink + ?Sized,
{
    fn emit(&mut self, notification: &Notification) {
        (**self).emit(notification);
    }
}

/// Admits at most one event per `min_interval`.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct RateLimiter {
    min_interval: Duration,
    last: Option<Duration>,
}

impl RateLimiter {
    #[must_use]
    pub const fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last: None,
        }
    }

    /// Time that must still pass before an event at `now` is admitted.
    #[must_use]
    pub fn wait_time(&self, now: Duration) -> Duration {
        match self.last {
            Some(last) => last.saturating_add(self.min_interval).saturating_sub(now),
            None => Duration::ZERO,
        }
    }

    /// Records an event at `now` if admitted, otherwise returns the wait.
    pub fn admit(&mut self, now: Duration) -> Result<(), Duration> {
        let wait = self.wait_time(now);
        if wait.is_zero() {
            self.last = Some(now);
            Ok(())
        } else {
            Err(wait)
        }
    }

    /// Forgets the last admitted event, e.g. after the uptime clock restarts.
    pub fn reset(&mut self) {
        self.last = None;
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_PUBLISH_INTERVAL)
    }
}

/// Error returned by [`Publisher::try_publish`].
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PublishError {
    /// The rate limit has not elapsed yet.
    Throttled { retry_after: Duration },
}

impl fmt::Display for PublishError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PublishError::Throttled { retry_after } => {
                write!(f, "throttled, retry after {} ms", retry_after.as_millis())
            }
        }
    }
}

/// Rate-limited front end shared by every component that publishes.
pub struct Publisher<S> {
    sink: S,
    limiter: RateLimiter,
    emitted: u32,
}

impl<S> Publisher<S>
where
    S: NotificationSink,
{
    pub fn new(sink: S, min_interval: Duration) -> Self {
        Self {
            sink,
            limiter: RateLimiter::new(min_interval),
            emitted: 0,
        }
    }

    /// Emits `notification` if the rate limit allows it.
    pub fn try_publish<M>(
        &mut self,
        clock: &M,
        notification: &Notification,
    ) -> Result<(), PublishError>
    where
        M: Monotonic + ?Sized,
    {
        self.limiter
            .admit(clock.uptime())
            .map_err(|retry_after| PublishError::Throttled { retry_after })?;
        self.sink.emit(notification);
        self.emitted = self.emitted.wrapping_add(1);
        Ok(())
    }

    /// Emits `notification`, delaying on `clock` until the rate limit allows it.
    pub fn publish<M>(&mut self, clock: &mut M, notification: &Notification)
    where
        M: Monotonic + ?Sized,
    {
        loop {
            match self.try_publish(clock, notification) {
                Ok(()) => return,
                Err(PublishError::Throttled { retry_after }) => clock.delay(retry_after),
            }
        }
    }

    /// Number of notifications emitted so far.
    pub fn emitted(&self) -> u32 {
        self.emitted
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn sink_mut(&mut self) -> &mut S {
        &mut self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }
}

/// Logged notification with its id and the uptime it was emitted at.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct LoggedNotification {
    pub id: NotificationId,
    pub uptime: Duration,
    pub notification: Notification,
}

/// Fixed-capacity history of emitted notifications.
///
/// The log doubles as a sink: the uptime stamp is whatever was last passed to
/// [`NotificationLog::set_uptime`], which the emulator updates every tick.
pub struct NotificationLog<const N: usize = NOTIFICATION_LOG_CAPACITY> {
    ring: HistoryBuf<LoggedNotification, N>,
    next_id: NotificationId,
    uptime: Duration,
}

impl<const N: usize> NotificationLog<N> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            ring: HistoryBuf::new(),
            next_id: 0,
            uptime: Duration::ZERO,
        }
    }

    /// Sets the uptime stamped on subsequent entries.
    pub fn set_uptime(&mut self, uptime: Duration) {
        self.uptime = uptime;
    }

    /// Appends `notification` and returns its id.
    pub fn record(&mut self, notification: &Notification) -> NotificationId {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        self.ring.write(LoggedNotification {
            id,
            uptime: self.uptime,
            notification: notification.clone(),
        });
        id
    }

    /// Entries in chronological order.
    pub fn oldest_first(&self) -> impl Iterator<Item = &LoggedNotification> + '_ {
        self.ring.oldest_ordered()
    }

    /// Entries with an id of at least `id`, oldest first.
    pub fn since(&self, id: NotificationId) -> impl Iterator<Item = &LoggedNotification> + '_ {
        self.oldest_first().filter(move |entry| entry.id >= id)
    }

    pub fn latest(&self) -> Option<&LoggedNotification> {
        self.ring.recent()
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Notifications recorded since creation, including evicted ones.
    pub fn total(&self) -> NotificationId {
        self.next_id
    }
}

impl<const N: usize> Default for NotificationLog<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<const N: usize> NotificationSink for NotificationLog<N> {
    fn emit(&mut self, notification: &Notification) {
        self.record(notification);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ManualClock {
        now: Duration,
        delays: u32,
    }

    impl ManualClock {
        fn new() -> Self {
            Self {
                now: Duration::ZERO,
                delays: 0,
            }
        }
    }

    impl Monotonic for ManualClock {
        fn uptime(&self) -> Duration {
            self.now
        }

        fn delay(&mut self, duration: Duration) {
            self.delays += 1;
            self.now += duration;
        }
    }

    #[test]
    fn payload_is_truncated_to_capacity() {
        let long = "x".repeat(MAX_PAYLOAD_LEN + 10);
        let note = Notification::new(Topic::Test, &long);
        assert_eq!(note.payload.len(), MAX_PAYLOAD_LEN);

        let formatted = Notification::formatted(Topic::Test, format_args!("{long}"));
        assert_eq!(formatted.payload.len(), MAX_PAYLOAD_LEN);
    }

    #[test]
    fn try_publish_reports_retry_after() {
        let mut clock = ManualClock::new();
        let mut publisher = Publisher::new(NotificationLog::<8>::new(), Duration::from_secs(1));
        let note = Notification::new(Topic::Suite, "hello");

        assert_eq!(publisher.try_publish(&clock, &note), Ok(()));
        clock.now = Duration::from_millis(300);
        assert_eq!(
            publisher.try_publish(&clock, &note),
            Err(PublishError::Throttled {
                retry_after: Duration::from_millis(700)
            })
        );
        assert_eq!(publisher.emitted(), 1);
    }

    #[test]
    fn blocking_publish_waits_for_the_window() {
        let mut clock = ManualClock::new();
        let mut publisher = Publisher::new(NotificationLog::<8>::new(), Duration::from_secs(1));
        let note = Notification::new(Topic::Suite, "hello");

        publisher.publish(&mut clock, &note);
        publisher.publish(&mut clock, &note);

        assert_eq!(clock.now, Duration::from_secs(1));
        assert_eq!(clock.delays, 1);
        assert_eq!(publisher.sink().len(), 2);
    }

    #[test]
    fn emissions_never_exceed_one_per_second() {
        let mut clock = ManualClock::new();
        let mut publisher = Publisher::new(NotificationLog::<64>::new(), Duration::from_secs(1));
        let note = Notification::new(Topic::Timing, "tick");

        // Offer a notification every 130 ms for 7.5 s.
        while clock.now < Duration::from_millis(7_500) {
            let _ = publisher.try_publish(&clock, &note);
            clock.now += Duration::from_millis(130);
        }

        let elapsed_secs = u32::try_from(clock.now.as_secs()).unwrap();
        assert!(publisher.emitted() <= elapsed_secs + 1);
        assert!(publisher.emitted() >= elapsed_secs - 1);
    }

    #[test]
    fn log_keeps_most_recent_entries() {
        let mut log = NotificationLog::<4>::new();
        for index in 0..6 {
            log.emit(&Notification::formatted(
                Topic::Test,
                format_args!("entry {index}"),
            ));
        }

        assert_eq!(log.len(), 4);
        assert_eq!(log.total(), 6);
        let ids: Vec<_> = log.oldest_first().map(|entry| entry.id).collect();
        assert_eq!(ids, vec![2, 3, 4, 5]);
        assert_eq!(log.since(4).count(), 2);
        assert_eq!(log.latest().unwrap().notification.payload.as_str(), "entry 5");
    }
}
