//! Typed access to the persisted test record.
//!
//! The record is the only state that survives deep sleep and power-off, so
//! every store goes straight to the backing [`PersistentRegion`] and every
//! load is bounds-checked against the legal range before it is trusted.
//!
//! Layout v1 (little-endian):
//!
//! | Field           | Offset | Size |
//! |-----------------|--------|------|
//! | current index   | 0x00   | 1    |
//! | interval start  | 0x01   | 4    |
//! | pass count      | 0x05   | 1    |
//! | test duration   | 0x06   | 2    |
//! | layout version  | 0x08   | 1    |

use core::fmt;

use crate::clock::Timestamp;
use crate::config::{DEFAULT_TEST_DURATION_SECS, MAX_TEST_DURATION_SECS};

/// Version byte written alongside the record.
pub const LAYOUT_VERSION: u8 = 1;
pub const INDEX_OFFSET: usize = 0x00;
pub const STARTED_AT_OFFSET: usize = 0x01;
pub const PASS_COUNT_OFFSET: usize = 0x05;
pub const DURATION_OFFSET: usize = 0x06;
pub const VERSION_OFFSET: usize = 0x08;
/// Number of bytes the record occupies in the region.
pub const RECORD_LEN: usize = 0x09;

/// Bit pattern of erased storage.
const ERASED_WORD: u32 = u32::MAX;

/// Failure reported by a persistent region.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum RegionError {
    /// The access falls outside the region.
    OutOfBounds { offset: usize, len: usize },
    /// The underlying device rejected the access.
    Device,
}

impl fmt::Display for RegionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RegionError::OutOfBounds { offset, len } => {
                write!(f, "access {offset:#04x}+{len} out of bounds")
            }
            RegionError::Device => f.write_str("device error"),
        }
    }
}

/// Byte-addressable storage that survives power loss.
///
/// `write` must not return before the data is durable.
pub trait PersistentRegion {
    /// Number of addressable bytes.
    fn capacity(&self) -> usize;

    /// Fills `buf` from `offset`.
    fn read(&self, offset: usize, buf: &mut [u8]) -> Result<(), RegionError>;

    /// Writes `data` at `offset`.
    fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), RegionError>;
}

impl<T> PersistentRegion for &mut T
where
    T: PersistentRegion + ?Sized,
{
    fn capacity(&self) -> usize {
        (**self).capacity()
    }

    fn read(&self, offset: usize, buf: &mut [u8]) -> Result<(), RegionError> {
        (**self).read(offset, buf)
    }

    fn write(&mut self, offset: usize, data: &[u8]) -> Result<(), RegionError> {
        (**self).write(offset, data)
    }
}

/// In-memory view of the persisted record.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub struct TestRecord {
    pub current_index: u8,
    pub started_at: Timestamp,
    pub pass_count: u8,
    pub duration_secs: u16,
}

impl TestRecord {
    /// Record at the beginning of a run.
    #[must_use]
    pub const fn fresh(duration_secs: u16) -> Self {
        Self {
            current_index: 0,
            started_at: Timestamp::UNSET,
            pass_count: 0,
            duration_secs,
        }
    }

    /// Returns `true` while a timed interval has begun but not been verified.
    #[must_use]
    pub const fn interval_open(&self) -> bool {
        !self.started_at.is_unset()
    }

    fn encode(&self) -> [u8; RECORD_LEN] {
        let mut bytes = [0u8; RECORD_LEN];
        bytes[INDEX_OFFSET] = self.current_index;
        bytes[STARTED_AT_OFFSET..PASS_COUNT_OFFSET]
            .copy_from_slice(&self.started_at.as_secs().to_le_bytes());
        bytes[PASS_COUNT_OFFSET] = self.pass_count;
        bytes[DURATION_OFFSET..VERSION_OFFSET].copy_from_slice(&self.duration_secs.to_le_bytes());
        bytes[VERSION_OFFSET] = LAYOUT_VERSION;
        bytes
    }
}

impl Default for TestRecord {
    fn default() -> Self {
        Self::fresh(DEFAULT_TEST_DURATION_SECS)
    }
}

/// State of the layout version byte found at open time.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum LayoutStatus {
    /// The region carries a record in the current layout.
    Current,
    /// First boot, erased storage or a different layout version.
    Foreign(u8),
    /// The version byte could not be read.
    Unreadable,
}

/// Typed accessor over a [`PersistentRegion`].
///
/// `test_count` is the length of the active plan and bounds both the current
/// index (`0..=test_count + 1`) and the pass count (`0..=test_count`).
pub struct RecordStore<R> {
    region: R,
    test_count: u8,
    layout: LayoutStatus,
}

impl<R> RecordStore<R>
where
    R: PersistentRegion,
{
    /// Wraps `region`, inspecting its layout version.
    pub fn open(region: R, test_count: u8) -> Self {
        let mut version = [0u8; 1];
        let layout = match region.read(VERSION_OFFSET, &mut version) {
            Ok(()) if version[0] == LAYOUT_VERSION => LayoutStatus::Current,
            Ok(()) => LayoutStatus::Foreign(version[0]),
            Err(_) => LayoutStatus::Unreadable,
        };

        Self {
            region,
            test_count,
            layout,
        }
    }

    /// Layout status observed at open time (or after [`Self::initialize`]).
    pub fn layout(&self) -> LayoutStatus {
        self.layout
    }

    /// Highest legal current index (the reporting state).
    pub fn max_index(&self) -> u8 {
        self.test_count.saturating_add(1)
    }

    /// Overwrites the region with `record` in the current layout.
    pub fn initialize(&mut self, record: &TestRecord) -> Result<(), RegionError> {
        self.region.write(INDEX_OFFSET, &record.encode())?;
        self.layout = LayoutStatus::Current;
        Ok(())
    }

    /// Loads the current test index, clamping illegal values to `0`.
    pub fn load_index(&self) -> u8 {
        match self.read_array::<1>(INDEX_OFFSET) {
            Some([index]) if index <= self.max_index() => index,
            _ => 0,
        }
    }

    pub fn store_index(&mut self, index: u8) -> Result<(), RegionError> {
        self.region.write(INDEX_OFFSET, &[index])
    }

    /// Loads the interval start, treating erased storage as the sentinel.
    pub fn load_started_at(&self) -> Timestamp {
        match self.read_array::<4>(STARTED_AT_OFFSET) {
            Some(bytes) => match u32::from_le_bytes(bytes) {
                ERASED_WORD => Timestamp::UNSET,
                secs => Timestamp::from_secs(secs),
            },
            None => Timestamp::UNSET,
        }
    }

    pub fn store_started_at(&mut self, started_at: Timestamp) -> Result<(), RegionError> {
        self.region
            .write(STARTED_AT_OFFSET, &started_at.as_secs().to_le_bytes())
    }

    /// Loads the pass count, falling back to `0` when it exceeds the plan.
    pub fn load_pass_count(&self) -> u8 {
        match self.read_array::<1>(PASS_COUNT_OFFSET) {
            Some([count]) if count <= self.test_count => count,
            _ => 0,
        }
    }

    pub fn store_pass_count(&mut self, count: u8) -> Result<(), RegionError> {
        self.region.write(PASS_COUNT_OFFSET, &[count])
    }

    /// Loads the test duration, falling back to the default when out of range.
    pub fn load_duration(&self) -> u16 {
        match self.read_array::<2>(DURATION_OFFSET) {
            Some(bytes) => match u16::from_le_bytes(bytes) {
                secs if secs <= MAX_TEST_DURATION_SECS => secs,
                _ => DEFAULT_TEST_DURATION_SECS,
            },
            None => DEFAULT_TEST_DURATION_SECS,
        }
    }

    pub fn store_duration(&mut self, secs: u16) -> Result<(), RegionError> {
        self.region.write(DURATION_OFFSET, &secs.to_le_bytes())
    }

    /// Loads every field with its bounds check applied.
    pub fn load_record(&self) -> TestRecord {
        TestRecord {
            current_index: self.load_index(),
            started_at: self.load_started_at(),
            pass_count: self.load_pass_count(),
            duration_secs: self.load_duration(),
        }
    }

    /// Returns the raw index byte without clamping.
    pub fn raw_index(&self) -> Option<u8> {
        self.read_array::<1>(INDEX_OFFSET).map(|[index]| index)
    }

    /// Borrows the backing region.
    pub fn region(&self) -> &R {
        &self.region
    }

    /// Mutably borrows the backing region.
    pub fn region_mut(&mut self) -> &mut R {
        &mut self.region
    }

    /// Consumes the store and returns the backing region.
    pub fn into_region(self) -> R {
        self.region
    }

    fn read_array<const N: usize>(&self, offset: usize) -> Option<[u8; N]> {
        if self.layout != LayoutStatus::Current {
            return None;
        }

        let mut bytes = [0u8; N];
        self.region.read(offset, &mut bytes).ok()?;
        Some(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::SimRegion;

    const TESTS: u8 = 5;

    fn initialized_store() -> RecordStore<SimRegion> {
        let mut store = RecordStore::open(SimRegion::erased(), TESTS);
        store
            .initialize(&TestRecord::default())
            .expect("initialize record");
        store
    }

    #[test]
    fn erased_region_loads_defaults() {
        let store = RecordStore::open(SimRegion::erased(), TESTS);
        assert_eq!(store.layout(), LayoutStatus::Foreign(0xFF));
        assert_eq!(store.load_record(), TestRecord::default());
    }

    #[test]
    fn record_bytes_follow_documented_layout() {
        let mut store = initialized_store();
        store.store_index(3).unwrap();
        store
            .store_started_at(Timestamp::from_secs(0x0102_0304))
            .unwrap();
        store.store_pass_count(2).unwrap();
        store.store_duration(0x0E10).unwrap();

        let bytes = store.region().bytes();
        assert_eq!(
            &bytes[..RECORD_LEN],
            &[0x03, 0x04, 0x03, 0x02, 0x01, 0x02, 0x10, 0x0E, LAYOUT_VERSION]
        );
    }

    #[test]
    fn out_of_range_index_clamps_to_zero() {
        let mut store = initialized_store();

        store.store_index(TESTS + 1).unwrap();
        assert_eq!(store.load_index(), TESTS + 1);

        store.store_index(TESTS + 2).unwrap();
        assert_eq!(store.load_index(), 0);

        store.store_index(0xFF).unwrap();
        assert_eq!(store.load_index(), 0);
    }

    #[test]
    fn out_of_range_pass_count_and_duration_fall_back() {
        let mut store = initialized_store();
        store.store_pass_count(TESTS + 1).unwrap();
        store.store_duration(MAX_TEST_DURATION_SECS + 1).unwrap();

        assert_eq!(store.load_pass_count(), 0);
        assert_eq!(store.load_duration(), DEFAULT_TEST_DURATION_SECS);
    }

    #[test]
    fn erased_start_word_reads_as_sentinel() {
        let mut store = initialized_store();
        store
            .store_started_at(Timestamp::from_secs(u32::MAX))
            .unwrap();
        assert!(store.load_started_at().is_unset());
    }

    #[test]
    fn stores_are_visible_to_a_reopened_store() {
        let mut store = initialized_store();
        store.store_index(4).unwrap();
        store
            .store_started_at(Timestamp::from_secs(1_700_000_000))
            .unwrap();

        let reopened = RecordStore::open(store.into_region(), TESTS);
        assert_eq!(reopened.layout(), LayoutStatus::Current);
        assert_eq!(reopened.load_index(), 4);
        assert_eq!(
            reopened.load_started_at(),
            Timestamp::from_secs(1_700_000_000)
        );
    }
}
