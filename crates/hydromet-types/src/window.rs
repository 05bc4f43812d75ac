//! Fetch windows and page cursors for paginated remote queries.

use time::OffsetDateTime;

/// Half-open `[start, end)` time range covered by one synchronization pass.
///
/// `start` is the sensor's baseline (its last-synced timestamp or a
/// configured lookback) and `end` is the moment the pass began. The
/// invariant `start <= end` always holds; an empty window means the sensor
/// has no pending work this cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchWindow {
    /// Inclusive lower bound.
    pub start: OffsetDateTime,
    /// Exclusive upper bound.
    pub end: OffsetDateTime,
}

impl FetchWindow {
    /// Build the window for a sync pass starting at `baseline`.
    ///
    /// A baseline ahead of `now` (clock skew between processes) collapses to
    /// an empty window rather than violating the ordering invariant.
    pub fn from_baseline(baseline: OffsetDateTime, now: OffsetDateTime) -> Self {
        if baseline > now {
            Self {
                start: now,
                end: now,
            }
        } else {
            Self {
                start: baseline,
                end: now,
            }
        }
    }

    /// Whether the window covers no time at all.
    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// Whether `ts` falls inside the window.
    pub fn contains(&self, ts: OffsetDateTime) -> bool {
        ts >= self.start && ts < self.end
    }
}

/// Cursor over a paginated remote result set.
///
/// Created once per sync after the count query, advanced by the page size
/// after each successful fetch, and discarded once the offset reaches the
/// total result count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageCursor {
    offset: u64,
    page_size: u16,
    total: u64,
}

impl PageCursor {
    /// Largest page the remote source will return in one call.
    pub const MAX_PAGE_SIZE: u16 = 1000;

    /// Create a cursor over `total` results, fetching `page_size` at a time.
    ///
    /// The page size is clamped into `1..=MAX_PAGE_SIZE`.
    pub fn new(total: u64, page_size: u16) -> Self {
        Self {
            offset: 0,
            page_size: page_size.clamp(1, Self::MAX_PAGE_SIZE),
            total,
        }
    }

    /// Current offset into the result set.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Number of results requested per page.
    pub fn page_size(&self) -> u16 {
        self.page_size
    }

    /// Advance past the page that was just fetched.
    pub fn advance(&mut self) {
        self.offset += u64::from(self.page_size);
    }

    /// Whether every page has been consumed.
    pub fn is_exhausted(&self) -> bool {
        self.offset >= self.total
    }
}
