use std::fmt;

/// Tracks statement nesting depth during a parse.
///
/// The tracker records a high-water mark so callers can see how close a
/// query came to the limit even when it parsed successfully.
#[derive(PartialEq, Eq, Clone, Copy)]
pub struct LimitTracker {
    current: usize,
    /// High water mark for this limit.
    pub high: usize,
    /// Limit.
    pub limit: usize,
}

/// Statement trees deeper than this are rejected with a parse error.
pub const DEFAULT_NESTING_LIMIT: usize = 1023;

impl Default for LimitTracker {
    fn default() -> Self {
        Self::new(DEFAULT_NESTING_LIMIT)
    }
}

impl LimitTracker {
    pub fn new(limit: usize) -> Self {
        Self {
            current: 0,
            high: 0,
            limit,
        }
    }

    /// True once the tracked depth has reached the limit.
    pub fn limited(&self) -> bool {
        self.current >= self.limit
    }

    /// Enters one nesting level.
    pub fn consume(&mut self) {
        self.current += 1;
        if self.current > self.high {
            self.high = self.current;
        }
    }

    /// Leaves one nesting level.
    pub fn release(&mut self) {
        debug_assert!(self.current > 0);
        self.current = self.current.saturating_sub(1);
    }
}

impl fmt::Debug for LimitTracker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "nesting limit: {}, high: {}", self.limit, self.high)
    }
}
