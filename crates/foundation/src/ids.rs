use crate::time::unix_millis;

/// Token naming one lifecycle generation.
///
/// Keys come from a [`SessionClock`] and strictly increase. An asynchronous
/// result tagged with a key other than the current one is stale.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionKey(u64);

impl SessionKey {
    /// Placeholder held before the first generation is issued. Never issued by a clock.
    pub const NONE: SessionKey = SessionKey(0);

    pub fn get(self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for SessionKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "s{}", self.0)
    }
}

/// Issues strictly increasing [`SessionKey`]s.
///
/// Keys are timestamp based (milliseconds) but bumped past the previous key
/// when two generations start within the same millisecond or the wall clock
/// steps backwards.
#[derive(Debug, Clone)]
pub struct SessionClock {
    last: u64,
    source: fn() -> u64,
}

impl Default for SessionClock {
    fn default() -> Self {
        Self::new()
    }
}

impl SessionClock {
    pub fn new() -> Self {
        Self {
            last: 0,
            source: unix_millis,
        }
    }

    /// Clock that ignores wall time and counts 1, 2, 3, ...
    pub fn counting() -> Self {
        fn zero() -> u64 {
            0
        }
        Self {
            last: 0,
            source: zero,
        }
    }

    pub fn next(&mut self) -> SessionKey {
        let candidate = (self.source)();
        self.last = candidate.max(self.last + 1);
        SessionKey(self.last)
    }

    pub fn last(&self) -> SessionKey {
        SessionKey(self.last)
    }
}
