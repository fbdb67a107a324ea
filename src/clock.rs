use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;

/// Strictly increasing wall clock shared by the read and write paths.
///
/// Entry timestamps and balance `as_of` boundaries are both drawn from here,
/// so an entry recorded after a balance was derived always lands strictly
/// after that balance's `as_of`.
#[derive(Debug)]
pub struct Timeline {
    last: Mutex<DateTime<Utc>>,
}

impl Timeline {
    pub fn new() -> Self {
        Self {
            last: Mutex::new(DateTime::<Utc>::MIN_UTC),
        }
    }

    pub fn now(&self) -> DateTime<Utc> {
        let mut last = self.last.lock();
        let mut now = Utc::now();
        if now <= *last {
            now = *last + Duration::nanoseconds(1);
        }
        *last = now;
        now
    }
}

impl Default for Timeline {
    fn default() -> Self {
        Self::new()
    }
}
