//! Unique identifiers for synthetic class and member names.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

const DIGITS: &[u8; 36] = b"0123456789abcdefghijklmnopqrstuvwxyz";

static CLASS_TOKENS: AtomicU64 = AtomicU64::new(1);

/// A process-unique token for one class model; member ids carry it.
pub(crate) fn class_token() -> u64 {
    CLASS_TOKENS.fetch_add(1, Ordering::Relaxed)
}

/// A source of process-unique ids. The counter starts at the current time in nanoseconds, so
/// ids from separate runs are unlikely to collide either.
#[derive(Debug)]
pub struct UniqueId {
    counter: AtomicU64,
}

impl UniqueId {
    pub fn new() -> Self {
        let seed = SystemTime::now().duration_since(UNIX_EPOCH)
            .map(|elapsed| elapsed.as_nanos() as u64)
            .unwrap_or(0);
        UniqueId::starting_at(seed)
    }

    pub fn starting_at(seed: u64) -> Self {
        UniqueId { counter: AtomicU64::new(seed) }
    }

    /// The next id, in base 36.
    pub fn next(&self) -> String {
        to_base36(self.counter.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for UniqueId {
    fn default() -> Self {
        UniqueId::new()
    }
}

fn to_base36(mut value: u64) -> String {
    if value == 0 {
        return String::from("0");
    }
    let mut digits = vec![];
    while value > 0 {
        digits.push(DIGITS[(value % 36) as usize]);
        value /= 36;
    }
    digits.reverse();
    String::from_utf8_lossy(&digits).into_owned()
}

/// Appends a unique suffix to `name` if `taken` says it is already in use.
pub fn make_unique<F>(ids: &UniqueId, name: &str, taken: F) -> String
    where F: Fn(&str) -> bool
{
    if taken(name) {
        format!("{}${}", name, ids.next())
    } else {
        name.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn base36_rendering() {
        assert_eq!("0", to_base36(0));
        assert_eq!("z", to_base36(35));
        assert_eq!("10", to_base36(36));
        let ids = UniqueId::starting_at(46655);
        assert_eq!("zzz", ids.next());
        assert_eq!("1000", ids.next());
    }

    #[test]
    fn unique_names() {
        let ids = UniqueId::starting_at(0);
        assert_eq!("count", make_unique(&ids, "count", |_| false));
        assert_eq!("count$0", make_unique(&ids, "count", |name| name == "count"));
    }
}
