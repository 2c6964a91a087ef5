//! Opaque version clocks and keyed clock entries.

use serde::{Deserialize, Serialize};

/// Opaque version clock bytes.
///
/// The engine never interprets clock contents. Equality and the total order
/// used by set difference come from the byte representation the clock
/// library hands us.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct VersionClock(pub Vec<u8>);

impl VersionClock {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        VersionClock(bytes.into())
    }
}

/// A key paired with its version clock.
///
/// Ordered by key, then clock. Equality is the complete tuple: the same key
/// under two different clocks is two distinct entries, which is exactly what
/// the symmetric difference needs to surface.
#[derive(
    Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct KeyClock {
    pub key: Vec<u8>,
    pub clock: VersionClock,
}

impl KeyClock {
    pub fn new(key: impl Into<Vec<u8>>, clock: VersionClock) -> Self {
        KeyClock {
            key: key.into(),
            clock,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordered_by_key_then_clock() {
        let a = KeyClock::new(b"a".to_vec(), VersionClock::new([2u8]));
        let b = KeyClock::new(b"a".to_vec(), VersionClock::new([3u8]));
        let c = KeyClock::new(b"b".to_vec(), VersionClock::new([1u8]));
        assert!(a < b);
        assert!(b < c);
    }

    #[test]
    fn equality_is_the_whole_tuple() {
        let a = KeyClock::new(b"k".to_vec(), VersionClock::new([1u8]));
        let b = KeyClock::new(b"k".to_vec(), VersionClock::new([2u8]));
        assert_ne!(a, b);
    }
}
