use std::fmt;

const FIRST: u8 = b'A';
const LAST: u8 = b'Z';
const RADIX: u64 = (LAST - FIRST + 1) as u64;

/// A fixed-width key counted like an odometer over `'A'..='Z'`.
///
/// The last byte is the least significant digit. Incrementing never changes
/// the width, and once every digit is `'Z'` the next key is all `'A'` again.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Key(Vec<u8>);

impl Key {
    /// The all-`'A'` key of width `len`.
    pub fn first(len: usize) -> Self {
        Self(vec![FIRST; len])
    }

    /// The key reached after `index` increments from [`Key::first`].
    pub fn at(len: usize, mut index: u64) -> Self {
        let mut key = Self::first(len);
        for b in key.0.iter_mut().rev() {
            if index == 0 {
                break;
            }
            *b = FIRST + (index % RADIX) as u8;
            index /= RADIX;
        }
        key
    }

    pub fn from_bytes(bytes: impl Into<Vec<u8>>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Bumps the last byte, carrying leftward over `'Z'`.
    ///
    /// A byte outside `'A'..='Z'` is simply incremented, so keys that did not
    /// start from [`Key::first`] still move forward. When all bytes carry the
    /// key wraps to all `'A'` without any signal.
    pub fn increment(&mut self) {
        for b in self.0.iter_mut().rev() {
            if *b == LAST {
                *b = FIRST;
            } else {
                *b = b.wrapping_add(1);
                return;
            }
        }
        // every digit carried: the key is all 'A' again
    }

    pub fn next(&self) -> Self {
        let mut key = self.clone();
        key.increment();
        key
    }
}

impl AsRef<[u8]> for Key {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Key({})", String::from_utf8_lossy(&self.0))
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}

/// Yields `count` consecutive keys starting at `start`.
#[derive(Debug, Clone)]
pub struct KeySequence {
    next: Key,
    remaining: u64,
}

impl KeySequence {
    pub fn new(start: Key, count: u64) -> Self {
        Self {
            next: start,
            remaining: count,
        }
    }
}

impl Iterator for KeySequence {
    type Item = Key;

    fn next(&mut self) -> Option<Key> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        let key = self.next.clone();
        self.next.increment();
        Some(key)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let n = usize::try_from(self.remaining).unwrap_or(usize::MAX);
        (n, Some(n))
    }
}

#[test]
fn increment_keeps_width() {
    let mut key = Key::first(8);
    for _ in 0..10_000 {
        key.increment();
        assert_eq!(8, key.len());
    }
    assert_eq!(Key::at(8, 10_000), key);
}

#[test]
fn increment_carries() {
    let mut key = Key::from_bytes(&b"AAZ"[..]);
    key.increment();
    assert_eq!(b"ABA", key.as_bytes());

    let mut key = Key::from_bytes(&b"AZZZ"[..]);
    key.increment();
    assert_eq!(b"BAAA", key.as_bytes());
}

#[test]
fn all_z_wraps_to_all_a() {
    let mut key = Key::from_bytes(vec![b'Z'; 128]);
    key.increment();
    assert_eq!(Key::first(128), key);

    let mut single = Key::from_bytes(&b"Z"[..]);
    single.increment();
    assert_eq!(b"A", single.as_bytes());
}

#[test]
fn full_cycle_returns_to_first() {
    // 26^3 - 1 increments reach "ZZZ", one more wraps
    let mut key = Key::first(3);
    for _ in 0..(RADIX.pow(3) - 1) {
        key.increment();
    }
    assert_eq!(b"ZZZ", key.as_bytes());
    key.increment();
    assert_eq!(Key::first(3), key);
}

#[test]
fn sequence_is_strictly_ordered() {
    let keys: Vec<Key> = KeySequence::new(Key::first(2), RADIX * RADIX).collect();
    assert_eq!(676, keys.len());
    assert!(keys.windows(2).all(|w| w[0] < w[1]));
    assert_eq!(b"ZZ", keys[675].as_bytes());
}

#[test]
fn at_matches_repeated_increment() {
    let mut key = Key::first(4);
    for i in 0..5_000u64 {
        assert_eq!(Key::at(4, i), key, "index {i}");
        key.increment();
    }
    assert_eq!(Key::first(2), Key::at(2, RADIX * RADIX));
}

#[test]
fn non_letter_bytes_are_bumped() {
    let mut key = Key::from_bytes(&b"A0"[..]);
    key.increment();
    assert_eq!(b"A1", key.as_bytes());
    assert_eq!(b"A2", key.next().as_bytes());
}
