use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

/// How a fixed-size value buffer is filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum ValueFill {
    /// One random character repeated across the whole buffer.
    Uniform,
    /// An independent random character per byte.
    #[default]
    Random,
}

/// Produces the value written for each insert.
///
/// With no size the value is the decimal insert index; otherwise it is a
/// `size`-byte buffer of characters from `[A-Za-z0-9]`.
#[derive(Debug)]
pub struct ValueGenerator {
    size: Option<usize>,
    fill: ValueFill,
    rng: StdRng,
}

impl ValueGenerator {
    pub fn new(size: Option<usize>, fill: ValueFill, seed: u64) -> Self {
        Self {
            size,
            fill,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn value(&mut self, index: u64) -> Vec<u8> {
        let Some(size) = self.size else {
            return index.to_string().into_bytes();
        };
        match self.fill {
            ValueFill::Uniform => vec![random_char(&mut self.rng); size],
            ValueFill::Random => (0..size).map(|_| random_char(&mut self.rng)).collect(),
        }
    }
}

// class first (upper, lower, digit), then a character within it
fn random_char(rng: &mut impl Rng) -> u8 {
    match rng.gen_range(0..3) {
        0 => b'A' + rng.gen_range(0..26),
        1 => b'a' + rng.gen_range(0..26),
        _ => b'0' + rng.gen_range(0..10),
    }
}

#[test]
fn index_values() {
    let mut gen = ValueGenerator::new(None, ValueFill::Random, 0);
    assert_eq!(b"0".to_vec(), gen.value(0));
    assert_eq!(b"9999999".to_vec(), gen.value(9_999_999));
}

#[test]
fn uniform_fill_is_homogeneous() {
    let mut gen = ValueGenerator::new(Some(256), ValueFill::Uniform, 7);
    for i in 0..32 {
        let v = gen.value(i);
        assert_eq!(256, v.len());
        assert!(v.iter().all(|b| *b == v[0]));
        assert!(v[0].is_ascii_alphanumeric());
    }
}

#[test]
fn random_fill_varies_per_byte() {
    let mut gen = ValueGenerator::new(Some(4096), ValueFill::Random, 7);
    let v = gen.value(0);
    assert_eq!(4096, v.len());
    assert!(v.iter().all(u8::is_ascii_alphanumeric));
    assert!(v.iter().any(|b| *b != v[0]));
}

#[test]
fn same_seed_same_values() {
    let mut a = ValueGenerator::new(Some(64), ValueFill::Random, 42);
    let mut b = ValueGenerator::new(Some(64), ValueFill::Random, 42);
    for i in 0..8 {
        assert_eq!(a.value(i), b.value(i));
    }
}
