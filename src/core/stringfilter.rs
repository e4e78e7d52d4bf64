// src/core/stringfilter.rs

//! Probabilistic string set used to suppress duplicate names.
//!
//! Membership answers may be false positives (a new name reported as seen)
//! but never false negatives while the filter lives.

use bitvec::prelude::*;
use std::f64::consts::LN_2;
use std::io::Cursor;

/// False positive rate the filter is sized for.
pub const DEFAULT_FALSE_POSITIVE_RATE: f64 = 0.01;

#[derive(Debug, Clone)]
pub struct BloomFilter {
    bits: BitVec<u8, Lsb0>,
    // number of hash functions
    k: usize,
    // size in bits
    m: usize,
    // elements inserted
    n: usize,
}

impl BloomFilter {
    pub fn new(m: usize, k: usize) -> Self {
        let m = m.max(1);
        Self {
            bits: bitvec![u8, Lsb0; 0; m],
            k: k.max(1),
            m,
            n: 0,
        }
    }

    /// Sizes the filter for `expected` elements at [`DEFAULT_FALSE_POSITIVE_RATE`].
    pub fn with_capacity(expected: usize) -> Self {
        let (m, k) = optimal_parameters(expected, DEFAULT_FALSE_POSITIVE_RATE);
        Self::new(m, k)
    }

    /// Returns true if `s` may have been inserted before.
    pub fn has(&self, s: &str) -> bool {
        hash_positions(s.as_bytes(), self.k, self.m)
            .into_iter()
            .all(|pos| self.bits[pos])
    }

    /// Inserts `s` and reports whether it was already present.
    pub fn duplicate(&mut self, s: &str) -> bool {
        let mut present = true;
        for pos in hash_positions(s.as_bytes(), self.k, self.m) {
            if !self.bits[pos] {
                present = false;
                self.bits.set(pos, true);
            }
        }
        if !present {
            self.n += 1;
        }
        present
    }

    pub fn len(&self) -> usize {
        self.n
    }

    pub fn is_empty(&self) -> bool {
        self.n == 0
    }
}

/// m = -n*ln(p) / ln(2)^2, k = (m/n) * ln(2)
fn optimal_parameters(expected: usize, fpr: f64) -> (usize, usize) {
    if expected == 0 {
        return (1, 1);
    }
    let n = expected as f64;
    let m = (-n * fpr.ln() / (LN_2 * LN_2)).ceil() as usize;
    let k = ((m as f64 / n) * LN_2).round() as usize;
    (m, k.clamp(1, 32))
}

fn murmur_hash(element: &[u8], seed: u32) -> u64 {
    let mut cursor = Cursor::new(element);
    murmur3::murmur3_x64_128(&mut cursor, seed).unwrap_or(0) as u64
}

// Double hashing: h(i) = h1 + i * h2
fn hash_positions(element: &[u8], k: usize, m: usize) -> Vec<usize> {
    let h1 = murmur_hash(element, 0);
    let h2 = murmur_hash(element, 1);

    (0..k)
        .map(|i| (h1.wrapping_add((i as u64).wrapping_mul(h2)) % m as u64) as usize)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_reports_second_insert() {
        let mut filter = BloomFilter::with_capacity(1000);

        assert!(!filter.duplicate("www.example.comtrue"));
        assert!(filter.duplicate("www.example.comtrue"));
        assert_eq!(filter.len(), 1);
    }

    #[test]
    fn has_does_not_insert() {
        let mut filter = BloomFilter::with_capacity(1000);

        assert!(!filter.has("mail.example.com"));
        assert!(!filter.has("mail.example.com"));
        assert!(!filter.duplicate("mail.example.com"));
        assert!(filter.has("mail.example.com"));
    }

    #[test]
    fn no_false_negatives_in_bulk() {
        let mut filter = BloomFilter::with_capacity(5000);
        let names: Vec<String> = (0..5000).map(|i| format!("host{i}.example.com")).collect();
        for name in &names {
            filter.duplicate(name);
        }

        for name in &names {
            assert!(filter.has(name), "false negative for {name}");
        }
    }

    #[test]
    fn false_positive_rate_is_bounded() {
        let mut filter = BloomFilter::with_capacity(1000);
        for i in 0..1000 {
            filter.duplicate(&format!("seen{i}.example.com"));
        }

        let false_positives = (0..20_000)
            .filter(|i| filter.has(&format!("unseen{i}.example.org")))
            .count();
        let rate = false_positives as f64 / 20_000.0;

        assert!(
            rate <= DEFAULT_FALSE_POSITIVE_RATE * 2.0,
            "observed false positive rate {rate}"
        );
    }

    #[test]
    fn optimal_parameters_match_textbook_values() {
        // n=100, p=0.01 gives m≈959, k≈7
        let (m, k) = optimal_parameters(100, 0.01);
        assert!((900..=1000).contains(&m), "m={m}");
        assert!((6..=8).contains(&k), "k={k}");
        assert_eq!(optimal_parameters(0, 0.01), (1, 1));
    }
}
