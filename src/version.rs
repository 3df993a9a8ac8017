// SPDX-License-Identifier: GPL-3.0-or-later

//! Ordering of pack version strings such as `3.8.234` or `1.2.0-rc1`.
//!
//! A version is split on `.`, `-`, `_` and `+` into components. Numeric components compare by
//! value, text components compare lexicographically, and a numeric component is always greater
//! than a text one at the same position. A version that runs out of components sorts below one
//! that still has any.

use std::cmp::Ordering;
use std::fmt;

const SEPARATORS: &[char] = &['.', '-', '_', '+'];

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Component {
    Text(String),
    // Leading zeros stripped so that arbitrarily long numbers compare without overflowing
    Number(String),
}

impl Component {
    fn parse(s: &str) -> Self {
        if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) {
            let digits = s.trim_start_matches('0');
            let digits = if digits.is_empty() { "0" } else { digits };
            Component::Number(digits.to_string())
        } else {
            Component::Text(s.to_string())
        }
    }
}

impl Ord for Component {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Component::Number(a), Component::Number(b)) => {
                a.len().cmp(&b.len()).then_with(|| a.cmp(b))
            }
            (Component::Text(a), Component::Text(b)) => a.cmp(b),
            (Component::Number(_), Component::Text(_)) => Ordering::Greater,
            (Component::Text(_), Component::Number(_)) => Ordering::Less,
        }
    }
}

impl PartialOrd for Component {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// A parsed version. `Ord` compares the components first and falls back to the original string
/// so that two spellings of the same release still have a fixed order.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Version {
    components: Vec<Component>,
    original: String,
}

impl Version {
    pub fn parse(s: &str) -> Self {
        let components = s.split(SEPARATORS).map(Component::parse).collect();
        Self { components, original: s.to_string() }
    }

    pub fn as_str(&self) -> &str {
        &self.original
    }

    /// Component-wise comparison, ignoring how the version was spelled.
    pub fn release_cmp(&self, other: &Self) -> Ordering {
        compare_components(&self.components, &other.components)
    }
}

fn compare_components(a: &[Component], b: &[Component]) -> Ordering {
    for i in 0..a.len().max(b.len()) {
        let ord = match (a.get(i), b.get(i)) {
            (Some(x), Some(y)) => x.cmp(y),
            (Some(_), None) => Ordering::Greater,
            (None, Some(_)) => Ordering::Less,
            (None, None) => Ordering::Equal,
        };
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        self.release_cmp(other)
            .then_with(|| self.original.cmp(&other.original))
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.original)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn compare(a: &str, b: &str) -> Ordering {
        Version::parse(a).release_cmp(&Version::parse(b))
    }

    const SAMPLES: &[&str] = &[
        "", "0", "1", "01", "1.0", "1.0.0", "1.0.0-rc1", "1.0.rc1", "1.2.0", "1.10.0", "1.9.9",
        "2", "2.0-beta", "2.0-alpha", "2.0.0.0", "3.8.234", "10.0", "a", "b.1", "1..2",
        "99999999999999999999999", "100000000000000000000000",
    ];

    #[test]
    fn numeric_components_compare_by_value() {
        assert_eq!(compare("1.2.0", "1.10.0"), Ordering::Less);
        assert_eq!(compare("1.10.0", "1.9.9"), Ordering::Greater);
        assert_eq!(compare("3.8.234", "3.8.99"), Ordering::Greater);
        assert_eq!(compare("99999999999999999999999", "100000000000000000000000"), Ordering::Less);
    }

    #[test]
    fn numbers_beat_text_at_same_position() {
        assert_eq!(compare("1.0.rc1", "1.0.0"), Ordering::Less);
        assert_eq!(compare("2.0-alpha", "2.0-beta"), Ordering::Less);
        assert_eq!(compare("a", "0"), Ordering::Less);
    }

    #[test]
    fn missing_components_sort_lowest() {
        assert_eq!(compare("1.0", "1.0.0"), Ordering::Less);
        assert_eq!(compare("1", "1.0"), Ordering::Less);
        assert_eq!(compare("", "0"), Ordering::Less);
    }

    #[test]
    fn spellings_of_one_release_tie_only_on_components() {
        assert_eq!(compare("01", "1"), Ordering::Equal);
        let a = Version::parse("01");
        let b = Version::parse("1");
        assert_eq!(a.release_cmp(&b), Ordering::Equal);
        // The full order still separates them, by the original text
        assert_eq!(b.cmp(&a), Ordering::Greater);
    }

    #[test]
    fn comparison_is_reflexive() {
        for s in SAMPLES {
            assert_eq!(compare(s, s), Ordering::Equal, "{}", s);
            let v = Version::parse(s);
            assert_eq!(v.cmp(&v), Ordering::Equal);
        }
    }

    #[test]
    fn comparison_is_antisymmetric() {
        for a in SAMPLES {
            for b in SAMPLES {
                assert_eq!(compare(a, b), compare(b, a).reverse(), "{} vs {}", a, b);
                let (va, vb) = (Version::parse(a), Version::parse(b));
                assert_eq!(va.cmp(&vb), vb.cmp(&va).reverse());
                if va.cmp(&vb) == Ordering::Equal {
                    assert_eq!(a, b);
                }
            }
        }
    }

    #[test]
    fn comparison_is_transitive() {
        for a in SAMPLES {
            for b in SAMPLES {
                for c in SAMPLES {
                    let (va, vb, vc) = (Version::parse(a), Version::parse(b), Version::parse(c));
                    if va <= vb && vb <= vc {
                        assert!(va <= vc, "{} <= {} <= {}", a, b, c);
                    }
                    if compare(a, b) != Ordering::Greater && compare(b, c) != Ordering::Greater {
                        assert_ne!(compare(a, c), Ordering::Greater, "{} {} {}", a, b, c);
                    }
                }
            }
        }
    }

    #[test]
    fn sorting_picks_highest() {
        let mut versions: Vec<_> = ["1.2.0", "1.10.0", "1.9.0"].iter().map(|s| Version::parse(s)).collect();
        versions.sort();
        assert_eq!(versions.last().map(|v| v.as_str()), Some("1.10.0"));
    }
}
