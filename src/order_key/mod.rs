//! Dense ordering keys for sibling entities (blocks within a page, links within a group).
//!
//! A key is a non-empty string over [`ALPHABET`]. The alphabet is listed in ascending
//! ASCII order, so the sibling order is plain byte-wise string comparison, both here and
//! in the storage layer that persists `sort_key` verbatim.
//!
//! Generated keys never end in the alphabet's first symbol: nothing sorts between `k`
//! and `k + "0"`, so such a key would leave no room for a later insert.

use leptos::logging::warn;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Ordered key alphabet: digits, upper case, lower case.
pub const ALPHABET: &[u8] = b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

const BASE: usize = ALPHABET.len();

/// Index of `'U'`, the key handed out when a list is empty.
const MID_DIGIT: usize = 30;

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum OrderKeyError {
    #[error("order key must not be empty")]
    Empty,
    #[error("order key {key:?} contains {symbol:?}, which is outside the key alphabet")]
    InvalidSymbol { key: String, symbol: char },
}

/// Sort token establishing an entity's position among its siblings.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct OrderKey(String);

fn digit(b: u8) -> Option<usize> {
    match b {
        b'0'..=b'9' => Some((b - b'0') as usize),
        b'A'..=b'Z' => Some((b - b'A') as usize + 10),
        b'a'..=b'z' => Some((b - b'a') as usize + 36),
        _ => None,
    }
}

impl OrderKey {
    pub fn parse(s: impl Into<String>) -> Result<Self, OrderKeyError> {
        let s = s.into();
        if s.is_empty() {
            return Err(OrderKeyError::Empty);
        }
        if let Some(symbol) = s.chars().find(|c| !c.is_ascii() || digit(*c as u8).is_none()) {
            return Err(OrderKeyError::InvalidSymbol { key: s, symbol });
        }
        Ok(Self(s))
    }

    /// The single-symbol key used for the first entity of an empty list.
    pub fn midpoint() -> Self {
        Self::from_digits(&[MID_DIGIT])
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// New key for an insert between `prev` and `next`; either bound may be absent
    /// (start or end of the list).
    ///
    /// Deterministic. Repeated inserts into the same gap must pass the freshly
    /// generated key back in as the new bound.
    pub fn generate(prev: Option<&OrderKey>, next: Option<&OrderKey>) -> OrderKey {
        match (prev, next) {
            (None, None) => Self::midpoint(),
            (None, Some(next)) => next.decrement(),
            (Some(prev), None) => prev.increment(),
            (Some(prev), Some(next)) if prev < next => {
                let key = Self::from_digits(&between(&prev.digits(), Some(&next.digits())));
                if !(prev < &key && &key < next) {
                    warn!("[order_key] no key fits between {prev} and {next}; using {key}");
                }
                key
            }
            (Some(prev), Some(next)) => {
                warn!("[order_key] bounds out of order ({prev} >= {next}); appending after {prev}");
                prev.increment()
            }
        }
    }

    /// Smallest-effort key sorting strictly after `self`.
    ///
    /// Bumps the last symbol below `'z'` and drops the carried positions after it
    /// (`"Az"` -> `"B"`). When every symbol is `'z'` the midpoint symbol is appended.
    pub fn increment(&self) -> OrderKey {
        let mut d = self.digits();
        while let Some(last) = d.pop() {
            if last + 1 < BASE {
                d.push(last + 1);
                return Self::from_digits(&d);
            }
        }
        let mut d = self.digits();
        d.push(MID_DIGIT);
        Self::from_digits(&d)
    }

    /// Key sorting strictly before `self`.
    ///
    /// Lowers the last symbol when that keeps it above `'0'`; otherwise falls back to the
    /// dense midpoint between the start of key space and `self`.
    pub fn decrement(&self) -> OrderKey {
        let mut d = self.digits();
        match d.last().copied() {
            Some(last) if last >= 2 => {
                let n = d.len();
                d[n - 1] = last - 1;
                Self::from_digits(&d)
            }
            _ if d.iter().all(|x| *x == 0) => {
                // All-zero keys only come from outside; a proper prefix is the only smaller key.
                if d.len() > 1 {
                    d.pop();
                } else {
                    warn!("[order_key] nothing sorts before {self}");
                }
                Self::from_digits(&d)
            }
            _ => Self::from_digits(&between(&[], Some(&d))),
        }
    }

    fn digits(&self) -> Vec<usize> {
        self.0.bytes().filter_map(digit).collect()
    }

    fn from_digits(d: &[usize]) -> Self {
        Self(d.iter().map(|x| ALPHABET[*x] as char).collect())
    }
}

/// Prefix-aware midpoint. `lo` is implicitly right-padded with the first symbol; `hi`
/// of `None` means unbounded above. Requires `lo < hi`.
fn between(lo: &[usize], hi: Option<&[usize]>) -> Vec<usize> {
    if let Some(hi) = hi {
        let mut n = 0;
        while n < hi.len() && lo.get(n).copied().unwrap_or(0) == hi[n] {
            n += 1;
        }
        if n > 0 {
            let mut out = hi[..n].to_vec();
            let lo_rest = lo.get(n..).unwrap_or(&[]);
            out.extend(between(lo_rest, Some(&hi[n..])));
            return out;
        }
    }

    if lo.is_empty() && hi.map_or(true, |h| h.is_empty()) {
        return vec![MID_DIGIT];
    }

    let lo_first = lo.first().copied().unwrap_or(0);
    let hi_first = hi.and_then(|h| h.first().copied()).unwrap_or(BASE);
    if hi_first.saturating_sub(lo_first) > 1 {
        return vec![(lo_first + hi_first) / 2];
    }

    // Adjacent first symbols.
    if let Some(hi) = hi {
        if hi.len() > 1 {
            return vec![hi[0]];
        }
    }
    let mut out = vec![lo_first];
    out.extend(between(lo.get(1..).unwrap_or(&[]), None));
    out
}

impl fmt::Display for OrderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for OrderKey {
    type Err = OrderKeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for OrderKey {
    type Error = OrderKeyError;

    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(s)
    }
}

impl From<OrderKey> for String {
    fn from(k: OrderKey) -> Self {
        k.0
    }
}
