//! Fractional position keys for task ordering.
//!
//! A position is a base-36 string compared bytewise; a new key can always be
//! generated strictly between two existing keys without renumbering any
//! sibling. Legacy integer `order` values are expanded to positions with a
//! deterministic, order-preserving encoding so old and new tasks sort
//! together.

/// Digit alphabet for position keys. Bytewise string order equals digit order.
const DIGITS: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";

const BASE: usize = DIGITS.len();

fn digit_value(c: u8) -> usize {
    DIGITS.iter().position(|&d| d == c).unwrap_or(0)
}

/// Normalize a position key: every character must come from the digit
/// alphabet, and trailing minimum digits are stripped (`"a0"` and `"a"`
/// denote the same position, and a key ending in `'0'` has no room below
/// it for `between`). Returns `None` for keys that are malformed or all
/// minimum digits.
pub fn normalize(key: &str) -> Option<String> {
    if key.bytes().any(|c| !DIGITS.contains(&c)) {
        return None;
    }
    let trimmed = key.trim_end_matches('0');
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.to_string())
}

/// Generate a key strictly between two bounds.
///
/// `None` for the lower bound means "before everything"; `None` for the
/// upper bound means "after everything". When both bounds are given, the
/// lower must sort strictly below the upper.
///
/// An upper bound is stripped of trailing minimum digits before the
/// midpoint is taken: no key exists strictly below a trailing-`'0'`
/// suffix, so `"a10"` is bounded as `"a1"`. Bounds that differ only by
/// such a suffix denote the same position; the generated key then lands
/// after it.
pub fn between(lower: Option<&str>, upper: Option<&str>) -> String {
    let lower = lower.unwrap_or("");
    let upper = upper.map(|u| u.trim_end_matches('0')).unwrap_or("");
    if !upper.is_empty() && lower >= upper {
        return midpoint(lower, "");
    }
    midpoint(lower, upper)
}

/// A key for the first task in an empty column.
pub fn initial() -> String {
    between(None, None)
}

/// Midpoint of two keys. `a` may be empty (negative infinity); `b` may be
/// empty (positive infinity). Requires `a < b` when both are non-empty and
/// that `b` does not end in the minimum digit (`between` strips it).
fn midpoint(a: &str, b: &str) -> String {
    debug_assert!(b.is_empty() || a < b, "midpoint bounds out of order");

    if !b.is_empty() {
        // Copy the common prefix, then recurse on the differing tail.
        let ab = a.as_bytes();
        let bb = b.as_bytes();
        let mut n = 0;
        while n < bb.len() && ab.get(n).copied().unwrap_or(b'0') == bb[n] {
            n += 1;
        }
        if n > 0 {
            return format!("{}{}", &b[..n], midpoint(a.get(n..).unwrap_or(""), &b[n..]));
        }
    }

    let digit_a = a.as_bytes().first().map(|&c| digit_value(c)).unwrap_or(0);
    let digit_b = b
        .as_bytes()
        .first()
        .map(|&c| digit_value(c))
        .unwrap_or(BASE);

    if digit_b - digit_a > 1 {
        let mid = (digit_a + digit_b + 1) / 2;
        return (DIGITS[mid] as char).to_string();
    }

    // Consecutive first digits: descend below b or extend past a.
    if b.len() > 1 {
        return (b.as_bytes()[0] as char).to_string();
    }
    format!(
        "{}{}",
        DIGITS[digit_a] as char,
        midpoint(a.get(1..).unwrap_or(""), "")
    )
}

/// Digit alphabet for legacy-order expansion. Excludes `0` so an expanded
/// key never ends in the minimum digit, which would break `between` when a
/// legacy key is used as an upper bound.
const ORDER_DIGITS: &[u8] = b"123456789abcdefghijklmnopqrstuvwxyz";

/// Expand a deprecated integer `order` into a position key.
///
/// Encoding is length-prefixed base-35: one letter carrying the digit count
/// (`a` = 1 digit, `b` = 2, ...) followed by the digits, so derived keys sort
/// identically to the integers for any magnitude. Negative legacy orders were
/// never written by released clients; they clamp to zero.
pub fn from_order(order: i64) -> String {
    let base = ORDER_DIGITS.len() as u64;
    let mut n = order.max(0) as u64;
    let mut digits = Vec::new();
    loop {
        digits.push(ORDER_DIGITS[(n % base) as usize]);
        n /= base;
        if n == 0 {
            break;
        }
    }
    digits.reverse();
    let prefix = (b'a' + (digits.len() as u8 - 1)) as char;
    format!("{}{}", prefix, String::from_utf8(digits).expect("ascii digits"))
}
