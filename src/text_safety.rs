//! Safe-correction checks for audience text
//!
//! A correction is safe when it only touches spelling, accents, case or
//! punctuation. Two policies exist: a strict one for spelling fixes where the
//! word count must be preserved, and a lenient one for matching a model's
//! pick back onto a candidate proposal.

use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// How tokens of the two strings are compared once the global ratio passed
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TokenCheck {
    /// Same token count; every changed token must be digit-free and at
    /// least `min_ratio` similar to its counterpart.
    Aligned { min_ratio: f64 },
    /// At least `min_overlap` of the original's tokens longer than
    /// `min_len` chars must reappear in the correction, and the digits of
    /// both strings must be identical.
    Overlap { min_overlap: f64, min_len: usize },
}

/// Thresholds deciding whether a correction may replace the original
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SafetyPolicy {
    pub min_global_ratio: f64,
    pub token_check: TokenCheck,
}

/// Spelling fixes: no word added or removed, no number touched
pub const STRICT_SPELLING: SafetyPolicy = SafetyPolicy {
    min_global_ratio: 0.86,
    token_check: TokenCheck::Aligned { min_ratio: 0.5 },
};

/// Matching a model's selection back onto the candidate list
pub const LENIENT_SELECTION: SafetyPolicy = SafetyPolicy {
    min_global_ratio: 0.6,
    token_check: TokenCheck::Overlap {
        min_overlap: 0.5,
        min_len: 2,
    },
};

impl SafetyPolicy {
    /// True when `corrected` may stand in for `original`
    pub fn is_safe(&self, original: &str, corrected: &str) -> bool {
        let original = normalize(original);
        let corrected = normalize(corrected);
        if original.is_empty() || corrected.is_empty() {
            return false;
        }
        if original == corrected {
            return true;
        }
        if fold(&original) == fold(&corrected) {
            return true;
        }

        let original_tokens: Vec<&str> = original.split(' ').collect();
        let corrected_tokens: Vec<&str> = corrected.split(' ').collect();

        match self.token_check {
            TokenCheck::Aligned { min_ratio } => {
                if original_tokens.len() != corrected_tokens.len() {
                    return false;
                }
                if similarity(&original, &corrected) < self.min_global_ratio {
                    return false;
                }
                original_tokens
                    .iter()
                    .zip(&corrected_tokens)
                    .filter(|(o, c)| o != c)
                    .all(|(o, c)| {
                        !o.chars().chain(c.chars()).any(char::is_numeric)
                            && similarity(o, c) >= min_ratio
                    })
            }
            TokenCheck::Overlap {
                min_overlap,
                min_len,
            } => {
                if similarity(&original, &corrected) < self.min_global_ratio {
                    return false;
                }
                if digits(&original) != digits(&corrected) {
                    return false;
                }
                let significant: Vec<&str> = original_tokens
                    .iter()
                    .copied()
                    .filter(|t| t.chars().count() > min_len)
                    .collect();
                if significant.is_empty() {
                    return true;
                }
                let found = significant
                    .iter()
                    .filter(|t| corrected_tokens.contains(t))
                    .count();
                found as f64 / significant.len() as f64 >= min_overlap
            }
        }
    }
}

/// Trim, lowercase and collapse whitespace runs to one space
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

/// Accent-insensitive comparison key.
///
/// NFKD decomposition, combining marks removed, anything that is neither a
/// word character nor whitespace turned into a space, lowercased and
/// whitespace-collapsed.
pub fn fold(text: &str) -> String {
    let stripped: String = text
        .nfkd()
        .filter(|c| !is_combining_mark(*c))
        .map(|c| {
            if c.is_alphanumeric() || c == '_' || c.is_whitespace() {
                c
            } else {
                ' '
            }
        })
        .collect();
    normalize(&stripped)
}

fn digits(text: &str) -> String {
    text.chars().filter(|c| c.is_numeric()).collect()
}

/// Copy the capitalisation pattern of `source` onto `target`
pub fn match_word_case(source: &str, target: &str) -> String {
    let has_cased = source.chars().any(|c| c.is_lowercase() || c.is_uppercase());
    if has_cased && !source.chars().any(char::is_lowercase) {
        return target.to_uppercase();
    }
    if source.chars().next().is_some_and(char::is_uppercase) {
        let mut chars = target.chars();
        return match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        };
    }
    target.to_string()
}

/// Gestalt pattern-matching ratio, `2 * matches / total_len`, over chars.
///
/// Matches are found by recursively taking the longest common block and
/// recursing on both sides of it. Two empty strings are identical (1.0).
pub fn similarity(a: &str, b: &str) -> f64 {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }
    2.0 * matched_chars(&a, &b) as f64 / total as f64
}

fn matched_chars(a: &[char], b: &[char]) -> usize {
    let mut matched = 0;
    let mut pending = vec![(0, a.len(), 0, b.len())];

    while let Some((alo, ahi, blo, bhi)) = pending.pop() {
        let (i, j, size) = longest_block(a, b, alo, ahi, blo, bhi);
        if size == 0 {
            continue;
        }
        matched += size;
        if alo < i && blo < j {
            pending.push((alo, i, blo, j));
        }
        if i + size < ahi && j + size < bhi {
            pending.push((i + size, ahi, j + size, bhi));
        }
    }
    matched
}

/// Longest common block of `a[alo..ahi]` and `b[blo..bhi]`.
///
/// Ties go to the block starting earliest in `a`, then earliest in `b`.
fn longest_block(
    a: &[char],
    b: &[char],
    alo: usize,
    ahi: usize,
    blo: usize,
    bhi: usize,
) -> (usize, usize, usize) {
    let (mut best_i, mut best_j, mut best_size) = (alo, blo, 0);
    // run[j + 1] = length of the common run ending at (i - 1, j)
    let mut prev = vec![0usize; b.len() + 1];

    for i in alo..ahi {
        let mut cur = vec![0usize; b.len() + 1];
        for j in blo..bhi {
            if a[i] != b[j] {
                continue;
            }
            let k = prev[j] + 1;
            cur[j + 1] = k;
            if k > best_size {
                best_i = i + 1 - k;
                best_j = j + 1 - k;
                best_size = k;
            }
        }
        prev = cur;
    }
    (best_i, best_j, best_size)
}
