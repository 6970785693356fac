// 🔤 Fuzzy Text Matcher
// Normalized Levenshtein similarity for payee labels that came through OCR
// or were typed slightly differently.

use crate::db::normalize_name;

/// Default threshold for `are_similar`
pub const DEFAULT_THRESHOLD: f64 = 0.8;

/// Edit distance (insert / delete / substitute, all cost 1) over chars
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();

    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    // Two rolling rows instead of the full matrix
    let mut previous: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let substitution = previous[j] + usize::from(ca != cb);
            let insertion = current[j] + 1;
            let deletion = previous[j + 1] + 1;
            current[j + 1] = substitution.min(insertion).min(deletion);
        }
        std::mem::swap(&mut previous, &mut current);
    }

    previous[b.len()]
}

/// `1 - distance / max(len)`, in [0, 1]. Two empty strings are identical.
///
/// Computed as `(longest - distance) / longest` so ratios like 4/5 land on
/// the same f64 as the literal threshold.
pub fn similarity(a: &str, b: &str) -> f64 {
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 1.0;
    }

    let distance = levenshtein(a, b);
    (longest - distance) as f64 / longest as f64
}

/// Compare two labels after normalization (lower-case, trim)
pub fn are_similar(a: &str, b: &str, threshold: f64) -> bool {
    similarity(&normalize_name(a), &normalize_name(b)) >= threshold
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_levenshtein_known_values() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("abc", ""), 3);
        assert_eq!(levenshtein("same", "same"), 0);
        // Multi-byte chars count once
        assert_eq!(levenshtein("açougue", "acougue"), 1);
    }

    #[test]
    fn test_similarity_bounds() {
        assert_eq!(similarity("", ""), 1.0);
        assert_eq!(similarity("abc", "abc"), 1.0);
        assert_eq!(similarity("abc", "xyz"), 0.0);
        assert_eq!(similarity("", "abc"), 0.0);
    }

    #[test]
    fn test_similarity_is_symmetric() {
        let pairs = [
            ("padaria abc", "padaria abd"),
            ("posto shell", "auto posto shell"),
            ("", "x"),
            ("uber *trip", "uber trip"),
            ("café", "cafe"),
        ];

        for (a, b) in pairs {
            assert_eq!(similarity(a, b), similarity(b, a), "{} / {}", a, b);
        }
    }

    #[test]
    fn test_are_similar_normalizes() {
        assert!(are_similar("  PADARIA ABC ", "padaria abc", DEFAULT_THRESHOLD));
        // One OCR slip in eleven chars
        assert!(are_similar("Padaria ABC", "Padaria A8C", DEFAULT_THRESHOLD));
        assert!(!are_similar("Padaria ABC", "Farmacia XYZ", DEFAULT_THRESHOLD));
    }

    #[test]
    fn test_threshold_is_inclusive() {
        // distance 1 over 5 chars -> exactly 0.8
        assert!(are_similar("abcde", "abcdx", 0.8));
        assert!(!are_similar("abcde", "abcxx", 0.8));
    }
}
