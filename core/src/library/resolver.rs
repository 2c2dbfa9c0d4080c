//! Game id resolution from loose user input
//!
//! Host selectors and console commands hand us whatever the user typed.
//! Resolution order:
//! - exact id
//! - case-insensitive id (if unique)
//! - case-insensitive prefix (if unique)
//!
//! Anything else fails with up to three close ids as suggestions.

/// Why a selector value could not be mapped to a registered id.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectorError {
    #[error("empty game id")]
    Empty,
    #[error("game '{query}' not found")]
    NotFound {
        query: String,
        suggestions: Vec<String>,
    },
    #[error("game '{query}' is ambiguous")]
    Ambiguous {
        query: String,
        candidates: Vec<String>,
    },
}

impl SelectorError {
    /// Ids worth showing to the user alongside the error.
    pub fn hints(&self) -> &[String] {
        match self {
            SelectorError::Empty => &[],
            SelectorError::NotFound { suggestions, .. } => suggestions,
            SelectorError::Ambiguous { candidates, .. } => candidates,
        }
    }
}

/// Resolve `query` against the registered `ids`.
pub fn resolve_selector<S: AsRef<str>>(query: &str, ids: &[S]) -> Result<String, SelectorError> {
    let query = query.trim();
    if query.is_empty() {
        return Err(SelectorError::Empty);
    }

    if let Some(id) = ids.iter().map(AsRef::as_ref).find(|id| *id == query) {
        return Ok(id.to_string());
    }

    let needle = query.to_lowercase();
    let exact: Vec<&str> = ids
        .iter()
        .map(AsRef::as_ref)
        .filter(|id| id.to_lowercase() == needle)
        .collect();
    if let [only] = exact.as_slice() {
        return Ok(only.to_string());
    }

    let prefixed: Vec<&str> = ids
        .iter()
        .map(AsRef::as_ref)
        .filter(|id| id.to_lowercase().starts_with(&needle))
        .collect();

    match prefixed.as_slice() {
        [only] => Ok(only.to_string()),
        [] => Err(SelectorError::NotFound {
            query: query.to_string(),
            suggestions: similar_ids(query, ids),
        }),
        many => Err(SelectorError::Ambiguous {
            query: query.to_string(),
            candidates: many.iter().map(|id| id.to_string()).collect(),
        }),
    }
}

/// Up to three ids within edit distance 3 of `query`, closest first.
pub fn similar_ids<S: AsRef<str>>(query: &str, ids: &[S]) -> Vec<String> {
    const MAX_DISTANCE: usize = 3;

    let mut scored: Vec<(usize, &str)> = ids
        .iter()
        .map(AsRef::as_ref)
        .map(|id| (levenshtein_distance(query, id), id))
        .filter(|(distance, _)| *distance <= MAX_DISTANCE)
        .collect();
    scored.sort();
    scored.into_iter().take(3).map(|(_, id)| id.to_string()).collect()
}

/// Edit distance between two strings, single-row variant.
pub fn levenshtein_distance(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut row: Vec<usize> = (0..=b.len()).collect();

    for (i, ca) in a.chars().enumerate() {
        let mut diagonal = row[0];
        row[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let above = row[j + 1];
            let cost = usize::from(ca != *cb);
            row[j + 1] = (above + 1).min(row[j] + 1).min(diagonal + cost);
            diagonal = above;
        }
    }

    row[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    const IDS: &[&str] = &["card", "dice", "lucky-wheel", "lucky-wheel-classic"];

    #[test]
    fn test_exact_match() {
        assert_eq!(resolve_selector("dice", IDS).unwrap(), "dice");
    }

    #[test]
    fn test_case_insensitive_match() {
        assert_eq!(resolve_selector("DiCe", IDS).unwrap(), "dice");
    }

    #[test]
    fn test_unique_prefix() {
        assert_eq!(resolve_selector("ca", IDS).unwrap(), "card");
    }

    #[test]
    fn test_exact_beats_ambiguous_prefix() {
        assert_eq!(resolve_selector("lucky-wheel", IDS).unwrap(), "lucky-wheel");
    }

    #[test]
    fn test_ambiguous_prefix() {
        let err = resolve_selector("luck", IDS).unwrap_err();
        assert!(matches!(err, SelectorError::Ambiguous { .. }));
        assert_eq!(err.hints().len(), 2);
    }

    #[test]
    fn test_not_found_suggests_typos() {
        let err = resolve_selector("dcie", IDS).unwrap_err();
        assert!(err.to_string().contains("not found"));
        assert_eq!(err.hints(), ["dice".to_string()]);
    }

    #[test]
    fn test_empty_query() {
        assert_eq!(resolve_selector("  ", IDS), Err(SelectorError::Empty));
    }

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein_distance("", "abc"), 3);
        assert_eq!(levenshtein_distance("kitten", "sitting"), 3);
        assert_eq!(levenshtein_distance("dice", "dice"), 0);
    }
}
