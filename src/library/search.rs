//! Typo-tolerant search over titles and series names.
//!
//! Scores follow a distance convention: `0.0` is an exact substring hit, `1.0` shares
//! nothing with the query. A hit's distance is the approximate-substring edit distance of
//! the query against a field, divided by the query length.

use crate::library::media::MediaItem;
use fuzzy_matcher::FuzzyMatcher;
use fuzzy_matcher::skim::SkimMatcherV2;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;

/// One search result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// The matching item.
    pub item: MediaItem,
    /// Normalized distance, lower is better.
    pub score: f64,
}

struct Entry {
    item: MediaItem,
    /// Lowercased searchable fields: the title, plus the series name for episodes.
    fields: Vec<Vec<char>>,
}

/// Search structure built from a snapshot of the library.
pub struct SearchIndex {
    entries: Vec<Entry>,
    threshold: f64,
}

impl SearchIndex {
    /// Index the given items; hits farther than `threshold` are never returned.
    pub fn build<'a>(items: impl IntoIterator<Item = &'a MediaItem>, threshold: f64) -> Self {
        let entries = items
            .into_iter()
            .map(|item| {
                let mut fields = vec![lowercase_chars(&item.title)];
                if let Some(series) = item.series_name()
                    && series != item.title
                {
                    fields.push(lowercase_chars(series));
                }
                Entry {
                    item: item.clone(),
                    fields,
                }
            })
            .collect();

        Self { entries, threshold }
    }

    /// Empty index.
    pub fn empty(threshold: f64) -> Self {
        Self {
            entries: Vec::new(),
            threshold,
        }
    }

    /// Number of indexed items.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is indexed.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum distance a hit may have.
    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Find items matching `query`, best first.
    pub fn search(&self, query: &str) -> Vec<SearchHit> {
        let query = query.trim();
        if query.is_empty() {
            return Vec::new();
        }

        let pattern = lowercase_chars(query);
        let matcher = SkimMatcherV2::default().ignore_case();

        let mut ranked: Vec<(SearchHit, i64)> = self
            .entries
            .iter()
            .filter_map(|entry| {
                let score = entry
                    .fields
                    .iter()
                    .map(|field| normalized_distance(&pattern, field))
                    .fold(f64::INFINITY, f64::min);
                if score > self.threshold {
                    return None;
                }

                let affinity = std::iter::once(entry.item.title.as_str())
                    .chain(entry.item.series_name())
                    .filter_map(|field| matcher.fuzzy_match(field, query))
                    .max()
                    .unwrap_or(0);

                Some((
                    SearchHit {
                        item: entry.item.clone(),
                        score,
                    },
                    affinity,
                ))
            })
            .collect();

        ranked.sort_by(|(a, a_affinity), (b, b_affinity)| {
            a.score
                .partial_cmp(&b.score)
                .unwrap_or(Ordering::Equal)
                .then_with(|| b_affinity.cmp(a_affinity))
                .then_with(|| a.item.title.cmp(&b.item.title))
                .then_with(|| a.item.path.cmp(&b.item.path))
        });

        ranked.into_iter().map(|(hit, _)| hit).collect()
    }
}

fn lowercase_chars(s: &str) -> Vec<char> {
    s.chars().flat_map(char::to_lowercase).collect()
}

/// Edit distance between `pattern` and its best-matching substring of `text`, scaled to
/// `0.0..=1.0` by the pattern length.
fn normalized_distance(pattern: &[char], text: &[char]) -> f64 {
    if pattern.is_empty() {
        return 0.0;
    }
    let distance = substring_distance(pattern, text);
    (distance as f64 / pattern.len() as f64).min(1.0)
}

/// Sellers' algorithm: like Levenshtein, but a match may start anywhere in `text`.
fn substring_distance(pattern: &[char], text: &[char]) -> usize {
    // column[i] = distance of pattern[..i] ending at the current text position
    let mut column: Vec<usize> = (0..=pattern.len()).collect();
    let mut best = column[pattern.len()];

    for &t in text {
        let mut diagonal = column[0];
        column[0] = 0;
        for (i, &p) in pattern.iter().enumerate() {
            let substitution = diagonal + usize::from(p != t);
            let deletion = column[i + 1] + 1;
            let insertion = column[i] + 1;
            diagonal = column[i + 1];
            column[i + 1] = substitution.min(deletion).min(insertion);
        }
        best = best.min(column[pattern.len()]);
    }

    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chars(s: &str) -> Vec<char> {
        s.chars().collect()
    }

    #[test]
    fn test_substring_distance_exact() {
        assert_eq!(substring_distance(&chars("office"), &chars("the office us")), 0);
    }

    #[test]
    fn test_substring_distance_typos() {
        assert_eq!(substring_distance(&chars("ofice"), &chars("the office")), 1);
        assert_eq!(substring_distance(&chars("brekaing"), &chars("breaking bad")), 2);
        assert_eq!(substring_distance(&chars("xyz"), &chars("abc")), 3);
    }

    #[test]
    fn test_substring_distance_empty_text() {
        assert_eq!(substring_distance(&chars("abc"), &[]), 3);
    }

    #[test]
    fn test_normalized_distance_caps_at_one() {
        assert_eq!(normalized_distance(&chars("abcd"), &chars("zz")), 1.0);
        assert_eq!(normalized_distance(&chars("show"), &chars("show")), 0.0);
    }
}
