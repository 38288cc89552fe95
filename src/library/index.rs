//! In-memory library index and its movie/series projection.

use crate::library::media::{MediaItem, MediaKind, Series};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::path::Path;

/// Grouped snapshot of the library.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LibraryView {
    /// Movies sorted by title.
    pub movies: Vec<MediaItem>,
    /// Series sorted by name.
    pub series: Vec<Series>,
}

/// Library totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibraryStats {
    /// Number of movies.
    pub total_movies: usize,
    /// Number of distinct series.
    pub total_series: usize,
    /// Number of episodes across all series.
    pub total_episodes: usize,
    /// Movies plus episodes.
    pub total_files: usize,
    /// Sum of file sizes in bytes over movies and episodes.
    pub total_size: u64,
}

/// All media items currently known, keyed by id.
#[derive(Debug, Default)]
pub struct LibraryIndex {
    items: HashMap<String, MediaItem>,
}

impl LibraryIndex {
    /// Create an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace everything with the result of a full scan.
    pub fn apply_full_scan(&mut self, items: impl IntoIterator<Item = MediaItem>) {
        self.items = items
            .into_iter()
            .map(|item| (item.id.clone(), item))
            .collect();
    }

    /// Insert or replace one item. Returns the item it replaced, if any.
    pub fn upsert(&mut self, item: MediaItem) -> Option<MediaItem> {
        self.items.insert(item.id.clone(), item)
    }

    /// Remove every item at `path` or below it. Returns how many were removed.
    pub fn remove(&mut self, path: &Path) -> usize {
        let before = self.items.len();
        self.items.retain(|_, item| !item.path.starts_with(path));
        before - self.items.len()
    }

    /// Look up an item by id.
    pub fn get(&self, id: &str) -> Option<&MediaItem> {
        self.items.get(id)
    }

    /// Iterate over all items in no particular order.
    pub fn items(&self) -> impl Iterator<Item = &MediaItem> {
        self.items.values()
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the index is empty.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Group items into movies and series.
    ///
    /// `last_watched` resolves an item id to the time its progress was last updated.
    pub fn view<F>(&self, last_watched: F) -> LibraryView
    where
        F: Fn(&str) -> Option<DateTime<Utc>>,
    {
        let mut movies = Vec::new();
        let mut grouped: BTreeMap<&str, Vec<&MediaItem>> = BTreeMap::new();

        for item in self.items.values() {
            match &item.kind {
                MediaKind::Movie => movies.push(item.clone()),
                MediaKind::Episode { series_name, .. } => {
                    grouped.entry(series_name.as_str()).or_default().push(item)
                }
            }
        }

        movies.sort_by(|a, b| {
            natord_compare(&a.title, &b.title).then_with(|| a.path.cmp(&b.path))
        });

        let mut series: Vec<Series> = grouped
            .into_iter()
            .map(|(name, episodes)| build_series(name, episodes, &last_watched))
            .collect();
        series.sort_by(|a, b| {
            natord_compare(&a.name, &b.name).then_with(|| a.name.cmp(&b.name))
        });

        // Names differing only in case or spacing share a slug
        let mut slug_counts: HashMap<String, usize> = HashMap::new();
        for s in &series {
            *slug_counts.entry(s.id.clone()).or_default() += 1;
        }
        for s in &mut series {
            if slug_counts.get(&s.id).is_some_and(|&n| n > 1) {
                s.id = Series::unique_slug(&s.name);
            }
        }

        LibraryView { movies, series }
    }

    /// Count movies, series, episodes and bytes.
    pub fn stats(&self) -> LibraryStats {
        let mut stats = LibraryStats::default();
        let mut series_names = BTreeSet::new();

        for item in self.items.values() {
            match &item.kind {
                MediaKind::Movie => stats.total_movies += 1,
                MediaKind::Episode { series_name, .. } => {
                    stats.total_episodes += 1;
                    series_names.insert(series_name.as_str());
                }
            }
            stats.total_size += item.file_size;
        }

        stats.total_series = series_names.len();
        stats.total_files = stats.total_movies + stats.total_episodes;
        stats
    }

    /// Most recently created items first.
    pub fn recently_added(&self, limit: usize) -> Vec<MediaItem> {
        let mut items: Vec<&MediaItem> = self.items.values().collect();
        items.sort_by(|a, b| b.created.cmp(&a.created).then_with(|| a.path.cmp(&b.path)));
        items.into_iter().take(limit).cloned().collect()
    }
}

fn build_series<F>(name: &str, episodes: Vec<&MediaItem>, last_watched: &F) -> Series
where
    F: Fn(&str) -> Option<DateTime<Utc>>,
{
    let mut episodes: Vec<MediaItem> = episodes.into_iter().cloned().collect();
    episodes.sort_by(|a, b| {
        episode_numbers(a)
            .cmp(&episode_numbers(b))
            .then_with(|| a.path.cmp(&b.path))
    });

    let seasons: BTreeSet<u32> = episodes.iter().map(|e| episode_numbers(e).0).collect();
    let last_watched = episodes.iter().filter_map(|e| last_watched(&e.id)).max();

    Series {
        id: Series::slug(name),
        name: name.to_string(),
        total_episodes: episodes.len(),
        seasons: seasons.into_iter().collect(),
        last_watched,
        episodes,
    }
}

fn episode_numbers(item: &MediaItem) -> (u32, u32) {
    match item.kind {
        MediaKind::Episode {
            season, episode, ..
        } => (season, episode),
        MediaKind::Movie => (0, 0),
    }
}

/// Natural, case-insensitive ordering so "Episode 2" sorts before "Episode 10".
pub fn natord_compare(a: &str, b: &str) -> Ordering {
    let mut a_chars = a.chars().peekable();
    let mut b_chars = b.chars().peekable();

    loop {
        match (a_chars.peek(), b_chars.peek()) {
            (None, None) => return Ordering::Equal,
            (None, Some(_)) => return Ordering::Less,
            (Some(_), None) => return Ordering::Greater,
            (Some(&ac), Some(&bc)) => {
                if ac.is_ascii_digit() && bc.is_ascii_digit() {
                    let a_num = take_digits(&mut a_chars);
                    let b_num = take_digits(&mut b_chars);

                    // Compare by magnitude without overflowing on long runs.
                    let a_trim = a_num.trim_start_matches('0');
                    let b_trim = b_num.trim_start_matches('0');
                    match a_trim
                        .len()
                        .cmp(&b_trim.len())
                        .then_with(|| a_trim.cmp(b_trim))
                    {
                        Ordering::Equal => continue,
                        other => return other,
                    }
                } else {
                    a_chars.next();
                    b_chars.next();

                    match ac.to_lowercase().cmp(bc.to_lowercase()) {
                        Ordering::Equal => continue,
                        other => return other,
                    }
                }
            }
        }
    }
}

fn take_digits(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> String {
    let mut digits = String::new();
    while let Some(&c) = chars.peek() {
        if !c.is_ascii_digit() {
            break;
        }
        digits.push(c);
        chars.next();
    }
    digits
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::VideoFormat;
    use crate::fs::FileStat;

    #[test]
    fn test_natord_compare() {
        assert_eq!(natord_compare("Episode 2", "Episode 10"), Ordering::Less);
        assert_eq!(natord_compare("Episode 10", "Episode 2"), Ordering::Greater);
        assert_eq!(natord_compare("alpha", "Beta"), Ordering::Less);
        assert_eq!(natord_compare("Part 007", "Part 7"), Ordering::Equal);
        assert_eq!(natord_compare("a1b", "a1c"), Ordering::Less);
    }

    #[test]
    fn test_natord_compare_long_numbers() {
        assert_eq!(
            natord_compare("x 123456789012345678901234567890", "x 99"),
            Ordering::Greater
        );
    }

    fn episode(path: &str) -> MediaItem {
        let stat = FileStat {
            size: 1,
            is_file: true,
            is_dir: false,
            created: Utc::now(),
            modified: Utc::now(),
        };
        MediaItem::new(Path::new(path), VideoFormat::Mkv, &stat)
    }

    #[test]
    fn test_series_slug() {
        assert_eq!(Series::slug("The Office  US"), "series-the-office-us");
    }

    #[test]
    fn test_series_ids_unique_when_slugs_collide() {
        let mut index = LibraryIndex::new();
        index.apply_full_scan([
            episode("/videos/Show.S01E01.mkv"),
            episode("/videos/show.S01E02.mkv"),
            episode("/videos/Other Show.S01E01.mkv"),
        ]);

        let view = index.view(|_| None);
        assert_eq!(view.series.len(), 3);

        let ids: BTreeSet<&str> = view.series.iter().map(|s| s.id.as_str()).collect();
        assert_eq!(ids.len(), 3);
        assert!(ids.contains("series-other-show"));

        let upper = view.series.iter().find(|s| s.name == "Show").unwrap();
        let lower = view.series.iter().find(|s| s.name == "show").unwrap();
        assert!(upper.id.starts_with("series-show-"));
        assert!(lower.id.starts_with("series-show-"));
        assert_eq!(upper.id, Series::unique_slug("Show"));

        // Stable across views
        assert_eq!(index.view(|_| None), view);
    }
}
