//! Filename classification: movie or series episode.
//!
//! Pure functions, no I/O. The series patterns are tried in order against the file stem and
//! the first usable match wins; anything else is a movie.

use crate::library::media::MediaKind;
use regex::{Captures, Regex};
use std::sync::LazyLock;

/// `Name.S01E02`
static RE_SXXEXX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+?)[.\s]+[Ss](\d+)[Ee](\d+)").unwrap());

/// `Name.1x02`
static RE_NXNN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(.+?)[.\s]+(\d+)x(\d+)").unwrap());

/// `Name Season 1 Episode 2`
static RE_SEASON_EPISODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(.+?)[.\s]+Season[.\s]*(\d+)[.\s]*Episode[.\s]*(\d+)").unwrap()
});

static RE_SEPARATORS: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[._]").unwrap());
static RE_WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static RE_YEAR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\b\d{4}\b").unwrap());
static RE_QUALITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(720p|1080p|4K|HDRip|BRRip|WEBRip|HDTV)\b").unwrap()
});

/// Result of classifying a filename.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedTitle {
    /// Cleaned title; equals the series name for episodes.
    pub title: String,
    /// Movie or episode with its numbers.
    pub kind: MediaKind,
}

/// Classify a file name (with or without extension).
pub fn parse(file_name: &str) -> ParsedTitle {
    let stem = strip_extension(file_name);

    for pattern in [&*RE_SXXEXX, &*RE_NXNN, &*RE_SEASON_EPISODE] {
        if let Some(parsed) = pattern.captures(stem).and_then(|c| episode_from(&c)) {
            return parsed;
        }
    }

    ParsedTitle {
        title: clean_title(stem),
        kind: MediaKind::Movie,
    }
}

fn episode_from(caps: &Captures<'_>) -> Option<ParsedTitle> {
    let series_name = clean_title(caps.get(1)?.as_str());
    if series_name.is_empty() {
        return None;
    }
    let season = caps.get(2)?.as_str().parse::<u32>().ok()?;
    let episode = caps.get(3)?.as_str().parse::<u32>().ok()?;

    Some(ParsedTitle {
        title: series_name.clone(),
        kind: MediaKind::Episode {
            series_name,
            season,
            episode,
        },
    })
}

/// Remove the last extension, if any.
pub fn strip_extension(file_name: &str) -> &str {
    match file_name.rfind('.') {
        Some(0) | None => file_name,
        Some(pos) if file_name[pos + 1..].contains(['/', '\\']) => file_name,
        Some(pos) => &file_name[..pos],
    }
}

/// Normalize a raw name into a display title.
///
/// Separators become spaces, years and quality/source tags are dropped, whitespace is
/// collapsed and trimmed. Applying it twice gives the same result as applying it once.
pub fn clean_title(raw: &str) -> String {
    let spaced = RE_SEPARATORS.replace_all(raw, " ");
    let collapsed = collapse(&spaced);
    let no_year = RE_YEAR.replace_all(&collapsed, "");
    let no_tags = RE_QUALITY.replace_all(&no_year, "");
    collapse(&no_tags)
}

fn collapse(s: &str) -> String {
    RE_WHITESPACE.replace_all(s, " ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn episode(series: &str, season: u32, episode: u32) -> MediaKind {
        MediaKind::Episode {
            series_name: series.to_string(),
            season,
            episode,
        }
    }

    #[test]
    fn test_sxxexx_any_case() {
        for name in [
            "Name.S01E02.mkv",
            "Name.s01e02.mkv",
            "Name.S01e02.mp4",
            "Name s01E02.avi",
        ] {
            let parsed = parse(name);
            assert_eq!(parsed.kind, episode("Name", 1, 2), "{name}");
            assert_eq!(parsed.title, "Name");
        }
    }

    #[test]
    fn test_sxxexx_multi_word_and_tags() {
        let parsed = parse("The.Office.US.S03E12.720p.HDTV.x264.mkv");
        assert_eq!(parsed.kind, episode("The Office US", 3, 12));
        assert_eq!(parsed.title, "The Office US");
    }

    #[test]
    fn test_nxnn_pattern() {
        let parsed = parse("Doctor_Who 2x05.avi");
        assert_eq!(parsed.kind, episode("Doctor Who", 2, 5));
    }

    #[test]
    fn test_season_episode_words() {
        let parsed = parse("Dark Season 2 Episode 10.webm");
        assert_eq!(parsed.kind, episode("Dark", 2, 10));

        let parsed = parse("dark.season.3.episode.1.mp4");
        assert_eq!(parsed.kind, episode("dark", 3, 1));
    }

    #[test]
    fn test_pattern_priority() {
        // Both SxxExx and NxNN are present; the first pattern wins.
        let parsed = parse("Show.S02E03.1x01.mkv");
        assert_eq!(parsed.kind, episode("Show", 2, 3));
    }

    #[test]
    fn test_large_numbers() {
        let parsed = parse("Daily.Show.S2021E145.mp4");
        assert_eq!(parsed.kind, episode("Daily Show", 2021, 145));
    }

    #[test]
    fn test_movie_fallback() {
        let parsed = parse("Movie.2020.1080p.mp4");
        assert_eq!(parsed.kind, MediaKind::Movie);
        assert_eq!(parsed.title, "Movie");

        let parsed = parse("Blade_Runner.BRRip.mkv");
        assert_eq!(parsed.kind, MediaKind::Movie);
        assert_eq!(parsed.title, "Blade Runner");
    }

    #[test]
    fn test_movie_title_is_cleaned_stem() {
        for name in ["Some.Film.4k.WEBRip.mov", "plain name.mp4", "a__b..c.m4v"] {
            let parsed = parse(name);
            assert_eq!(parsed.kind, MediaKind::Movie);
            assert_eq!(parsed.title, clean_title(strip_extension(name)));
        }
    }

    #[test]
    fn test_year_only_stem_cleans_to_empty() {
        let parsed = parse("2012.mkv");
        assert_eq!(parsed.kind, MediaKind::Movie);
        assert_eq!(parsed.title, "");
        assert_eq!(parse("2019.1080p.HDTV.mp4").title, "");
    }

    #[test]
    fn test_missing_name_is_a_movie() {
        // Nothing before the marker, so there is no series name to group by.
        let parsed = parse("S01E01.mkv");
        assert_eq!(parsed.kind, MediaKind::Movie);
    }

    #[test]
    fn test_clean_title_idempotent() {
        for raw in [
            "Movie.2020.1080p",
            "The_Matrix__1999__HDRip",
            "  spaced   out  ",
            "4K.HDTV.Something.720P",
            "Already Clean",
        ] {
            let once = clean_title(raw);
            assert_eq!(clean_title(&once), once, "{raw}");
        }
    }

    #[test]
    fn test_strip_extension() {
        assert_eq!(strip_extension("a.b.mkv"), "a.b");
        assert_eq!(strip_extension("noext"), "noext");
        assert_eq!(strip_extension(".hidden"), ".hidden");
    }
}
