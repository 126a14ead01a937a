//! Metadata hints recovered from a BD archive filename.
//!
//! Collections are messy: `Thorgal - Tome 03 - Les Trois Vieillards (1982).cbz`,
//! `T12 - La Cité du gouffre.cbr`, `Gaston #5.cbz`... The extractor is
//! deliberately forgiving and never errors; anything it cannot recover is
//! simply `None`.

use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;

static EXTENSION: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"(?i)\.(cbz|cbr)$").unwrap());
static VOLUME_PREFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(?:tome|tom|vol|v|t|#)\s*(\d{1,3})").unwrap());
static VOLUME_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(\d{1,3})\s*(?:tome|tom|vol|v|t)$").unwrap());
static YEAR: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[(\[]((?:19|20)\d{2})[)\]]").unwrap());
static VOLUME_AND_TAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s*[-_]?\s*(?:tome|tom|vol|v|t|#)\s*\d{1,3}.*$").unwrap());
static BRACKETED: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s*[(\[][^)\]]*[)\]]").unwrap());

/// What a filename told us about the album inside the archive.
///
/// The `publisher` slot is here for callers that know it from elsewhere
/// (sidecar files, directory conventions); filenames themselves almost never
/// carry one and `parse` leaves it empty.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FilenameHints {
    pub title: Option<String>,
    pub volume: Option<u32>,
    pub year: Option<i32>,
    pub publisher: Option<String>,
}

impl FilenameHints {
    /// Extract hints from an archive path's file name.
    pub fn parse(path: &Path) -> Self {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return Self::default();
        };
        let stem = EXTENSION.replace(name, "");

        let volume = VOLUME_PREFIX
            .captures(&stem)
            .or_else(|| VOLUME_SUFFIX.captures(&stem))
            .and_then(|c| c[1].parse::<u32>().ok());
        let year = YEAR.captures(&stem).and_then(|c| c[1].parse::<i32>().ok());

        let mut title = VOLUME_AND_TAIL.replace(&stem, "").to_string();
        title = BRACKETED.replace_all(&title, "").to_string();
        let title = title.trim().trim_end_matches(['-', '_']).trim().to_string();
        let title = (!title.is_empty()).then_some(title);

        Self { title, volume, year, publisher: None }
    }

    /// The string handed to the catalog search. Falls back to the raw file
    /// stem when no title survived the cleanup.
    pub fn search_term<'a>(&'a self, path: &'a Path) -> &'a str {
        match &self.title {
            Some(title) => title.as_str(),
            None => path.file_stem().and_then(|s| s.to_str()).unwrap_or(""),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::path::PathBuf;

    #[rstest]
    #[case("Thorgal - Tome 03 - Les Trois Vieillards.cbz", Some(3))]
    #[case("Lanfeust Vol 2.cbr", Some(2))]
    #[case("Gaston #5.cbz", Some(5))]
    #[case("T12 - La Cité du gouffre.cbz", Some(12))]
    #[case("Le Chat.cbz", None)]
    fn test_volume_extraction(#[case] name: &str, #[case] expected: Option<u32>) {
        assert_eq!(FilenameHints::parse(&PathBuf::from(name)).volume, expected);
    }

    #[rstest]
    #[case("Astérix chez les Belges (1979).cbz", Some(1979))]
    #[case("XIII [2003] T1.cbz", Some(2003))]
    #[case("Astérix chez les Belges.cbz", None)]
    #[case("Route 66.cbz", None)]
    fn test_year_extraction(#[case] name: &str, #[case] expected: Option<i32>) {
        assert_eq!(FilenameHints::parse(&PathBuf::from(name)).year, expected);
    }

    #[rstest]
    #[case("Thorgal - Tome 03 - Les Trois Vieillards.cbz", "Thorgal")]
    #[case("Astérix chez les Belges (1979).cbz", "Astérix chez les Belges")]
    #[case("Le Chat.cbr", "Le Chat")]
    fn test_title_extraction(#[case] name: &str, #[case] expected: &str) {
        assert_eq!(
            FilenameHints::parse(&PathBuf::from(name)).title.as_deref(),
            Some(expected)
        );
    }

    #[test]
    fn test_search_term_falls_back_to_stem() {
        let path = PathBuf::from("T03.cbz");
        let hints = FilenameHints::parse(&path);
        assert_eq!(hints.title, None);
        assert_eq!(hints.search_term(&path), "T03");
    }

    #[test]
    fn test_pathological_names_do_not_panic() {
        for name in ["", ".cbz", "...", "( ).cbz", "#.cbr"] {
            let _ = FilenameHints::parse(&PathBuf::from(name));
        }
    }
}
