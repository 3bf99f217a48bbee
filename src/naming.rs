//! Output file naming.
//!
//! Every generated banner produces two sibling files sharing one stem: the layered
//! working file and a flattened copy for distribution.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use crate::date::ParsedDate;

/// Characters kept from the start of a title or template name.
pub const DEFAULT_SLUG_LEN: usize = 10;

/// Used when a slug would otherwise be empty, and as the stem prefix when no date was found.
pub const FALLBACK_SLUG: &str = "banner";

pub const WORKING_EXTENSION: &str = "xcf";

static NON_ALNUM: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^a-z0-9]+").expect("valid slug pattern"));

/// Format of the flattened copy.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum FlatFormat {
    #[default]
    Jpg,
    Png,
}

impl FlatFormat {
    pub fn extension(self) -> &'static str {
        match self {
            Self::Jpg => "jpg",
            Self::Png => "png",
        }
    }
}

impl fmt::Display for FlatFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

/// Reduces `text` to a short lowercase `[a-z0-9-]` token.
///
/// The cut happens before cleaning and is not word aware, so "AI/ML Meetup!!!"
/// becomes "ai-ml-meet".
pub fn slugify(text: &str, max_len: usize) -> String {
    let head: String = text
        .chars()
        .take(max_len)
        .map(|c| c.to_ascii_lowercase())
        .collect();
    let slug = NON_ALNUM.replace_all(&head, "-");
    let slug = slug.trim_matches('-');
    if slug.is_empty() {
        FALLBACK_SLUG.to_string()
    } else {
        slug.to_string()
    }
}

/// Builds the shared stem for a banner's output files.
///
/// `template` is the template's file name or stem; pass it only when several
/// templates are rendered in the same run so their outputs do not collide.
pub fn base_filename(title: &str, date: Option<&ParsedDate>, template: Option<&str>) -> String {
    let title_slug = slugify(title, DEFAULT_SLUG_LEN);
    let mut base = match date {
        Some(date) => format!("{date}-{title_slug}"),
        None => format!("{FALLBACK_SLUG}-{title_slug}"),
    };
    if let Some(template) = template {
        let stem = Path::new(template)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or(template);
        base.push('-');
        base.push_str(&slugify(stem, DEFAULT_SLUG_LEN));
    }
    base
}

/// The two files written for one banner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputPaths {
    pub base_filename: String,
    pub working: PathBuf,
    pub flattened: PathBuf,
}

impl OutputPaths {
    pub fn new(output_dir: &Path, base_filename: &str, format: FlatFormat) -> Self {
        Self {
            base_filename: base_filename.to_string(),
            working: output_dir.join(format!("{base_filename}.{WORKING_EXTENSION}")),
            flattened: output_dir.join(format!("{base_filename}.{}", format.extension())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slugify_truncates_before_cleaning() {
        assert_eq!(slugify("AI/ML Meetup!!!", 10), "ai-ml-meet");
        assert_eq!(slugify("AI Meetup", 10), "ai-meetup");
        assert_eq!(slugify("Rust and the Borrow Checker", 10), "rust-and-t");
    }

    #[test]
    fn test_slugify_trims_and_collapses() {
        assert_eq!(slugify("  --Hello--  ", 20), "hello");
        assert_eq!(slugify("a   b", 10), "a-b");
        assert_eq!(slugify("Café Night", 10), "caf-night");
    }

    #[test]
    fn test_slugify_falls_back_when_empty() {
        assert_eq!(slugify("!!!", 10), "banner");
        assert_eq!(slugify("", 10), "banner");
        assert_eq!(slugify("     x", 5), "banner");
    }

    #[test]
    fn test_base_filename_with_date() {
        let date = ParsedDate::new(2025, 1, 15);
        assert_eq!(base_filename("AI Meetup", Some(&date), None), "2025-01-15-ai-meetup");
    }

    #[test]
    fn test_base_filename_without_date() {
        assert_eq!(base_filename("AI Meetup", None, None), "banner-ai-meetup");
    }

    #[test]
    fn test_base_filename_with_template_suffix() {
        let date = ParsedDate::new(2025, 1, 15);
        assert_eq!(
            base_filename("AI Meetup", Some(&date), Some("Wide Banner.xcf")),
            "2025-01-15-ai-meetup-wide-banne"
        );
        assert_eq!(
            base_filename("AI Meetup", None, Some("square")),
            "banner-ai-meetup-square"
        );
    }

    #[test]
    fn test_output_paths() {
        let paths = OutputPaths::new(Path::new("/tmp/out"), "banner-x", FlatFormat::Png);
        assert_eq!(paths.working, PathBuf::from("/tmp/out/banner-x.xcf"));
        assert_eq!(paths.flattened, PathBuf::from("/tmp/out/banner-x.png"));
        assert_eq!(paths.base_filename, "banner-x");
    }
}
