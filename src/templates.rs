use std::path::{Path, PathBuf};

use crate::error::{BannerError, Result};

pub const TEMPLATE_EXTENSION: &str = "xcf";

/// Lists the `.xcf` templates of a directory, sorted by file name.
pub fn discover_templates(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(BannerError::TemplateNotFound(dir.to_path_buf()));
    }
    let mut found: Vec<PathBuf> = std::fs::read_dir(dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && has_template_extension(path))
        .collect();
    found.sort();

    if found.is_empty() {
        return Err(BannerError::NoTemplates(dir.to_path_buf()));
    }
    Ok(found)
}

/// Template file names of a directory, for pick lists. Empty when the directory is unusable.
pub fn template_names(dir: &Path) -> Vec<String> {
    discover_templates(dir)
        .unwrap_or_default()
        .iter()
        .filter_map(|p| p.file_name().and_then(|n| n.to_str()).map(str::to_string))
        .collect()
}

/// Checks that an explicitly named template exists and is an `.xcf` file.
pub fn resolve_template(path: &Path) -> Result<PathBuf> {
    if !path.exists() {
        return Err(BannerError::TemplateNotFound(path.to_path_buf()));
    }
    if !has_template_extension(path) {
        return Err(BannerError::InvalidTemplate(path.to_path_buf()));
    }
    Ok(path.to_path_buf())
}

fn has_template_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(TEMPLATE_EXTENSION))
}

/// Appends `.xcf` to a bare template name.
pub fn template_file_name(name: &str) -> String {
    let name = name.trim();
    if name.ends_with(".xcf") {
        name.to_string()
    } else {
        format!("{name}.{TEMPLATE_EXTENSION}")
    }
}

/// Canvas sizes offered when creating a new template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TemplatePreset {
    pub width: u32,
    pub height: u32,
    pub label: &'static str,
}

pub const PRESETS: &[TemplatePreset] = &[
    TemplatePreset { width: 1920, height: 1080, label: "Full HD - Facebook Event, YouTube Thumbnail" },
    TemplatePreset { width: 1200, height: 628, label: "Facebook/LinkedIn Post" },
    TemplatePreset { width: 1080, height: 1080, label: "Instagram Square" },
    TemplatePreset { width: 1080, height: 1920, label: "Instagram Story/Reel" },
    TemplatePreset { width: 1200, height: 675, label: "Twitter/X Post" },
    TemplatePreset { width: 1280, height: 720, label: "HD - Web Banner" },
];

/// Parses a `WIDTHxHEIGHT` size such as `1920x1080`.
pub fn parse_size(text: &str) -> Result<(u32, u32)> {
    let invalid = |width: i64, height: i64| BannerError::InvalidDimensions { width, height };
    let (w, h) = text
        .trim()
        .split_once(['x', 'X'])
        .ok_or_else(|| invalid(0, 0))?;
    let width: i64 = w.trim().parse().map_err(|_| invalid(0, 0))?;
    let height: i64 = h.trim().parse().map_err(|_| invalid(width, 0))?;
    validate_size(width, height)
}

/// Largest canvas side GIMP accepts.
pub const MAX_DIMENSION: u32 = 524_288;

pub fn validate_size(width: i64, height: i64) -> Result<(u32, u32)> {
    let side = 1..=MAX_DIMENSION;
    match (u32::try_from(width), u32::try_from(height)) {
        (Ok(w), Ok(h)) if side.contains(&w) && side.contains(&h) => Ok((w, h)),
        _ => Err(BannerError::InvalidDimensions { width, height }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_discover_templates_sorted_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        for name in ["wide.xcf", "Square.XCF", "notes.txt", "alpha.xcf"] {
            std::fs::write(dir.path().join(name), b"").unwrap();
        }
        let found = discover_templates(dir.path()).unwrap();
        let names: Vec<_> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap())
            .collect();
        assert_eq!(names, ["Square.XCF", "alpha.xcf", "wide.xcf"]);
        assert_eq!(template_names(dir.path()).len(), 3);
    }

    #[test]
    fn test_discover_templates_errors() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            discover_templates(dir.path()),
            Err(BannerError::NoTemplates(_))
        ));
        assert!(matches!(
            discover_templates(&dir.path().join("missing")),
            Err(BannerError::TemplateNotFound(_))
        ));
        assert!(template_names(&dir.path().join("missing")).is_empty());
    }

    #[test]
    fn test_resolve_template() {
        let dir = tempfile::tempdir().unwrap();
        let xcf = dir.path().join("t.xcf");
        let png = dir.path().join("t.png");
        std::fs::write(&xcf, b"").unwrap();
        std::fs::write(&png, b"").unwrap();
        assert_eq!(resolve_template(&xcf).unwrap(), xcf);
        assert!(matches!(resolve_template(&png), Err(BannerError::InvalidTemplate(_))));
        assert!(matches!(
            resolve_template(&dir.path().join("nope.xcf")),
            Err(BannerError::TemplateNotFound(_))
        ));
    }

    #[test]
    fn test_template_file_name() {
        assert_eq!(template_file_name("wide"), "wide.xcf");
        assert_eq!(template_file_name(" wide.xcf "), "wide.xcf");
    }

    #[test]
    fn test_parse_size() {
        assert_eq!(parse_size("1920x1080").unwrap(), (1920, 1080));
        assert_eq!(parse_size(" 800 X 600 ").unwrap(), (800, 600));
        assert!(parse_size("0x100").is_err());
        assert!(parse_size("-5x100").is_err());
        assert!(parse_size("wide").is_err());
    }

    #[test]
    fn test_validate_size_bounds() {
        assert_eq!(validate_size(524_288, 1).unwrap(), (524_288, 1));
        assert!(matches!(
            validate_size(524_289, 100),
            Err(BannerError::InvalidDimensions { width: 524_289, height: 100 })
        ));
        assert!(validate_size(100, 50_000_000).is_err());
        assert!(validate_size(100, 0).is_err());
    }
}
