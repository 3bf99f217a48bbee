pub mod banner;
pub mod config;
pub mod date;
pub mod error;
pub mod generator;
pub mod gimp;
pub mod naming;
pub mod script;
pub mod templates;

use anyhow::{bail, Result};
use std::path::{Path, PathBuf};

pub use banner::{plan_jobs, BannerFields, BannerJob};
pub use date::{parse_date_from_text, ParsedDate};
pub use error::BannerError;
pub use naming::{base_filename, slugify, FlatFormat, OutputPaths};

/// Collects the templates for a run: every `.xcf` of `template_dir` (if given)
/// followed by the explicitly listed files.
pub fn collect_templates(template_dir: Option<&Path>, files: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    if let Some(dir) = template_dir {
        found.extend(templates::discover_templates(dir)?);
    }
    for file in files {
        found.push(templates::resolve_template(file)?);
    }

    if found.is_empty() {
        bail!("At least one of --template/-t or --template-dir/-T is required");
    }
    Ok(found)
}
