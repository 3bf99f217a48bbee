use chrono::NaiveDate;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::date::{parse_date_relative_to, ParsedDate};
use crate::error::{BannerError, Result};
use crate::naming::{base_filename, FlatFormat, OutputPaths};

/// Time printed on the banner when the operator leaves it out.
pub const DEFAULT_TIME: &str = "6-8PM";

/// Values written into the template's text layers, plus the optional speaker photo.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BannerFields {
    pub title1: String,
    pub title2: String,
    pub speaker_name: String,
    pub speaker_title: String,
    /// Free text, printed as typed. Only the file name uses the parsed form.
    pub date: String,
    pub time: String,
    pub photo: Option<PathBuf>,
}

impl BannerFields {
    /// Checks the required fields and the photo before GIMP is started.
    pub fn validate(&self) -> Result<()> {
        let required = [
            ("Title 1", &self.title1),
            ("Speaker Name", &self.speaker_name),
            ("Date", &self.date),
            ("Time", &self.time),
        ];
        if let Some(&(name, _)) = required.iter().find(|(_, value)| value.trim().is_empty()) {
            return Err(BannerError::MissingField(name));
        }

        if let Some(photo) = &self.photo {
            probe_photo(photo)?;
        }
        Ok(())
    }
}

/// Returns the photo's pixel size, failing if it is missing or not a readable image.
pub fn probe_photo(path: &Path) -> Result<(u32, u32)> {
    if !path.exists() {
        return Err(BannerError::PhotoNotFound(path.to_path_buf()));
    }
    let (width, height) =
        image::image_dimensions(path).map_err(|e| BannerError::UnreadablePhoto {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    debug!(path = %path.display(), width, height, "Speaker photo");
    Ok((width, height))
}

/// One template rendered with one set of fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BannerJob {
    pub template: PathBuf,
    pub fields: BannerFields,
    pub outputs: OutputPaths,
}

/// Names the outputs for every template. The template slug is only appended when
/// more than one template is rendered, so single runs keep the short name.
pub fn plan_jobs(
    fields: &BannerFields,
    templates: &[PathBuf],
    output_dir: &Path,
    format: FlatFormat,
    today: NaiveDate,
) -> Vec<BannerJob> {
    let parsed: Option<ParsedDate> = parse_date_relative_to(&fields.date, today);
    let suffix_template = templates.len() > 1;

    templates
        .iter()
        .map(|template| {
            let template_name = template.file_name().and_then(|n| n.to_str());
            let base = base_filename(
                &fields.title1,
                parsed.as_ref(),
                template_name.filter(|_| suffix_template),
            );
            BannerJob {
                template: template.clone(),
                fields: fields.clone(),
                outputs: OutputPaths::new(output_dir, &base, format),
            }
        })
        .collect()
}
