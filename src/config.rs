use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::banner::BannerFields;
use crate::naming::FlatFormat;

const APP_DIR: &str = "gimp-banner-generator";
const CONFIG_FILE: &str = "config.json";

/// Last-used values, persisted between runs so the form reopens pre-filled and
/// `banner auto` can run without any input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub template_directory: String,
    pub last_template: String,
    pub last_templates: Vec<String>,
    pub output_directory: String,
    pub title1: String,
    pub title2: String,
    pub speaker_name: String,
    pub speaker_title: String,
    pub date: String,
    pub time: String,
    pub photo_path: String,
    pub flat_format: FlatFormat,
    pub timeout_secs: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            template_directory: String::new(),
            last_template: String::new(),
            last_templates: Vec::new(),
            output_directory: String::new(),
            title1: String::new(),
            title2: String::new(),
            speaker_name: String::new(),
            speaker_title: String::new(),
            date: String::new(),
            time: String::new(),
            photo_path: String::new(),
            flat_format: FlatFormat::default(),
            timeout_secs: crate::gimp::BANNER_TIMEOUT.as_secs(),
        }
    }
}

impl Settings {
    /// Template names to preselect. Older records only carry `last_template`.
    pub fn selected_templates(&self) -> Vec<String> {
        if !self.last_templates.is_empty() {
            self.last_templates.clone()
        } else if !self.last_template.is_empty() {
            vec![self.last_template.clone()]
        } else {
            Vec::new()
        }
    }

    /// Stores the template selection, keeping `last_template` as the first entry.
    pub fn set_selected_templates(&mut self, names: Vec<String>) {
        if let Some(first) = names.first() {
            self.last_template = first.clone();
        }
        self.last_templates = names;
    }

    pub fn fields(&self) -> BannerFields {
        BannerFields {
            title1: self.title1.clone(),
            title2: self.title2.clone(),
            speaker_name: self.speaker_name.clone(),
            speaker_title: self.speaker_title.clone(),
            date: self.date.clone(),
            time: self.time.clone(),
            photo: (!self.photo_path.is_empty()).then(|| PathBuf::from(&self.photo_path)),
        }
    }

    pub fn remember(&mut self, fields: &BannerFields) {
        self.title1 = fields.title1.clone();
        self.title2 = fields.title2.clone();
        self.speaker_name = fields.speaker_name.clone();
        self.speaker_title = fields.speaker_title.clone();
        self.date = fields.date.clone();
        self.time = fields.time.clone();
        self.photo_path = fields
            .photo
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
    }
}

/// Overlays a loaded record on `defaults`. Unknown keys are ignored; a record that is
/// not an object, or whose values have the wrong types, leaves the defaults untouched.
pub fn merge(defaults: Settings, loaded: Value) -> Settings {
    let Value::Object(loaded) = loaded else {
        warn!("Settings record is not a JSON object, using defaults");
        return defaults;
    };

    let mut merged = match serde_json::to_value(&defaults) {
        Ok(Value::Object(map)) => map,
        _ => return defaults,
    };
    for (key, value) in loaded {
        if merged.contains_key(&key) {
            merged.insert(key, value);
        } else {
            debug!(key = %key, "Ignoring unknown settings key");
        }
    }

    match serde_json::from_value(Value::Object(merged)) {
        Ok(settings) => settings,
        Err(e) => {
            warn!(error = %e, "Settings record has invalid values, using defaults");
            defaults
        }
    }
}

/// `~/.config/gimp-banner-generator/config.json` on Linux.
pub fn default_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_DIR)
        .join(CONFIG_FILE)
}

/// Reads the settings at `path`. A missing or broken file is not an error: the
/// defaults are returned and a warning is logged.
pub fn load(path: &Path) -> Settings {
    if !path.exists() {
        debug!(path = %path.display(), "No settings file yet");
        return Settings::default();
    }

    let loaded = std::fs::read_to_string(path)
        .with_context(|| format!("Could not read {}", path.display()))
        .and_then(|content| {
            serde_json::from_str::<Value>(&content)
                .with_context(|| format!("Could not parse {}", path.display()))
        });

    match loaded {
        Ok(value) => merge(Settings::default(), value),
        Err(e) => {
            warn!("Could not load config file: {e:#}");
            Settings::default()
        }
    }
}

pub fn save(settings: &Settings, path: &Path) -> Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("Could not create directory: {}", dir.display()))?;
    }
    let json = serde_json::to_string_pretty(settings).context("Could not serialize settings")?;
    std::fs::write(path, json).with_context(|| format!("Could not write {}", path.display()))?;
    debug!(path = %path.display(), "Settings saved");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_merge_overrides_known_keys() {
        let merged = merge(
            Settings::default(),
            json!({ "title1": "AI Meetup", "time": "7:00 PM", "flat_format": "png" }),
        );
        assert_eq!(merged.title1, "AI Meetup");
        assert_eq!(merged.time, "7:00 PM");
        assert_eq!(merged.flat_format, FlatFormat::Png);
        assert_eq!(merged.speaker_name, "");
        assert_eq!(merged.timeout_secs, 60);
    }

    #[test]
    fn test_merge_ignores_unknown_keys() {
        let merged = merge(Settings::default(), json!({ "window_size": [600, 850] }));
        assert_eq!(merged, Settings::default());
    }

    #[test]
    fn test_merge_rejects_bad_records() {
        let defaults = Settings {
            title1: "kept".to_string(),
            ..Settings::default()
        };
        assert_eq!(merge(defaults.clone(), json!([1, 2, 3])), defaults);
        assert_eq!(merge(defaults.clone(), json!({ "title1": 42 })), defaults);
    }

    #[test]
    fn test_selected_templates_falls_back_to_last_template() {
        let mut settings = Settings {
            last_template: "wide.xcf".to_string(),
            ..Settings::default()
        };
        assert_eq!(settings.selected_templates(), vec!["wide.xcf"]);

        settings.set_selected_templates(vec!["square.xcf".into(), "story.xcf".into()]);
        assert_eq!(settings.last_template, "square.xcf");
        assert_eq!(settings.selected_templates(), vec!["square.xcf", "story.xcf"]);
    }

    #[test]
    fn test_fields_round_trip_through_settings() {
        let mut settings = Settings::default();
        let fields = BannerFields {
            title1: "Main".into(),
            speaker_name: "Jane Doe".into(),
            date: "Feb 20".into(),
            time: "7:00 PM".into(),
            photo: Some(PathBuf::from("/photos/jane.jpg")),
            ..BannerFields::default()
        };
        settings.remember(&fields);
        assert_eq!(settings.photo_path, "/photos/jane.jpg");
        assert_eq!(settings.fields(), fields);
    }
}
