//! Batch scripts handed to GIMP's Python interpreter.
//!
//! The scripts live in `assets/` with `{{name}}` placeholders. Every substituted
//! value ends up inside a double-quoted Python literal and goes through
//! [`escape_string`] first.

use regex::{Captures, Regex};
use std::path::Path;
use std::sync::LazyLock;

use crate::banner::BannerJob;
use crate::error::{BannerError, Result};
use crate::gimp::GimpVersion;

const BANNER_GIMP3: &str = include_str!("../assets/banner_gimp3.py.template");
const BANNER_PYTHON_FU: &str = include_str!("../assets/banner_python_fu.py.template");
const TEMPLATE_GIMP3: &str = include_str!("../assets/template_gimp3.py.template");

/// Text layers every template is expected to carry, in script order.
pub const TEXT_LAYERS: &[&str] = &[
    "Title1",
    "Title2",
    "SpeakerName",
    "SpeakerTitle",
    "Date",
    "Time",
];

pub const PHOTO_LAYER: &str = "SpeakerPhoto";

/// Scripting API spoken by the installed GIMP, chosen once from its version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptDialect {
    /// GIMP 2.10 `gimpfu` procedural database.
    PythonFu,
    /// GIMP 3 GObject introspection API.
    Gimp3,
}

impl ScriptDialect {
    pub fn for_version(version: GimpVersion) -> Result<Self> {
        match version.major {
            3.. => Ok(Self::Gimp3),
            2 if version.minor >= 10 => Ok(Self::PythonFu),
            _ => Err(BannerError::UnsupportedGimp {
                major: version.major,
                minor: version.minor,
            }),
        }
    }
}

/// Escapes a value for a double-quoted Python string literal.
pub fn escape_string(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

fn escape_path(path: &Path) -> String {
    escape_string(&path.display().to_string())
}

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{(\w+)\}\}").expect("valid placeholder pattern"));

/// Substitutes every `{{key}}` of `template` in one pass, so substituted values are
/// never scanned again. Unknown keys are left as they are.
fn fill(template: &str, values: &[(&str, String)]) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures<'_>| {
            values
                .iter()
                .find(|(key, _)| *key == &caps[1])
                .map_or_else(|| caps[0].to_string(), |(_, value)| value.clone())
        })
        .into_owned()
}

pub fn render_banner_script(dialect: ScriptDialect, job: &BannerJob) -> String {
    let template = match dialect {
        ScriptDialect::Gimp3 => BANNER_GIMP3,
        ScriptDialect::PythonFu => BANNER_PYTHON_FU,
    };
    let fields = &job.fields;
    let photo = fields.photo.as_deref().map(escape_path).unwrap_or_default();

    fill(
        template,
        &[
            ("template_path", escape_path(&job.template)),
            ("title1", escape_string(&fields.title1)),
            ("title2", escape_string(&fields.title2)),
            ("speaker_name", escape_string(&fields.speaker_name)),
            ("speaker_title", escape_string(&fields.speaker_title)),
            ("date", escape_string(&fields.date)),
            ("time", escape_string(&fields.time)),
            ("photo_path", photo),
            ("output_working", escape_path(&job.outputs.working)),
            ("output_flattened", escape_path(&job.outputs.flattened)),
        ],
    )
}

/// Layer positions and font sizes for a blank template, proportional to the canvas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct TemplateLayout {
    width_center: u32,
    height_quarter: u32,
    height_quarter_plus: u32,
    height_half_plus: u32,
    height_half_plus2: u32,
    width_right: u32,
    height_bottom1: u32,
    height_bottom2: u32,
    photo_size: u32,
    photo_x: u32,
    photo_y: u32,
    title1_size: u32,
    title2_size: u32,
    speaker_size: u32,
    speaker_title_size: u32,
    date_size: u32,
    time_size: u32,
}

impl TemplateLayout {
    fn new(width: u32, height: u32) -> Self {
        let pct = |value: u32, percent: u32| value * percent / 100;
        let photo_size = (height / 3).min(width / 3).max(1);
        Self {
            width_center: width / 2,
            height_quarter: height / 4,
            height_quarter_plus: height / 4 + pct(height, 8),
            height_half_plus: height / 2 + pct(height, 15),
            height_half_plus2: height / 2 + pct(height, 22),
            width_right: width - pct(width, 15),
            height_bottom1: height - pct(height, 12),
            height_bottom2: height - pct(height, 6),
            photo_size,
            photo_x: width / 2 - photo_size / 2,
            photo_y: height / 3,
            title1_size: pct(width, 4).max(1),
            title2_size: (width * 25 / 1000).max(1),
            speaker_size: (width * 35 / 1000).max(1),
            speaker_title_size: pct(width, 2).max(1),
            date_size: (width * 25 / 1000).max(1),
            time_size: pct(width, 2).max(1),
        }
    }
}

/// Script creating a blank template with every expected layer. GIMP 3 only.
pub fn render_template_script(
    dialect: ScriptDialect,
    output_path: &Path,
    width: u32,
    height: u32,
) -> Result<String> {
    if dialect != ScriptDialect::Gimp3 {
        return Err(BannerError::UnsupportedGimp { major: 2, minor: 10 });
    }
    let layout = TemplateLayout::new(width, height);
    let n = |v: u32| v.to_string();

    Ok(fill(
        TEMPLATE_GIMP3,
        &[
            ("width", n(width)),
            ("height", n(height)),
            ("width_center", n(layout.width_center)),
            ("height_quarter", n(layout.height_quarter)),
            ("height_quarter_plus", n(layout.height_quarter_plus)),
            ("height_half_plus", n(layout.height_half_plus)),
            ("height_half_plus2", n(layout.height_half_plus2)),
            ("width_right", n(layout.width_right)),
            ("height_bottom1", n(layout.height_bottom1)),
            ("height_bottom2", n(layout.height_bottom2)),
            ("photo_size", n(layout.photo_size)),
            ("photo_x", n(layout.photo_x)),
            ("photo_y", n(layout.photo_y)),
            ("title1_size", n(layout.title1_size)),
            ("title2_size", n(layout.title2_size)),
            ("speaker_size", n(layout.speaker_size)),
            ("speaker_title_size", n(layout.speaker_title_size)),
            ("date_size", n(layout.date_size)),
            ("time_size", n(layout.time_size)),
            ("output_path", escape_path(output_path)),
        ],
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::banner::BannerFields;
    use crate::naming::{FlatFormat, OutputPaths};
    use std::path::PathBuf;

    fn job(photo: Option<&str>) -> BannerJob {
        BannerJob {
            template: PathBuf::from("/templates/wide.xcf"),
            fields: BannerFields {
                title1: "Say \"hi\"".into(),
                title2: "line one\nline two".into(),
                speaker_name: "Jane Doe".into(),
                speaker_title: "CEO, Company".into(),
                date: "Feb 20".into(),
                time: "7:00 PM".into(),
                photo: photo.map(PathBuf::from),
            },
            outputs: OutputPaths::new(Path::new("/out"), "2026-02-20-say-hi", FlatFormat::Jpg),
        }
    }

    #[test]
    fn test_escape_string() {
        assert_eq!(escape_string(r#"a\b"c"#), r#"a\\b\"c"#);
        assert_eq!(escape_string("x\ny"), "x\\ny");
    }

    #[test]
    fn test_dialect_for_version() {
        let v = |major, minor| GimpVersion { major, minor };
        assert_eq!(ScriptDialect::for_version(v(3, 0)).unwrap(), ScriptDialect::Gimp3);
        assert_eq!(ScriptDialect::for_version(v(2, 10)).unwrap(), ScriptDialect::PythonFu);
        assert!(ScriptDialect::for_version(v(2, 8)).is_err());
    }

    #[test]
    fn test_banner_script_substitutes_every_placeholder() {
        for dialect in [ScriptDialect::Gimp3, ScriptDialect::PythonFu] {
            let script = render_banner_script(dialect, &job(Some("/photos/jane.jpg")));
            assert!(!script.contains("{{"), "{dialect:?} left a placeholder");
            assert!(script.contains(r#""Say \"hi\"""#));
            assert!(script.contains(r#""line one\nline two""#));
            assert!(script.contains("/templates/wide.xcf"));
            assert!(script.contains("/out/2026-02-20-say-hi.xcf"));
            assert!(script.contains("/out/2026-02-20-say-hi.jpg"));
            assert!(script.contains(r#"photo_path = "/photos/jane.jpg""#));
            for layer in TEXT_LAYERS.iter().chain([&PHOTO_LAYER]) {
                assert!(script.contains(layer));
            }
        }
    }

    #[test]
    fn test_braces_in_user_text_are_kept_verbatim() {
        let mut job = job(None);
        job.fields.title1 = "Templating {{time}} talk".into();
        job.fields.title2 = "{{output_working}}".into();
        let script = render_banner_script(ScriptDialect::Gimp3, &job);
        assert!(script.contains(r#""Templating {{time}} talk""#));
        assert!(script.contains(r#""{{output_working}}""#));
        assert!(!script.contains("Templating 7:00 PM talk"));
    }

    #[test]
    fn test_template_script_at_largest_size() {
        let max = crate::templates::MAX_DIMENSION;
        let script =
            render_template_script(ScriptDialect::Gimp3, Path::new("/t/huge.xcf"), max, max).unwrap();
        assert!(script.contains(&format!("Gimp.Image.new({max}, {max}")));
    }

    #[test]
    fn test_banner_script_without_photo() {
        let script = render_banner_script(ScriptDialect::Gimp3, &job(None));
        assert!(script.contains(r#"photo_path = """#));
    }

    #[test]
    fn test_template_script() {
        let script =
            render_template_script(ScriptDialect::Gimp3, Path::new("/t/new.xcf"), 1920, 1080)
                .unwrap();
        assert!(!script.contains("{{"));
        assert!(script.contains("Gimp.Image.new(1920, 1080"));
        assert!(script.contains("\"/t/new.xcf\""));
        // Title 1 font is 4% of the width.
        assert!(script.contains("\"Event Title\", 76, 960, 270"));

        assert!(matches!(
            render_template_script(ScriptDialect::PythonFu, Path::new("/t/new.xcf"), 10, 10),
            Err(BannerError::UnsupportedGimp { .. })
        ));
    }
}
