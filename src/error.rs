use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Help appended when GIMP's output looks like it could not reach a display.
pub const DISPLAY_HELP: &str = "GIMP needs a display server to run. If you're running headless:\n\
1. Install xvfb: sudo pacman -S xorg-server-xvfb (Arch) or sudo apt install xvfb (Ubuntu)\n\
2. Or set DISPLAY environment variable if using X11 forwarding\n\
3. Or run this application in an environment with a display server";

#[derive(Debug, Error)]
pub enum BannerError {
    #[error("GIMP not found in PATH (looked for gimp-console and gimp)")]
    GimpNotFound,

    #[error("GIMP version detection failed. GIMP 2.10 or 3.0+ is required")]
    VersionDetectionFailed,

    #[error("GIMP {major}.{minor} is not supported for this operation")]
    UnsupportedGimp { major: u32, minor: u32 },

    #[error("Template not found: {}", .0.display())]
    TemplateNotFound(PathBuf),

    #[error("Template must be an .xcf file: {}", .0.display())]
    InvalidTemplate(PathBuf),

    #[error("No .xcf files found in {}", .0.display())]
    NoTemplates(PathBuf),

    #[error("Speaker photo not found: {}", .0.display())]
    PhotoNotFound(PathBuf),

    #[error("Speaker photo could not be read: {}: {reason}", .path.display())]
    UnreadablePhoto { path: PathBuf, reason: String },

    #[error("{0} is required")]
    MissingField(&'static str),

    #[error("Invalid template dimensions {width}x{height}: each side must be between 1 and 524288")]
    InvalidDimensions { width: i64, height: i64 },

    #[error("GIMP operation timed out after {} seconds", .0.as_secs())]
    Timeout(Duration),

    #[error("GIMP could not open a display\n\n{logs}\n\n=== DISPLAY ERROR DETECTED ===\n{}", DISPLAY_HELP)]
    DisplayUnavailable { logs: String },

    #[error("GIMP failed ({status})\n\n{logs}")]
    GimpFailed { status: String, logs: String },

    #[error("Failed to run GIMP: {0}")]
    Io(#[from] std::io::Error),
}

impl BannerError {
    /// Short advice printed after a timeout; the cause is rarely visible in GIMP's own output.
    pub fn timeout_hint() -> &'static str {
        "This might indicate:\n\
- GIMP is stuck processing a large image\n\
- The template file is corrupted or very large\n\
- System resources are constrained"
    }
}

pub type Result<T> = std::result::Result<T, BannerError>;
