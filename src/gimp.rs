use regex::Regex;
use std::ffi::OsString;
use std::fmt;
use std::path::{Path, PathBuf};
use std::process::{ExitStatus, Stdio};
use std::sync::LazyLock;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};

use crate::error::{BannerError, Result};

pub const BANNER_TIMEOUT: Duration = Duration::from_secs(60);
pub const TEMPLATE_TIMEOUT: Duration = Duration::from_secs(30);
pub const VERSION_TIMEOUT: Duration = Duration::from_secs(5);

/// GIMP exits non-zero after the batch script finishes when `--quit` follows a
/// procedure with no return values. The files are written; treat it as success.
const NO_RETURN_VALUES: &str = "returned no return values";

static VERSION: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d+)\.(\d+)").expect("valid version pattern"));

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct GimpVersion {
    pub major: u32,
    pub minor: u32,
}

impl GimpVersion {
    /// Reads the first `major.minor` out of `gimp --version` output.
    pub fn parse(output: &str) -> Option<Self> {
        let caps = VERSION.captures(output)?;
        Some(Self {
            major: caps[1].parse().ok()?,
            minor: caps[2].parse().ok()?,
        })
    }
}

impl fmt::Display for GimpVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

/// What the machine offers for running GIMP without a window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HostEnv {
    pub binary: PathBuf,
    pub has_xvfb: bool,
    pub has_display: bool,
}

impl HostEnv {
    /// Prefers `gimp-console` (no GTK) over `gimp`.
    pub fn detect() -> Result<Self> {
        let binary = find_in_path("gimp-console")
            .or_else(|| find_in_path("gimp"))
            .ok_or(BannerError::GimpNotFound)?;
        let host = Self {
            binary,
            has_xvfb: find_in_path("xvfb-run").is_some(),
            has_display: std::env::var_os("DISPLAY").is_some_and(|d| !d.is_empty()),
        };
        debug!(?host, "Detected GIMP host");
        Ok(host)
    }
}

/// Looks `name` up in `PATH` the way a shell would.
pub fn find_in_path(name: &str) -> Option<PathBuf> {
    let path = std::env::var_os("PATH")?;
    std::env::split_paths(&path)
        .map(|dir| dir.join(name))
        .find(|candidate| is_executable(candidate))
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .is_ok_and(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file() || path.with_extension("exe").is_file()
}

pub async fn probe_version(host: &HostEnv) -> Result<GimpVersion> {
    let mut cmd = Command::new(&host.binary);
    cmd.arg("--version").kill_on_drop(true);

    let output = tokio::time::timeout(VERSION_TIMEOUT, cmd.output())
        .await
        .map_err(|_| BannerError::VersionDetectionFailed)?
        .map_err(|e| {
            warn!(error = %e, "Could not run gimp --version");
            BannerError::VersionDetectionFailed
        })?;

    if !output.status.success() {
        return Err(BannerError::VersionDetectionFailed);
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    let version = GimpVersion::parse(stdout.trim()).ok_or(BannerError::VersionDetectionFailed)?;
    if version.major < 2 {
        return Err(BannerError::UnsupportedGimp {
            major: version.major,
            minor: version.minor,
        });
    }
    debug!(%version, "GIMP version");
    Ok(version)
}

/// Argument vector for running `script_file` headless. The first entry is the program.
pub fn build_command(host: &HostEnv, script_file: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = Vec::new();
    if host.has_xvfb {
        args.extend(["xvfb-run".into(), "-a".into()]);
    }
    args.push(host.binary.clone().into_os_string());
    if !host.has_xvfb && !host.has_display {
        args.push("--no-interface".into());
    }
    args.extend([
        "-i".into(),
        "--batch-interpreter".into(),
        "python-fu-eval".into(),
        "-b".into(),
        format!(
            "exec(open(\"{}\").read())",
            crate::script::escape_string(&script_file.display().to_string())
        )
        .into(),
        "--quit".into(),
    ]);
    args
}

/// The environment for GIMP: `vars` without the variables that would make its
/// embedded Python pick up the caller's virtualenv.
pub fn scrubbed_env<I>(vars: I) -> Vec<(OsString, OsString)>
where
    I: IntoIterator<Item = (OsString, OsString)>,
{
    vars.into_iter()
        .filter(|(key, value)| match key.to_str() {
            Some("VIRTUAL_ENV" | "VIRTUAL_ENV_PROMPT") => false,
            Some("PYTHONPATH") => !value.to_string_lossy().contains(".venv"),
            _ => true,
        })
        .collect()
}

/// Captured output of one GIMP run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GimpLogs {
    pub stdout: String,
    pub stderr: String,
}

impl GimpLogs {
    pub fn render(&self) -> String {
        let mut out = String::new();
        if !self.stdout.is_empty() {
            out.push_str("=== STDOUT ===\n");
            out.push_str(&self.stdout);
        }
        if !self.stderr.is_empty() {
            out.push_str("\n=== STDERR ===\n");
            out.push_str(&self.stderr);
        }
        if out.is_empty() {
            out.push_str("No output from GIMP");
        }
        out
    }
}

/// Turns a finished run into success or a classified failure.
pub fn classify(status: ExitStatus, logs: GimpLogs) -> Result<GimpLogs> {
    classify_exit(status.success(), &status.to_string(), logs)
}

fn classify_exit(success: bool, status: &str, logs: GimpLogs) -> Result<GimpLogs> {
    if success || logs.stderr.contains(NO_RETURN_VALUES) {
        return Ok(logs);
    }
    let rendered = logs.render();
    let lower = rendered.to_lowercase();
    if lower.contains("display") || lower.contains("gdk_display") {
        Err(BannerError::DisplayUnavailable { logs: rendered })
    } else {
        Err(BannerError::GimpFailed {
            status: status.to_string(),
            logs: rendered,
        })
    }
}

/// Runs a script file through GIMP, killing it after `timeout`.
pub async fn run_script(host: &HostEnv, script_file: &Path, timeout: Duration) -> Result<GimpLogs> {
    let argv = build_command(host, script_file);
    let Some((program, args)) = argv.split_first() else {
        return Err(BannerError::GimpNotFound);
    };

    let mut cmd = Command::new(program);
    cmd.args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .env_clear()
        .envs(scrubbed_env(std::env::vars_os()));

    debug!(command = ?argv, "Executing GIMP");

    let child = cmd.spawn().map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            BannerError::GimpNotFound
        } else {
            BannerError::Io(e)
        }
    })?;

    // Dropping the pending future on timeout kills the child.
    let output = tokio::time::timeout(timeout, child.wait_with_output())
        .await
        .map_err(|_| BannerError::Timeout(timeout))??;

    let logs = GimpLogs {
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    };
    classify(output.status, logs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host(has_xvfb: bool, has_display: bool) -> HostEnv {
        HostEnv {
            binary: PathBuf::from("/usr/bin/gimp-console"),
            has_xvfb,
            has_display,
        }
    }

    fn strings(argv: &[OsString]) -> Vec<String> {
        argv.iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    #[test]
    fn test_parse_version() {
        assert_eq!(
            GimpVersion::parse("GNU Image Manipulation Program version 3.0.4"),
            Some(GimpVersion { major: 3, minor: 0 })
        );
        assert_eq!(
            GimpVersion::parse("GNU Image Manipulation Program version 2.10.38"),
            Some(GimpVersion { major: 2, minor: 10 })
        );
        assert_eq!(GimpVersion::parse("gimp: command not found"), None);
    }

    #[test]
    fn test_build_command_with_xvfb() {
        let argv = strings(&build_command(&host(true, false), Path::new("/tmp/s.py")));
        assert_eq!(
            argv,
            [
                "xvfb-run",
                "-a",
                "/usr/bin/gimp-console",
                "-i",
                "--batch-interpreter",
                "python-fu-eval",
                "-b",
                "exec(open(\"/tmp/s.py\").read())",
                "--quit",
            ]
        );
    }

    #[test]
    fn test_build_command_without_display() {
        let argv = strings(&build_command(&host(false, false), Path::new("/tmp/s.py")));
        assert_eq!(argv[0], "/usr/bin/gimp-console");
        assert_eq!(argv[1], "--no-interface");

        let argv = strings(&build_command(&host(false, true), Path::new("/tmp/s.py")));
        assert!(!argv.iter().any(|a| a == "--no-interface"));
    }

    #[test]
    fn test_scrubbed_env() {
        let env = |pairs: &[(&str, &str)]| -> Vec<(OsString, OsString)> {
            pairs.iter().map(|(k, v)| (k.into(), v.into())).collect()
        };
        let vars = env(&[
            ("VIRTUAL_ENV", "/home/u/.venv"),
            ("PYTHONPATH", "/home/u/project/.venv/lib"),
            ("HOME", "/home/u"),
            ("VIRTUAL_ENV_PROMPT", "(venv)"),
            ("DISPLAY", ":0"),
        ]);
        assert_eq!(scrubbed_env(vars), env(&[("HOME", "/home/u"), ("DISPLAY", ":0")]));

        let system = env(&[("PYTHONPATH", "/usr/lib/python3")]);
        assert_eq!(scrubbed_env(system.clone()), system);
    }

    #[test]
    fn test_logs_render() {
        assert_eq!(GimpLogs::default().render(), "No output from GIMP");
        let logs = GimpLogs {
            stdout: "ok".into(),
            stderr: "warn".into(),
        };
        assert_eq!(logs.render(), "=== STDOUT ===\nok\n=== STDERR ===\nwarn");
    }

    #[test]
    fn test_classify_exit() {
        let logs = |stderr: &str| GimpLogs {
            stdout: String::new(),
            stderr: stderr.to_string(),
        };

        assert!(classify_exit(true, "exit status: 0", logs("")).is_ok());
        assert!(classify_exit(
            false,
            "exit status: 1",
            logs("batch command returned no return values")
        )
        .is_ok());
        assert!(matches!(
            classify_exit(false, "exit status: 1", logs("Gdk-CRITICAL: cannot open display: :0")),
            Err(BannerError::DisplayUnavailable { .. })
        ));
        match classify_exit(false, "exit status: 2", logs("Traceback: layer missing")) {
            Err(BannerError::GimpFailed { status, logs }) => {
                assert_eq!(status, "exit status: 2");
                assert!(logs.contains("Traceback"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_script_times_out() {
        // A fake "GIMP" that ignores its arguments and hangs.
        let dir = tempfile::tempdir().unwrap();
        let fake = dir.path().join("gimp-console");
        std::fs::write(&fake, "#!/bin/sh\nsleep 5\n").unwrap();
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&fake, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
        let host = HostEnv {
            binary: fake,
            has_xvfb: false,
            has_display: true,
        };
        let result = run_script(&host, Path::new("/tmp/unused.py"), Duration::from_millis(200)).await;
        assert!(matches!(result, Err(BannerError::Timeout(_))));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_script_captures_failure_output() {
        let dir = tempfile::tempdir().unwrap();
        let fake = dir.path().join("gimp-console");
        std::fs::write(&fake, "#!/bin/sh\necho 'no such layer' >&2\nexit 3\n").unwrap();
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&fake, std::fs::Permissions::from_mode(0o755)).unwrap();
        }
        let host = HostEnv {
            binary: fake,
            has_xvfb: false,
            has_display: true,
        };
        match run_script(&host, Path::new("/tmp/unused.py"), Duration::from_secs(5)).await {
            Err(BannerError::GimpFailed { logs, .. }) => assert!(logs.contains("no such layer")),
            other => panic!("unexpected {other:?}"),
        }
    }
}
