use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;
use tracing::{debug, error, info, instrument};

use crate::banner::BannerJob;
use crate::error::{BannerError, Result};
use crate::gimp::{self, GimpLogs, GimpVersion, HostEnv};
use crate::script::{self, ScriptDialect};

/// Drives GIMP for banners and blank templates. The host and the script dialect
/// are probed once and reused for every job.
#[derive(Debug, Clone)]
pub struct Generator {
    host: HostEnv,
    version: GimpVersion,
    dialect: ScriptDialect,
    timeout: Duration,
}

impl Generator {
    pub fn new(host: HostEnv, version: GimpVersion) -> Result<Self> {
        let dialect = ScriptDialect::for_version(version)?;
        Ok(Self {
            host,
            version,
            dialect,
            timeout: gimp::BANNER_TIMEOUT,
        })
    }

    pub async fn detect() -> Result<Self> {
        let host = HostEnv::detect()?;
        let version = gimp::probe_version(&host).await?;
        Self::new(host, version)
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn host(&self) -> &HostEnv {
        &self.host
    }

    pub fn version(&self) -> GimpVersion {
        self.version
    }

    pub fn dialect(&self) -> ScriptDialect {
        self.dialect
    }

    /// Renders one banner. The output directory is created if needed.
    #[instrument(skip(self, job), fields(template = %job.template.display(), base = %job.outputs.base_filename))]
    pub async fn generate(&self, job: &BannerJob) -> Result<GimpLogs> {
        if let Some(dir) = job.outputs.working.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let script = script::render_banner_script(self.dialect, job);
        let logs = self.run(&script, self.timeout).await?;
        info!(
            working = %job.outputs.working.display(),
            flattened = %job.outputs.flattened.display(),
            "Banner generated"
        );
        Ok(logs)
    }

    /// Writes a blank template with the expected layers to `output_path`.
    #[instrument(skip(self))]
    pub async fn create_template(&self, output_path: &Path, width: u32, height: u32) -> Result<GimpLogs> {
        let script = script::render_template_script(self.dialect, output_path, width, height)?;
        self.run(&script, gimp::TEMPLATE_TIMEOUT).await
    }

    async fn run(&self, script: &str, timeout: Duration) -> Result<GimpLogs> {
        // Removed when dropped, whether GIMP succeeded or not.
        let mut file = NamedTempFile::with_suffix(".py")?;
        file.write_all(script.as_bytes())?;
        file.flush()?;

        let result = gimp::run_script(&self.host, file.path(), timeout).await;
        match &result {
            Ok(logs) => debug!("GIMP output:\n{}", logs.render()),
            Err(e) => error!("GIMP run failed: {e}"),
        }
        result
    }

    /// Runs every job in order, continuing past failures. `on_event` sees each job
    /// start and finish.
    pub async fn generate_all<F>(&self, jobs: &[BannerJob], mut on_event: F) -> RunSummary
    where
        F: FnMut(JobEvent<'_>),
    {
        let mut summary = RunSummary::default();
        for job in jobs {
            on_event(JobEvent::Started(job));
            match self.generate(job).await {
                Ok(_) => {
                    on_event(JobEvent::Generated(job));
                    summary.generated.push(job.outputs.working.clone());
                }
                Err(e) => {
                    on_event(JobEvent::Failed(job, &e));
                    summary.failed.push((job.template.clone(), e));
                }
            }
        }
        summary
    }
}

#[derive(Debug, Clone, Copy)]
pub enum JobEvent<'a> {
    Started(&'a BannerJob),
    Generated(&'a BannerJob),
    Failed(&'a BannerJob, &'a BannerError),
}

#[derive(Debug, Default)]
pub struct RunSummary {
    pub generated: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, BannerError)>,
}

impl RunSummary {
    pub fn total(&self) -> usize {
        self.generated.len() + self.failed.len()
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}
