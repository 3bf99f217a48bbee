use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use banner_lib::banner::{self, BannerFields, DEFAULT_TIME};
use banner_lib::config::{self, Settings};
use banner_lib::generator::{Generator, JobEvent, RunSummary};
use banner_lib::{templates, BannerError, FlatFormat};

#[derive(Parser)]
#[command(
    name = "banner",
    version,
    about = "Generate event banners from GIMP templates",
    after_help = "Examples:\n  \
banner -t templates/banner.xcf -o ./output --title1 \"AI Meetup\" \\\n      \
--speaker-name \"Jane Doe\" --date \"Feb 20\" --time \"7:00 PM\"\n  \
banner -T templates/ -o ./output --title1 \"AI Meetup\" --speaker-name \"Jane Doe\" --date \"Feb 20\"\n  \
banner auto"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    banner: BannerArgs,

    /// Settings file (default: ~/.config/gimp-banner-generator/config.json)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Suppress non-error output
    #[arg(short, long, global = true)]
    quiet: bool,

    /// More log output (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
}

#[derive(Args)]
struct BannerArgs {
    /// GIMP template file(s) (.xcf)
    #[arg(short = 't', long = "template", num_args = 1.., value_name = "FILE")]
    templates: Vec<PathBuf>,

    /// Directory containing .xcf templates (all will be used)
    #[arg(short = 'T', long, value_name = "DIR")]
    template_dir: Option<PathBuf>,

    /// Output directory for generated files
    #[arg(short, long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Main title text
    #[arg(long, value_name = "TEXT")]
    title1: Option<String>,

    /// Subtitle text
    #[arg(long, default_value = "", value_name = "TEXT")]
    title2: String,

    /// Speaker name
    #[arg(long, value_name = "TEXT")]
    speaker_name: Option<String>,

    /// Speaker title/affiliation
    #[arg(long, default_value = "", value_name = "TEXT")]
    speaker_title: String,

    /// Event date (flexible format: "Jan 15", "2025-01-15", etc.)
    #[arg(long, value_name = "TEXT")]
    date: Option<String>,

    /// Event time
    #[arg(long, default_value = DEFAULT_TIME, value_name = "TEXT")]
    time: String,

    /// Speaker photo file
    #[arg(long, value_name = "FILE")]
    photo: Option<PathBuf>,

    /// Format of the flattened copy
    #[arg(long, value_enum, default_value_t = FlatFormat::Jpg)]
    format: FlatFormat,

    /// Seconds before a GIMP run is abandoned
    #[arg(long, default_value_t = 60)]
    timeout: u64,

    /// Print the planned output files without running GIMP
    #[arg(long)]
    dry_run: bool,

    /// Save these values as the defaults for `banner auto` and the GUI
    #[arg(long)]
    remember: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate from the values saved by the GUI or by --remember
    Auto,

    /// Generate many banners from a list file (.toml)
    Batch {
        /// List file with one [[banners]] table per banner
        list: PathBuf,

        /// Seconds before a GIMP run is abandoned (default: the list's
        /// `timeout_secs`, then the saved settings)
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Check that GIMP can be run in batch mode
    Check,

    /// Create a blank template with the expected layers
    NewTemplate {
        /// Template name (".xcf" is added if missing)
        #[arg(required_unless_present = "list_presets")]
        name: Option<String>,

        /// Directory to create it in (default: the saved template directory)
        #[arg(short = 'T', long)]
        template_dir: Option<PathBuf>,

        /// Canvas size as WIDTHxHEIGHT
        #[arg(long, default_value = "1920x1080", conflicts_with = "preset")]
        size: String,

        /// Use a preset size by number (see --list-presets)
        #[arg(long)]
        preset: Option<usize>,

        /// List the preset sizes and exit
        #[arg(long)]
        list_presets: bool,

        /// Replace an existing file
        #[arg(long)]
        force: bool,
    },
}

struct Reporter {
    quiet: bool,
}

impl Reporter {
    fn say(&self, msg: impl AsRef<str>) {
        if !self.quiet {
            println!("{}", msg.as_ref());
        }
    }
}

const fn log_filter_from_verbosity(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "banner_lib=debug,info",
        _ => "trace",
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(log_filter_from_verbosity(cli.verbose)))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config_path = cli.config.clone().unwrap_or_else(config::default_path);
    let out = Reporter { quiet: cli.quiet };

    let ok = match cli.command {
        Some(Commands::Auto) => run_auto(&config_path, &out).await?,
        Some(Commands::Batch { list, timeout }) => {
            let timeout = timeout.map(Duration::from_secs);
            run_batch(&list, timeout, &config_path, &out).await?
        }
        Some(Commands::Check) => check_gimp(&out).await?,
        Some(Commands::NewTemplate {
            name,
            template_dir,
            size,
            preset,
            list_presets,
            force,
        }) => {
            let Some(name) = name.filter(|_| !list_presets) else {
                print_presets();
                return Ok(());
            };
            let dir = match template_dir {
                Some(dir) => dir,
                None => {
                    let settings = config::load(&config_path);
                    if settings.template_directory.is_empty() {
                        bail!("Please give --template-dir or select a template directory in the GUI first");
                    }
                    PathBuf::from(settings.template_directory)
                }
            };
            new_template(&dir, &name, &size, preset, force, &out).await?
        }
        None => run_generate(cli.banner, &config_path, &out).await?,
    };

    if !ok {
        std::process::exit(1);
    }
    Ok(())
}

async fn run_generate(args: BannerArgs, config_path: &Path, out: &Reporter) -> Result<bool> {
    let output_dir = args
        .output_dir
        .context("Missing --output-dir. Usage: banner -t <template.xcf> -o <dir> --title1 <text> --speaker-name <text> --date <text>")?;
    let fields = BannerFields {
        title1: args.title1.context("Missing --title1")?,
        title2: args.title2,
        speaker_name: args.speaker_name.context("Missing --speaker-name")?,
        speaker_title: args.speaker_title,
        date: args.date.context("Missing --date")?,
        time: args.time,
        photo: args.photo.map(absolute),
    };

    let template_dir = args.template_dir.map(absolute);
    let template_files: Vec<PathBuf> = args.templates.into_iter().map(absolute).collect();
    let templates = banner_lib::collect_templates(template_dir.as_deref(), &template_files)?;
    fields.validate()?;

    let output_dir = absolute(output_dir);
    if !output_dir.exists() {
        std::fs::create_dir_all(&output_dir)
            .with_context(|| format!("Could not create directory: {}", output_dir.display()))?;
        out.say(format!("Created output directory: {}", output_dir.display()));
    }

    let today = chrono::Local::now().date_naive();
    let jobs = banner::plan_jobs(&fields, &templates, &output_dir, args.format, today);

    if args.dry_run {
        for job in &jobs {
            println!("{} -> {}", job.template.display(), job.outputs.working.display());
            println!("{} -> {}", job.template.display(), job.outputs.flattened.display());
        }
        return Ok(true);
    }

    let generator = Generator::detect()
        .await?
        .with_timeout(Duration::from_secs(args.timeout));
    let summary = generate(&generator, &jobs, out).await;

    if summary.is_success() && args.remember {
        let mut settings = config::load(config_path);
        settings.remember(&fields);
        settings.output_directory = output_dir.display().to_string();
        settings.flat_format = args.format;
        if let Some(dir) = &template_dir {
            settings.template_directory = dir.display().to_string();
        } else if let Some(first) = templates.first().and_then(|t| t.parent()) {
            settings.template_directory = first.display().to_string();
        }
        settings.set_selected_templates(
            templates
                .iter()
                .filter_map(|t| t.file_name().and_then(|n| n.to_str()).map(str::to_string))
                .collect(),
        );
        config::save(&settings, config_path)?;
        out.say(format!("Saved settings to {}", config_path.display()));
    }

    Ok(summary.is_success())
}

async fn generate(generator: &Generator, jobs: &[banner::BannerJob], out: &Reporter) -> RunSummary {
    let summary = generator
        .generate_all(jobs, |event| match event {
            JobEvent::Started(job) => {
                out.say(format!("Generating from: {}", file_name(&job.template)));
                out.say(format!(
                    "  Output: {}, {}",
                    file_name(&job.outputs.working),
                    file_name(&job.outputs.flattened)
                ));
            }
            JobEvent::Generated(_) => out.say("  Done!"),
            JobEvent::Failed(job, e) => {
                eprintln!("Error generating {}: {e}", file_name(&job.template));
                if matches!(e, BannerError::Timeout(_)) {
                    eprintln!("{}", BannerError::timeout_hint());
                }
            }
        })
        .await;

    out.say("");
    out.say(format!(
        "Generated {}/{} banner(s)",
        summary.generated.len(),
        summary.total()
    ));
    if !summary.failed.is_empty() {
        out.say(format!("Failed: {}", summary.failed.len()));
    }
    summary
}

/// Runs from the saved settings, with the same checks the GUI applies.
async fn run_auto(config_path: &Path, out: &Reporter) -> Result<bool> {
    let settings = config::load(config_path);
    let templates = auto_templates(&settings)?;
    if settings.output_directory.is_empty() {
        bail!("No output directory configured. Please run the GUI first.");
    }
    let fields = settings.fields();
    fields.validate().map_err(|e| match e {
        BannerError::MissingField(_) => {
            anyhow::anyhow!("{e}. Please run the GUI first and fill in the form.")
        }
        other => other.into(),
    })?;

    let output_dir = PathBuf::from(&settings.output_directory);
    let today = chrono::Local::now().date_naive();
    let jobs = banner::plan_jobs(&fields, &templates, &output_dir, settings.flat_format, today);

    let generator = Generator::detect()
        .await?
        .with_timeout(Duration::from_secs(settings.timeout_secs));
    let summary = generate(&generator, &jobs, out).await;

    if summary.is_success() {
        out.say("Banner generated successfully!");
        for job in &jobs {
            out.say(format!("  {}", file_name(&job.outputs.working)));
            out.say(format!("  {}", file_name(&job.outputs.flattened)));
        }
    } else {
        eprintln!("Error: Banner generation failed. See logs above.");
    }
    Ok(summary.is_success())
}

fn auto_templates(settings: &Settings) -> Result<Vec<PathBuf>> {
    if settings.template_directory.is_empty() {
        bail!("No template directory configured. Please run the GUI first.");
    }
    let names = settings.selected_templates();
    if names.is_empty() {
        bail!("No template selected. Please run the GUI first and select a template.");
    }
    let dir = Path::new(&settings.template_directory);
    names
        .iter()
        .map(|name| {
            let path = dir.join(name);
            if path.exists() {
                Ok(path)
            } else {
                bail!("Template file not found: {}", path.display())
            }
        })
        .collect()
}

/// A `banner batch` list file.
#[derive(Debug, serde::Deserialize)]
struct BatchFile {
    output_dir: PathBuf,
    #[serde(default)]
    format: FlatFormat,
    timeout_secs: Option<u64>,
    #[serde(default)]
    banners: Vec<BatchEntry>,
}

#[derive(Debug, serde::Deserialize)]
struct BatchEntry {
    templates: Vec<PathBuf>,
    title1: String,
    #[serde(default)]
    title2: String,
    speaker_name: String,
    #[serde(default)]
    speaker_title: String,
    date: String,
    #[serde(default = "default_time")]
    time: String,
    photo: Option<PathBuf>,
}

fn default_time() -> String {
    DEFAULT_TIME.to_string()
}

impl BatchFile {
    /// `--timeout` wins over the list, which wins over the saved settings.
    fn timeout(&self, flag: Option<Duration>, settings: &Settings) -> Duration {
        flag.or(self.timeout_secs.map(Duration::from_secs))
            .unwrap_or(Duration::from_secs(settings.timeout_secs))
    }
}

async fn run_batch(
    list_path: &Path,
    timeout: Option<Duration>,
    config_path: &Path,
    out: &Reporter,
) -> Result<bool> {
    let content = std::fs::read_to_string(list_path)
        .with_context(|| format!("Could not read {}", list_path.display()))?;
    let batch: BatchFile = toml::from_str(&content)
        .with_context(|| format!("Could not parse {}", list_path.display()))?;

    // Relative paths in the list are relative to the list file.
    let base = list_path.parent().unwrap_or(Path::new("."));
    let output_dir = base.join(&batch.output_dir);
    let today = chrono::Local::now().date_naive();
    let timeout = batch.timeout(timeout, &config::load(config_path));

    let mut jobs = Vec::new();
    for (i, entry) in batch.banners.into_iter().enumerate() {
        let fields = BannerFields {
            title1: entry.title1,
            title2: entry.title2,
            speaker_name: entry.speaker_name,
            speaker_title: entry.speaker_title,
            date: entry.date,
            time: entry.time,
            photo: entry.photo.map(|p| base.join(p)),
        };
        let files: Vec<PathBuf> = entry.templates.iter().map(|t| base.join(t)).collect();
        let templates = banner_lib::collect_templates(None, &files)
            .with_context(|| format!("Banner #{}", i + 1))?;
        fields
            .validate()
            .with_context(|| format!("Banner #{} ({})", i + 1, fields.title1))?;
        jobs.extend(banner::plan_jobs(&fields, &templates, &output_dir, batch.format, today));
    }

    out.say(format!("Processing {} banner(s)...\n", jobs.len()));
    let generator = Generator::detect().await?.with_timeout(timeout);
    let summary = generate(&generator, &jobs, out).await;

    if !summary.failed.is_empty() {
        eprintln!("\n{} error(s):", summary.failed.len());
        for (template, err) in &summary.failed {
            eprintln!("  - {}: {err}", template.display());
        }
    }
    Ok(summary.is_success())
}

async fn check_gimp(out: &Reporter) -> Result<bool> {
    match Generator::detect().await {
        Ok(generator) => {
            let host = generator.host();
            out.say(format!("GIMP: {}", host.binary.display()));
            out.say(format!("Version: {} ({:?})", generator.version(), generator.dialect()));
            out.say(format!("xvfb-run: {}", if host.has_xvfb { "found" } else { "not found" }));
            out.say(format!("DISPLAY: {}", if host.has_display { "set" } else { "not set" }));
            Ok(true)
        }
        Err(e) => {
            eprintln!("ERROR: {e}");
            Ok(false)
        }
    }
}

fn print_presets() {
    for (i, preset) in templates::PRESETS.iter().enumerate() {
        println!("{i}: {}x{} ({})", preset.width, preset.height, preset.label);
    }
}

async fn new_template(
    dir: &Path,
    name: &str,
    size: &str,
    preset: Option<usize>,
    force: bool,
    out: &Reporter,
) -> Result<bool> {
    if !dir.is_dir() {
        bail!("Template directory does not exist: {}", dir.display());
    }
    if name.trim().is_empty() {
        bail!("Please enter a template name");
    }
    let (width, height) = match preset {
        Some(i) => {
            let preset = templates::PRESETS
                .get(i)
                .with_context(|| format!("No preset #{i}; see --list-presets"))?;
            (preset.width, preset.height)
        }
        None => templates::parse_size(size)?,
    };

    let file_name = templates::template_file_name(name);
    let path = dir.join(&file_name);
    if path.exists() && !force {
        bail!("Template '{file_name}' already exists. Use --force to overwrite.");
    }

    let generator = Generator::detect().await?;
    generator.create_template(&path, width, height).await?;
    out.say(format!("Template '{file_name}' created successfully!"));
    out.say(format!("Dimensions: {width}x{height}"));
    out.say(format!("  {}", path.display()));
    Ok(true)
}

fn absolute(path: PathBuf) -> PathBuf {
    std::path::absolute(&path).unwrap_or(path)
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}
