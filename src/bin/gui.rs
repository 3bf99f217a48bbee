use eframe::egui;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::mpsc;

use banner_lib::banner::{self, BannerFields, DEFAULT_TIME};
use banner_lib::config::{self, Settings};
use banner_lib::generator::{Generator, JobEvent};
use banner_lib::{templates, BannerError, FlatFormat};

// --- Messages from background thread ---

enum WorkerMessage {
    Progress(String),
    Generated(Vec<PathBuf>),
    Failed(String),
    TemplateCreated {
        file_name: String,
        path: PathBuf,
        width: u32,
        height: u32,
    },
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum LogLevel {
    Info,
    Success,
    Error,
}

// --- App State ---

struct BannerApp {
    settings: Settings,
    config_path: PathBuf,

    // Templates
    template_dir: String,
    available: Vec<String>,
    selected: BTreeSet<String>,

    // Banner fields (editable)
    title1: String,
    title2: String,
    speaker_name: String,
    speaker_title: String,
    date: String,
    time: String,
    photo_path: String,

    // Output
    output_dir: String,
    flat_format: FlatFormat,
    open_in_gimp: bool,

    // New template panel
    new_template_name: String,
    preset: usize,
    custom_size: bool,
    custom_width: String,
    custom_height: String,

    // Worker state
    busy: bool,
    log: Vec<(LogLevel, String)>,
    rx: Option<mpsc::Receiver<WorkerMessage>>,
}

impl BannerApp {
    fn new(config_path: PathBuf) -> Self {
        let settings = config::load(&config_path);
        let time = if settings.time.is_empty() {
            DEFAULT_TIME.to_string()
        } else {
            settings.time.clone()
        };

        let mut app = Self {
            template_dir: settings.template_directory.clone(),
            available: Vec::new(),
            selected: settings.selected_templates().into_iter().collect(),
            title1: settings.title1.clone(),
            title2: settings.title2.clone(),
            speaker_name: settings.speaker_name.clone(),
            speaker_title: settings.speaker_title.clone(),
            date: settings.date.clone(),
            time,
            photo_path: settings.photo_path.clone(),
            output_dir: settings.output_directory.clone(),
            flat_format: settings.flat_format,
            open_in_gimp: false,
            new_template_name: String::new(),
            preset: 0,
            custom_size: false,
            custom_width: "1920".to_string(),
            custom_height: "1080".to_string(),
            busy: false,
            log: Vec::new(),
            rx: None,
            settings,
            config_path,
        };
        app.refresh_templates();
        app
    }

    fn push_log(&mut self, level: LogLevel, msg: impl Into<String>) {
        self.log.push((level, msg.into()));
    }

    fn refresh_templates(&mut self) {
        if self.template_dir.is_empty() {
            self.available.clear();
            return;
        }
        self.available = templates::template_names(Path::new(&self.template_dir));
        let available = &self.available;
        self.selected.retain(|name| available.contains(name));
        if self.selected.is_empty() {
            if let Some(first) = self.available.first() {
                self.selected.insert(first.clone());
            }
        }
        if self.available.is_empty() {
            let msg = format!("No .xcf templates in {}", self.template_dir);
            self.push_log(LogLevel::Info, msg);
        }
    }

    fn fields(&self) -> BannerFields {
        BannerFields {
            title1: self.title1.trim().to_string(),
            title2: self.title2.trim().to_string(),
            speaker_name: self.speaker_name.trim().to_string(),
            speaker_title: self.speaker_title.trim().to_string(),
            date: self.date.trim().to_string(),
            time: self.time.trim().to_string(),
            photo: (!self.photo_path.trim().is_empty()).then(|| PathBuf::from(self.photo_path.trim())),
        }
    }

    fn save_settings(&mut self) {
        let fields = self.fields();
        self.settings.template_directory = self.template_dir.clone();
        self.settings.output_directory = self.output_dir.clone();
        self.settings.flat_format = self.flat_format;
        self.settings
            .set_selected_templates(self.selected.iter().cloned().collect());
        self.settings.remember(&fields);

        if let Err(e) = config::save(&self.settings, &self.config_path) {
            let msg = format!("Could not save settings: {e:#}");
            self.push_log(LogLevel::Error, msg);
        }
    }

    fn browse_template_dir(&mut self) {
        let mut dialog = rfd::FileDialog::new().set_title("Select template directory");
        if !self.template_dir.is_empty() {
            dialog = dialog.set_directory(&self.template_dir);
        }
        if let Some(dir) = dialog.pick_folder() {
            self.template_dir = dir.display().to_string();
            self.refresh_templates();
            self.save_settings();
        }
    }

    fn browse_output_dir(&mut self) {
        if let Some(dir) = rfd::FileDialog::new()
            .set_title("Select output directory")
            .pick_folder()
        {
            self.output_dir = dir.display().to_string();
            self.save_settings();
        }
    }

    fn browse_photo(&mut self) {
        if let Some(file) = rfd::FileDialog::new()
            .add_filter("Images", &["png", "jpg", "jpeg", "gif", "bmp", "tiff", "webp"])
            .set_title("Select speaker photo")
            .pick_file()
        {
            self.set_photo(file);
        }
    }

    fn set_photo(&mut self, path: PathBuf) {
        self.photo_path = path.display().to_string();
        self.save_settings();
    }

    fn toggle_template(&mut self, name: String, checked: bool) {
        if checked {
            self.selected.insert(name);
        } else {
            self.selected.remove(&name);
        }
        self.save_settings();
    }

    /// Checks the form before anything is sent to the worker.
    fn validate(&self) -> Result<(Vec<PathBuf>, BannerFields), String> {
        if self.template_dir.is_empty() {
            return Err("Please select a template directory".into());
        }
        if self.selected.is_empty() {
            return Err("Please select at least one template".into());
        }
        if self.output_dir.is_empty() {
            return Err("Please select an output directory".into());
        }
        let fields = self.fields();
        fields.validate().map_err(|e| match e {
            BannerError::MissingField(name) => format!("Please enter {name}"),
            other => other.to_string(),
        })?;

        let dir = Path::new(&self.template_dir);
        let templates = self.selected.iter().map(|name| dir.join(name)).collect();
        Ok((templates, fields))
    }

    fn start_generation(&mut self, ctx: &egui::Context) {
        let (templates, fields) = match self.validate() {
            Ok(v) => v,
            Err(msg) => {
                self.push_log(LogLevel::Error, msg);
                return;
            }
        };

        let today = chrono::Local::now().date_naive();
        let jobs = banner::plan_jobs(
            &fields,
            &templates,
            Path::new(&self.output_dir),
            self.flat_format,
            today,
        );
        let timeout = std::time::Duration::from_secs(self.settings.timeout_secs);

        let (tx, rx) = mpsc::channel();
        self.rx = Some(rx);
        self.busy = true;
        self.log.clear();

        let ctx = ctx.clone();

        std::thread::spawn(move || {
            let send = |msg: WorkerMessage| {
                let _ = tx.send(msg);
                ctx.request_repaint();
            };

            let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
                Ok(rt) => rt,
                Err(e) => return send(WorkerMessage::Failed(e.to_string())),
            };

            runtime.block_on(async {
                let generator = match Generator::detect().await {
                    Ok(g) => g.with_timeout(timeout),
                    Err(e) => return send(WorkerMessage::Failed(e.to_string())),
                };

                let summary = generator
                    .generate_all(&jobs, |event| match event {
                        JobEvent::Started(job) => send(WorkerMessage::Progress(format!(
                            "Generating from {}...",
                            file_name(&job.template)
                        ))),
                        JobEvent::Generated(job) => send(WorkerMessage::Progress(format!(
                            "  {}",
                            job.outputs.working.display()
                        ))),
                        JobEvent::Failed(..) => {}
                    })
                    .await;

                if summary.is_success() {
                    send(WorkerMessage::Generated(summary.generated));
                } else {
                    let failures: Vec<String> = summary
                        .failed
                        .iter()
                        .map(|(template, e)| {
                            let mut msg = format!("{}: {e}", file_name(template));
                            if matches!(e, BannerError::Timeout(_)) {
                                msg.push('\n');
                                msg.push_str(BannerError::timeout_hint());
                            }
                            msg
                        })
                        .collect();
                    send(WorkerMessage::Failed(failures.join("\n")));
                }
            });
        });
    }

    fn start_template_creation(&mut self, ctx: &egui::Context) {
        if self.template_dir.is_empty() {
            self.push_log(LogLevel::Error, "Please select a template directory first");
            return;
        }
        let name = self.new_template_name.trim().to_string();
        if name.is_empty() {
            self.push_log(LogLevel::Error, "Please enter a template name");
            return;
        }
        let size = if self.custom_size {
            custom_size(&self.custom_width, &self.custom_height)
        } else {
            templates::PRESETS
                .get(self.preset)
                .map(|p| (p.width, p.height))
                .ok_or_else(|| "Please choose a size".to_string())
        };
        let (width, height) = match size {
            Ok(size) => size,
            Err(msg) => {
                self.push_log(LogLevel::Error, msg);
                return;
            }
        };

        let file_name = templates::template_file_name(&name);
        let path = Path::new(&self.template_dir).join(&file_name);
        if path.exists() {
            let msg = format!("Template '{file_name}' already exists");
            self.push_log(LogLevel::Error, msg);
            return;
        }

        let (tx, rx) = mpsc::channel();
        self.rx = Some(rx);
        self.busy = true;

        let ctx = ctx.clone();

        std::thread::spawn(move || {
            let result = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .map_err(BannerError::from)
                .and_then(|rt| {
                    rt.block_on(async {
                        let generator = Generator::detect().await?;
                        generator.create_template(&path, width, height).await
                    })
                });

            let msg = match result {
                Ok(_) => WorkerMessage::TemplateCreated {
                    file_name,
                    path,
                    width,
                    height,
                },
                Err(e) => WorkerMessage::Failed(format!("Could not create template: {e}")),
            };
            let _ = tx.send(msg);
            ctx.request_repaint();
        });
    }

    fn drain_messages(&mut self) {
        let Some(rx) = self.rx.take() else {
            return;
        };
        let mut done = false;
        while let Ok(msg) = rx.try_recv() {
            match msg {
                WorkerMessage::Progress(line) => self.push_log(LogLevel::Info, line),
                WorkerMessage::Generated(files) => {
                    self.push_log(LogLevel::Success, "Banner generated successfully!");
                    self.save_settings();
                    if self.open_in_gimp {
                        open_in_gimp(&files, &mut self.log);
                    }
                    done = true;
                }
                WorkerMessage::TemplateCreated {
                    file_name,
                    path,
                    width,
                    height,
                } => {
                    let msg = format!("Template '{file_name}' created ({width}x{height})");
                    self.push_log(LogLevel::Success, msg);
                    self.new_template_name.clear();
                    self.refresh_templates();
                    self.selected.insert(file_name);
                    self.save_settings();
                    open_in_gimp(&[path], &mut self.log);
                    done = true;
                }
                WorkerMessage::Failed(err) => {
                    self.push_log(LogLevel::Error, err);
                    done = true;
                }
            }
        }
        if done {
            self.busy = false;
        } else {
            self.rx = Some(rx);
        }
    }
}

/// Reads the custom width and height of the create-template panel.
fn custom_size(width: &str, height: &str) -> Result<(u32, u32), String> {
    match (width.trim().parse::<i64>(), height.trim().parse::<i64>()) {
        (Ok(w), Ok(h)) => templates::validate_size(w, h).map_err(|e| e.to_string()),
        _ => Err("Width and height must be whole numbers".to_string()),
    }
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default()
}

fn open_in_gimp(files: &[PathBuf], log: &mut Vec<(LogLevel, String)>) {
    if let Err(e) = std::process::Command::new("gimp").args(files).spawn() {
        log.push((LogLevel::Error, format!("Could not open GIMP: {e}")));
    }
}

impl eframe::App for BannerApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.drain_messages();

        if ctx.input(|i| i.viewport().close_requested()) {
            self.save_settings();
        }

        egui::CentralPanel::default().show(ctx, |ui| {
            egui::ScrollArea::vertical().show(ui, |ui| {
                ui.heading("GIMP Banner Generator");
                ui.add_space(8.0);

                let field_width = 380.0;

                // --- Templates ---
                ui.horizontal(|ui| {
                    ui.label("Templates:");
                    ui.add(egui::TextEdit::singleline(&mut self.template_dir).desired_width(field_width));
                    if ui.button("Browse").clicked() {
                        self.browse_template_dir();
                    }
                    if ui.button("Refresh").clicked() {
                        self.refresh_templates();
                    }
                });

                let mut toggled = None;
                if !self.available.is_empty() {
                    ui.horizontal_wrapped(|ui| {
                        for name in &self.available {
                            let mut checked = self.selected.contains(name);
                            if ui.checkbox(&mut checked, name).changed() {
                                toggled = Some((name.clone(), checked));
                            }
                        }
                    });
                }
                if let Some((name, checked)) = toggled {
                    self.toggle_template(name, checked);
                }

                ui.add_space(8.0);
                ui.separator();
                ui.add_space(8.0);

                // --- Banner fields ---
                egui::Grid::new("banner_fields")
                    .num_columns(2)
                    .spacing([12.0, 6.0])
                    .show(ui, |ui| {
                        for (label, value, hint) in [
                            ("Title 1:", &mut self.title1, "Main title"),
                            ("Title 2:", &mut self.title2, "Subtitle (optional)"),
                            ("Speaker Name:", &mut self.speaker_name, ""),
                            ("Speaker Title:", &mut self.speaker_title, "Affiliation (optional)"),
                            ("Date:", &mut self.date, "e.g. Feb 20, 2025-02-20"),
                            ("Time:", &mut self.time, DEFAULT_TIME),
                        ] {
                            ui.label(label);
                            ui.add(
                                egui::TextEdit::singleline(value)
                                    .hint_text(hint)
                                    .desired_width(field_width),
                            );
                            ui.end_row();
                        }

                        ui.label("Photo:");
                        ui.horizontal(|ui| {
                            ui.add(egui::TextEdit::singleline(&mut self.photo_path).desired_width(field_width - 70.0));
                            if ui.button("Browse").clicked() {
                                self.browse_photo();
                            }
                        });
                        ui.end_row();
                    });

                ui.add_space(8.0);

                // --- Output ---
                ui.horizontal(|ui| {
                    ui.label("Output:");
                    ui.add(egui::TextEdit::singleline(&mut self.output_dir).desired_width(field_width));
                    if ui.button("Browse").clicked() {
                        self.browse_output_dir();
                    }
                });
                ui.horizontal(|ui| {
                    ui.label("Flattened copy:");
                    ui.radio_value(&mut self.flat_format, FlatFormat::Jpg, "JPG");
                    ui.radio_value(&mut self.flat_format, FlatFormat::Png, "PNG");
                    ui.add_space(12.0);
                    ui.checkbox(&mut self.open_in_gimp, "Open in GIMP when done");
                });

                ui.add_space(8.0);
                ui.separator();
                ui.add_space(8.0);

                ui.horizontal(|ui| {
                    if ui
                        .add_enabled(!self.busy, egui::Button::new("Generate Banner"))
                        .clicked()
                    {
                        self.start_generation(ctx);
                    }
                    if self.busy {
                        ui.spinner();
                        ui.label("Running GIMP...");
                    }
                });

                ui.add_space(8.0);

                // --- Status ---
                for (level, msg) in &self.log {
                    let color = match level {
                        LogLevel::Info => ui.visuals().text_color(),
                        LogLevel::Success => egui::Color32::GREEN,
                        LogLevel::Error => egui::Color32::RED,
                    };
                    ui.colored_label(color, msg);
                }

                ui.add_space(8.0);

                // --- New template ---
                egui::CollapsingHeader::new("Create new template").show(ui, |ui| {
                    ui.horizontal(|ui| {
                        ui.label("Name:");
                        ui.text_edit_singleline(&mut self.new_template_name);
                    });
                    let selected_label = templates::PRESETS
                        .get(self.preset)
                        .map(|p| format!("{}x{} ({})", p.width, p.height, p.label))
                        .unwrap_or_default();
                    ui.horizontal(|ui| {
                        ui.radio_value(&mut self.custom_size, false, "Preset");
                        ui.radio_value(&mut self.custom_size, true, "Custom");
                    });
                    if self.custom_size {
                        ui.horizontal(|ui| {
                            ui.label("Width:");
                            ui.add(egui::TextEdit::singleline(&mut self.custom_width).desired_width(80.0));
                            ui.label("Height:");
                            ui.add(egui::TextEdit::singleline(&mut self.custom_height).desired_width(80.0));
                        });
                    } else {
                        egui::ComboBox::from_label("Size")
                            .selected_text(selected_label)
                            .show_ui(ui, |ui| {
                                for (i, p) in templates::PRESETS.iter().enumerate() {
                                    ui.selectable_value(
                                        &mut self.preset,
                                        i,
                                        format!("{}x{} ({})", p.width, p.height, p.label),
                                    );
                                }
                            });
                    }
                    if ui
                        .add_enabled(!self.busy, egui::Button::new("Create Template"))
                        .clicked()
                    {
                        self.start_template_creation(ctx);
                    }
                });
            });
        });
    }
}

fn main() -> eframe::Result {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    // Optional settings path as first argument
    let config_path = std::env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(config::default_path);

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([640.0, 860.0])
            .with_min_inner_size([560.0, 600.0]),
        ..Default::default()
    };

    eframe::run_native(
        "GIMP Banner Generator",
        options,
        Box::new(|_cc| Ok(Box::new(BannerApp::new(config_path)))),
    )
}
