//! ZakirFLIX - Rust Edition
//! A desktop media catalog that plays HTTP streams and torrents

// Hide console window on Windows release builds
#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

// Use mimalloc for faster memory allocation (Linux, macOS)
#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: mimalloc::MiMalloc = mimalloc::MiMalloc;

use eframe::egui;
use std::cell::RefCell;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing_subscriber::EnvFilter;

mod catalog;
mod config;
mod m3u_parser;
mod models;
mod players;
mod session;

use catalog::Catalog;
use config::*;
use m3u_parser::{M3uEntry, PlaylistError};
use models::*;
use players::{ExternalPlayer, PlayerSettings, WebTorrentClient, WebTorrentSettings};
use session::{EngineKind, SessionManager, SessionStatus, StreamPlayer};

const CONSOLE_LINES: usize = 500;
const BUSY_REPAINT: Duration = Duration::from_millis(100);

/// Get current local time as HH:MM:SS
fn timestamp_now() -> String {
    chrono::Local::now().format("%H:%M:%S").to_string()
}

/// Draw the window icon: a play triangle on a rounded red tile
fn load_icon() -> egui::IconData {
    let size: usize = 64;
    let mut rgba = vec![0u8; size * size * 4];

    for y in 0..size {
        for x in 0..size {
            let idx = (y * size + x) * 4;
            let nx = x as f32 / size as f32;
            let ny = y as f32 / size as f32;

            let radius = 0.15;
            let dx = (radius - nx).max(nx - (1.0 - radius)).max(0.0);
            let dy = (radius - ny).max(ny - (1.0 - radius)).max(0.0);
            if dx * dx + dy * dy > radius * radius {
                continue;
            }

            // Triangle pointing right, centred on the tile
            let in_play = nx >= 0.36 && nx <= 0.72 && (ny - 0.5).abs() <= (0.72 - nx) * 0.6;
            let (r, g, b) = if in_play { (255, 255, 255) } else { (200, 16, 32) };
            rgba[idx] = r;
            rgba[idx + 1] = g;
            rgba[idx + 2] = b;
            rgba[idx + 3] = 255;
        }
    }

    egui::IconData {
        rgba,
        width: size as u32,
        height: size as u32,
    }
}

/// Register the first system emoji font found so badges and tabs render
fn install_emoji_font(ctx: &egui::Context) {
    #[cfg(target_os = "windows")]
    let candidates: &[&str] = &["C:\\Windows\\Fonts\\seguiemj.ttf"];
    #[cfg(target_os = "macos")]
    let candidates: &[&str] = &["/System/Library/Fonts/Apple Color Emoji.ttc"];
    #[cfg(not(any(target_os = "windows", target_os = "macos")))]
    let candidates: &[&str] = &[
        "/usr/share/fonts/truetype/noto/NotoColorEmoji.ttf",
        "/usr/share/fonts/noto-emoji/NotoColorEmoji.ttf",
        "/usr/share/fonts/google-noto-emoji/NotoColorEmoji.ttf",
        "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    ];

    let mut fonts = egui::FontDefinitions::default();
    for path in candidates {
        if let Ok(font_data) = std::fs::read(path) {
            fonts.font_data.insert(
                "emoji".to_owned(),
                egui::FontData::from_owned(font_data).into(),
            );
            fonts.families
                .entry(egui::FontFamily::Proportional)
                .or_default()
                .push("emoji".to_owned());
            tracing::debug!("Loaded emoji font {}", path);
            break;
        }
    }
    ctx.set_fonts(fonts);
}

/// Background task messages
enum TaskResult {
    PlaylistLoaded {
        entries: Vec<M3uEntry>,
        source: String,
    },
    Error(String),
}

fn main() -> Result<(), eframe::Error> {
    let config = AppConfig::load();

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.log_filter));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    // Force X11 backend on Linux before any windowing code runs
    #[cfg(target_os = "linux")]
    {
        std::env::set_var("WINIT_UNIX_BACKEND", "x11");
        std::env::remove_var("WAYLAND_DISPLAY");
    }

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([1200.0, 760.0])
            .with_min_inner_size([900.0, 550.0])
            .with_icon(load_icon()),
        vsync: true,
        hardware_acceleration: eframe::HardwareAcceleration::Preferred,
        ..Default::default()
    };

    eframe::run_native(
        "ZakirFLIX",
        options,
        Box::new(move |cc| {
            install_emoji_font(&cc.egui_ctx);
            cc.egui_ctx.set_visuals(if config.dark_mode {
                egui::Visuals::dark()
            } else {
                egui::Visuals::light()
            });
            Ok(Box::new(CatalogApp::new(config)))
        }),
    )
}

struct CatalogApp {
    config: AppConfig,
    catalog: Catalog,

    // Browsing
    tab: Tab,
    refinement: Refinement,
    search_query: String,

    // Playback
    session: SessionManager,
    player_settings: Rc<RefCell<PlayerSettings>>,
    torrent_client: Arc<Mutex<WebTorrentClient>>,

    // Background tasks
    task_sender: Sender<TaskResult>,
    task_receiver: Receiver<TaskResult>,
    pending_tasks: usize,

    // UI state
    playlist_url_input: String,
    status_message: String,
    console_log: Vec<String>,
    show_console: bool,
    show_settings: bool,
}

impl CatalogApp {
    fn new(config: AppConfig) -> Self {
        let (task_sender, task_receiver) = channel();

        let player_settings = Rc::new(RefCell::new(PlayerSettings::from_config(&config)));
        let factory_settings = Rc::clone(&player_settings);
        let stream_players = Box::new(move || {
            Box::new(ExternalPlayer::new(factory_settings.borrow().clone())) as Box<dyn StreamPlayer>
        });

        let torrent_client = Arc::new(Mutex::new(WebTorrentClient::new(WebTorrentSettings::from_config(&config))));
        let session = SessionManager::new(stream_players, torrent_client.clone(), config.media_extensions.clone());

        let mut app = Self {
            catalog: Catalog::default(),
            tab: Tab::All,
            refinement: Refinement::All,
            search_query: String::new(),
            session,
            player_settings,
            torrent_client,
            task_sender,
            task_receiver,
            pending_tasks: 0,
            playlist_url_input: String::new(),
            status_message: "Pick something to watch".to_string(),
            console_log: Vec::new(),
            show_console: false,
            show_settings: false,
            config,
        };

        app.catalog = app.load_catalog();
        app.log(&format!("[INFO] Catalog ready: {} entries", app.catalog.len()));

        for url in app.config.playlist_urls.clone() {
            app.load_playlist(&url);
        }
        app
    }

    fn log(&mut self, message: &str) {
        let timestamp = timestamp_now();
        self.console_log.push(format!("[{}] {}", timestamp, message));
        // Keep last 500 lines
        if self.console_log.len() > CONSOLE_LINES {
            let excess = self.console_log.len() - CONSOLE_LINES;
            self.console_log.drain(..excess);
        }
    }

    /// Configured catalog file, or the built-in one
    fn load_catalog(&mut self) -> Catalog {
        let path = self.config.catalog_path.trim();
        if path.is_empty() {
            return Catalog::builtin();
        }
        match Catalog::load(&PathBuf::from(path)) {
            Ok(catalog) => catalog,
            Err(e) => {
                tracing::error!("{}", e);
                self.log(&format!("[ERROR] {} - using built-in catalog", e));
                Catalog::builtin()
            }
        }
    }

    /// Push edited settings to the running collaborators and persist them
    fn apply_settings(&mut self) {
        *self.player_settings.borrow_mut() = PlayerSettings::from_config(&self.config);
        self.torrent_client
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .set_settings(WebTorrentSettings::from_config(&self.config));
        self.config.save();
        tracing::debug!("Settings saved");
    }

    fn play(&mut self, request: PlaybackRequest) {
        self.log(&format!("[PLAY] {} ({})", request.title, request.url));
        let generation = self.session.select(request);
        tracing::info!("Started session #{}", generation);
    }

    fn stop(&mut self) {
        self.session.teardown();
        self.log("[INFO] Playback stopped");
    }

    fn load_playlist(&mut self, url: &str) {
        let url = url.trim().to_string();
        if url.is_empty() {
            return;
        }
        let sender = self.task_sender.clone();
        let user_agent = self.config.user_agent.clone();

        self.pending_tasks += 1;
        self.status_message = "Loading playlist...".to_string();
        self.log(&format!("[INFO] Loading playlist: {}", url));

        std::thread::spawn(move || {
            let result = match m3u_parser::download_and_parse(&url, &user_agent) {
                Ok(entries) => TaskResult::PlaylistLoaded { entries, source: url },
                Err(e) => TaskResult::Error(format!("Failed to fetch playlist {}: {}", url, e)),
            };
            let _ = sender.send(result);
        });
    }

    fn open_playlist_file(&mut self) {
        let Some(path) = rfd::FileDialog::new()
            .set_title("Open Playlist")
            .add_filter("Playlists", &["m3u", "m3u8"])
            .add_filter("All Files", &["*"])
            .pick_file()
        else {
            return;
        };

        match m3u_parser::read_playlist_file(&path) {
            Ok(entries) => self.import_entries(entries, &path.display().to_string()),
            Err(e) => self.report_playlist_error(&e),
        }
    }

    fn import_entries(&mut self, entries: Vec<M3uEntry>, source: &str) {
        let added = self.catalog.import_playlist(entries);
        if added == 0 {
            self.log(&format!("[WARN] No playable entries in {}", source));
        } else {
            self.log(&format!("[INFO] Imported {} channels from {}", added, source));
        }
        self.status_message = format!("Imported {} channels", added);
    }

    fn report_playlist_error(&mut self, error: &PlaylistError) {
        tracing::warn!("{}", error);
        self.log(&format!("[ERROR] {}", error));
        self.status_message = format!("Error: {}", error);
    }

    fn process_tasks(&mut self) {
        while let Ok(result) = self.task_receiver.try_recv() {
            self.pending_tasks = self.pending_tasks.saturating_sub(1);
            match result {
                TaskResult::PlaylistLoaded { entries, source } => {
                    self.import_entries(entries, &source);
                }
                TaskResult::Error(msg) => {
                    self.log(&format!("[ERROR] {}", msg));
                    self.status_message = format!("Error: {}", msg);
                }
            }
        }
    }

    /// Mirror session transitions into the console log
    fn log_session_changes(&mut self) {
        for change in self.session.drain_changes() {
            let line = match &change.status {
                SessionStatus::Failed(err) => format!("[ERROR] Session #{} failed: {}", change.generation, err),
                SessionStatus::Ready | SessionStatus::Playing => {
                    format!("[PLAY] Session #{}: {}", change.generation, change.status.name())
                }
                status => format!("[INFO] Session #{}: {}", change.generation, status.name()),
            };
            self.log(&line);
        }
    }

    fn show_top_panel(&mut self, ui: &mut egui::Ui) {
        ui.add_space(5.0);

        ui.horizontal(|ui| {
            ui.heading("🎬 ZakirFLIX");
            ui.separator();

            for tab in Tab::ALL {
                ui.selectable_value(&mut self.tab, tab, tab.label());
            }

            ui.separator();
            ui.add(egui::TextEdit::singleline(&mut self.search_query)
                .hint_text("🔍 Search titles...")
                .desired_width(200.0));
            if !self.search_query.is_empty() && ui.small_button("✖").clicked() {
                self.search_query.clear();
            }

            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                ui.toggle_value(&mut self.show_console, "📋 Console");
                ui.toggle_value(&mut self.show_settings, "⚙ Settings");
                if ui.checkbox(&mut self.config.dark_mode, "🌙 Dark").changed() {
                    self.config.save();
                }
            });
        });

        ui.horizontal(|ui| {
            ui.label("Filter:");
            for refinement in [Refinement::All, Refinement::Dubbed, Refinement::Subtitled, Refinement::International] {
                let label = refinement.label();
                ui.selectable_value(&mut self.refinement, refinement, label);
            }

            let genre_text = match &self.refinement {
                Refinement::Genre(genre) => genre.clone(),
                _ => "Genre".to_string(),
            };
            egui::ComboBox::from_id_salt("genre_filter")
                .selected_text(genre_text)
                .show_ui(ui, |ui| {
                    for genre in self.catalog.genres() {
                        ui.selectable_value(&mut self.refinement, Refinement::Genre(genre.clone()), genre);
                    }
                });

            let language_text = match &self.refinement {
                Refinement::Language(language) => language.clone(),
                _ => "Language".to_string(),
            };
            egui::ComboBox::from_id_salt("language_filter")
                .selected_text(language_text)
                .show_ui(ui, |ui| {
                    for language in self.catalog.languages() {
                        ui.selectable_value(&mut self.refinement, Refinement::Language(language.clone()), language);
                    }
                });

            ui.separator();

            ui.label("📺 Playlist:");
            let response = ui.add(egui::TextEdit::singleline(&mut self.playlist_url_input)
                .hint_text("http://server.com/playlist.m3u")
                .desired_width(280.0));
            let submitted = response.lost_focus() && ui.input(|i| i.key_pressed(egui::Key::Enter));
            if ui.button("➕ Load").clicked() || submitted {
                let url = std::mem::take(&mut self.playlist_url_input);
                self.load_playlist(&url);
            }
            if ui.button("📂 Open playlist").on_hover_text("Import a local M3U/M3U8 file").clicked() {
                self.open_playlist_file();
            }
        });

        ui.add_space(5.0);
    }

    /// Status line, attached media and the Stop button
    fn show_player_slot(&mut self, ui: &mut egui::Ui) {
        let status = self.session.status().clone();
        let status_text = self.session.status_text();

        egui::Frame::group(ui.style()).show(ui, |ui| {
            ui.set_min_width(ui.available_width());
            ui.horizontal(|ui| {
                if self.session.is_busy() {
                    ui.spinner();
                }
                let color = match status {
                    SessionStatus::Failed(_) => egui::Color32::RED,
                    SessionStatus::Ready | SessionStatus::Playing => egui::Color32::GREEN,
                    _ => ui.visuals().text_color(),
                };
                ui.label(egui::RichText::new(status_text).strong().color(color));

                if let Some(kind) = self.session.engine_kind() {
                    let badge = match kind {
                        EngineKind::HttpStream => "🌐 HTTP",
                        EngineKind::PeerSwarm => "🧲 Torrent",
                    };
                    ui.label(egui::RichText::new(badge).small().weak());
                }

                ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                    let active = !matches!(status, SessionStatus::Idle);
                    if ui.add_enabled(active, egui::Button::new("⏹ Stop")).clicked() {
                        self.stop();
                    }
                });
            });

            if let Some(media) = self.session.surface().attached() {
                ui.horizontal(|ui| {
                    ui.label(egui::RichText::new(&media.title).monospace());
                    ui.label(egui::RichText::new(&media.locator).small().weak());
                    if let Some(mime) = media.mime_type {
                        ui.label(egui::RichText::new(mime).small().weak());
                    }
                    if let Some(poster) = &media.poster_url {
                        ui.label("🖼").on_hover_text(poster);
                    }
                });
            }
        });
    }

    fn show_entries(&mut self, ui: &mut egui::Ui) {
        let entries = catalog::search(catalog::filter(&self.catalog, self.tab, &self.refinement), &self.search_query);
        let mut picked: Option<PlaybackRequest> = None;

        if entries.is_empty() {
            ui.add_space(20.0);
            ui.vertical_centered(|ui| {
                ui.label(egui::RichText::new("Nothing found in this category.").italics().weak());
            });
            return;
        }

        ui.label(egui::RichText::new(format!("{} titles", entries.len())).small().weak());

        egui::ScrollArea::vertical()
            .id_salt("entries_scroll")
            .auto_shrink([false, false])
            .show(ui, |ui| {
                for entry in &entries {
                    ui.horizontal(|ui| {
                        let icon = match entry.category {
                            Category::Tv => "📺",
                            Category::Movie => "🎬",
                            Category::Series => "📼",
                            Category::Other => "▶",
                        };
                        let button = ui.button(format!("{} {}", icon, entry.title));
                        let hover = match &entry.genre {
                            Some(genre) => format!("{}\n{} · {}", entry.url, genre, entry.language),
                            None => format!("{}\n{}", entry.url, entry.language),
                        };
                        if button.on_hover_text(hover).clicked() {
                            picked = Some(entry.playback_request(self.config.autoplay));
                        }

                        if entry.playback_type == PlaybackType::Dubbed {
                            ui.label(egui::RichText::new(" Dub ").small().background_color(egui::Color32::from_rgb(37, 99, 235)).color(egui::Color32::WHITE));
                        }
                        if entry.playback_type == PlaybackType::Subtitled {
                            ui.label(egui::RichText::new(" Sub ").small().background_color(egui::Color32::from_rgb(202, 138, 4)).color(egui::Color32::BLACK));
                        }
                        if entry.category == Category::Tv {
                            ui.label(egui::RichText::new(" Live ").small().background_color(egui::Color32::from_rgb(220, 38, 38)).color(egui::Color32::WHITE));
                        }
                        if entry.is_peer_sourced() {
                            ui.label(egui::RichText::new(" Torrent ").small().background_color(egui::Color32::from_rgb(124, 58, 237)).color(egui::Color32::WHITE));
                        }
                    });
                }
            });

        if let Some(request) = picked {
            self.play(request);
        }
    }

    fn show_settings_window(&mut self, ctx: &egui::Context) {
        let mut open = self.show_settings;
        let before = self.config.clone();

        egui::Window::new("⚙ Settings")
            .open(&mut open)
            .collapsible(false)
            .resizable(false)
            .show(ctx, |ui| {
                egui::Grid::new("settings_grid").num_columns(2).spacing([12.0, 6.0]).show(ui, |ui| {
                    ui.label("🎬 Player:");
                    ui.add(egui::TextEdit::singleline(&mut self.config.external_player)
                        .hint_text("mpv, vlc, ffplay...")
                        .desired_width(260.0))
                        .on_hover_text("Media player command/path.\nLeave empty for ffplay (default)");
                    ui.end_row();

                    ui.label("📶 Connection:");
                    ui.horizontal(|ui| {
                        egui::ComboBox::from_id_salt("connection_quality")
                            .selected_text(self.config.connection_quality.label())
                            .show_ui(ui, |ui| {
                                ui.selectable_value(&mut self.config.connection_quality, ConnectionQuality::Fast, "⚡ Fast (2s)");
                                ui.selectable_value(&mut self.config.connection_quality, ConnectionQuality::Normal, "📶 Normal (5s)");
                                ui.selectable_value(&mut self.config.connection_quality, ConnectionQuality::Slow, "🐢 Slow (15s)");
                                ui.selectable_value(&mut self.config.connection_quality, ConnectionQuality::VerySlow, "🦥 Very Slow (30s)");
                                ui.selectable_value(&mut self.config.connection_quality, ConnectionQuality::Custom, "⚙️ Custom");
                            });
                        if self.config.connection_quality == ConnectionQuality::Custom {
                            ui.add(egui::DragValue::new(&mut self.config.buffer_seconds)
                                .range(1..=120)
                                .suffix("s"));
                        }
                        ui.label(format!("({}s)", self.config.effective_buffer()));
                    });
                    ui.end_row();

                    ui.label("");
                    ui.checkbox(&mut self.config.hw_accel, "HW Acceleration")
                        .on_hover_text("Enable GPU hardware decoding\nDisable if you experience playback issues");
                    ui.end_row();

                    ui.label("🌐 User Agent:");
                    ui.add(egui::TextEdit::singleline(&mut self.config.user_agent).desired_width(260.0));
                    ui.end_row();

                    ui.label("");
                    ui.checkbox(&mut self.config.pass_user_agent_to_player, "Pass User Agent to player");
                    ui.end_row();

                    ui.label("🧲 webtorrent:");
                    ui.add(egui::TextEdit::singleline(&mut self.config.webtorrent_path)
                        .hint_text("webtorrent")
                        .desired_width(260.0));
                    ui.end_row();

                    ui.label("Torrent port:");
                    ui.add(egui::DragValue::new(&mut self.config.torrent_port).range(1024..=65535));
                    ui.end_row();

                    ui.label("");
                    ui.checkbox(&mut self.config.autoplay, "Autoplay on select");
                    ui.end_row();

                    ui.label("📁 Catalog:");
                    ui.add(egui::TextEdit::singleline(&mut self.config.catalog_path)
                        .hint_text("built-in")
                        .desired_width(260.0))
                        .on_hover_text("JSON catalog file, applied on next start");
                    ui.end_row();
                });

                ui.separator();
                ui.label(egui::RichText::new("Playlists loaded at startup:").small());
                let mut remove = None;
                for (i, url) in self.config.playlist_urls.iter().enumerate() {
                    ui.horizontal(|ui| {
                        if ui.small_button("🗑").clicked() {
                            remove = Some(i);
                        }
                        ui.label(egui::RichText::new(url).small().monospace());
                    });
                }
                if let Some(i) = remove {
                    self.config.playlist_urls.remove(i);
                }
                if !self.playlist_url_input.trim().is_empty()
                    && ui.button("➕ Remember current playlist URL").clicked()
                {
                    self.config.playlist_urls.push(self.playlist_url_input.trim().to_string());
                }
            });

        self.show_settings = open;
        if self.config != before {
            self.apply_settings();
        }
    }

    fn show_console_panel(&mut self, ui: &mut egui::Ui) {
        ui.horizontal(|ui| {
            ui.heading("Console Log");
            ui.with_layout(egui::Layout::right_to_left(egui::Align::Center), |ui| {
                if ui.button("🗑 Clear").clicked() {
                    self.console_log.clear();
                    self.console_log.push(format!("[{}] Console cleared", timestamp_now()));
                }
            });
        });
        ui.separator();

        // Display log entries with monospace font
        egui::ScrollArea::vertical()
            .id_salt("console_scroll")
            .auto_shrink([false, false])
            .stick_to_bottom(true)
            .show(ui, |ui| {
                for line in &self.console_log {
                    let color = if line.contains("[ERROR]") {
                        egui::Color32::RED
                    } else if line.contains("[WARN]") {
                        egui::Color32::YELLOW
                    } else if line.contains("[INFO]") {
                        egui::Color32::LIGHT_BLUE
                    } else if line.contains("[PLAY]") {
                        egui::Color32::GREEN
                    } else {
                        egui::Color32::GRAY
                    };

                    ui.label(egui::RichText::new(line).monospace().color(color));
                }
            });
    }
}

impl eframe::App for CatalogApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // Process background results (non-blocking)
        self.process_tasks();
        self.session.poll();
        self.log_session_changes();

        // Players report start and exit long after Ready
        if self.session.is_active() || self.pending_tasks > 0 {
            ctx.request_repaint_after(BUSY_REPAINT);
        }

        ctx.set_visuals(if self.config.dark_mode {
            egui::Visuals::dark()
        } else {
            egui::Visuals::light()
        });

        egui::TopBottomPanel::top("top_panel").show(ctx, |ui| {
            self.show_top_panel(ui);
        });

        // Bottom panel - Status
        egui::TopBottomPanel::bottom("bottom_panel").show(ctx, |ui| {
            ui.horizontal(|ui| {
                if self.pending_tasks > 0 {
                    ui.spinner();
                }
                ui.label(&self.status_message);
            });
        });

        if self.show_console {
            egui::TopBottomPanel::bottom("console_panel")
                .resizable(true)
                .default_height(180.0)
                .show(ctx, |ui| {
                    self.show_console_panel(ui);
                });
        }

        egui::CentralPanel::default().show(ctx, |ui| {
            self.show_player_slot(ui);
            ui.add_space(8.0);
            self.show_entries(ui);
        });

        if self.show_settings {
            self.show_settings_window(ctx);
        }
    }
}
