//! crt-scope - Scrolling voltage oscilloscope
//!
//! A sampled voltage scrolls across a 400x250 plot with autoscale and zoom
//! controls. Frames are rasterized in software on their own thread, then
//! shown on a curved-CRT surface by a GPU pass (or its CPU fallback).
//!
//! ## Threads
//! - UI (egui): buttons, stats labels, the compositor
//! - Rasterizer: fixed-rate ticks, owns the ring buffer and scale window
//! - Sampler: owns the sample source, answers one request per sample

use std::time::Instant;

use eframe::egui;

mod capture;
mod compositor;
mod pipeline;
mod render;
mod scale;
mod settings;

use capture::{SignalStats, SourceKind, StatsFeed};
use compositor::Compositor;
use pipeline::{Pipeline, ScopeHandle};
use settings::ScopeSettings;

fn main() -> eframe::Result<()> {
    env_logger::init();
    log::info!("Starting crt-scope");

    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_inner_size([900.0, 640.0])
            .with_title("crt-scope"),
        ..Default::default()
    };

    eframe::run_native(
        "crt-scope",
        options,
        Box::new(|cc| Ok(Box::new(ScopeApp::new(cc)))),
    )
}

/// Running pipeline plus the pieces the UI talks to
struct Session {
    pipeline: Pipeline,
    handle: ScopeHandle,
    stats: StatsFeed,
}

struct ScopeApp {
    settings: ScopeSettings,
    compositor: Compositor,
    session: Option<Session>,

    /// Last stats snapshot shown, refreshed every `stats_interval`
    stats: SignalStats,
    stats_polled: Instant,

    show_crt: bool,
    snapshots: u32,
    status: String,
}

impl ScopeApp {
    fn new(cc: &eframe::CreationContext<'_>) -> Self {
        let settings = ScopeSettings::load();
        let compositor = Compositor::new(
            cc.gl.as_ref(),
            egui::vec2(settings.width, settings.height),
            settings.crt,
            settings.present_scale,
        );
        log::info!(
            "Compositing on the {}",
            if compositor.is_gpu() { "GPU" } else { "CPU" }
        );

        let mut app = Self {
            settings,
            compositor,
            session: None,
            stats: SignalStats::default(),
            stats_polled: Instant::now(),
            show_crt: false,
            snapshots: 0,
            status: String::new(),
        };
        app.start();
        app
    }

    fn start(&mut self) {
        if self.session.is_some() {
            return;
        }
        match Pipeline::start(&self.settings) {
            Ok(pipeline) => {
                self.compositor.attach(pipeline.exchange());
                self.session = Some(Session {
                    handle: pipeline.handle(),
                    stats: pipeline.stats(),
                    pipeline,
                });
                self.status = format!("Running ({})", self.settings.source.name());
            }
            Err(e) => {
                log::error!("Failed to start pipeline: {}", e);
                self.status = format!("Error: {}", e);
            }
        }
    }

    /// Tear down first so no frame lands after the surface is cleared
    fn stop(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.pipeline.teardown();
        }
        self.compositor.detach();
        self.stats = SignalStats::default();
        self.status = "Stopped".to_string();
    }

    fn handle(&self) -> Option<&ScopeHandle> {
        self.session.as_ref().map(|s| &s.handle)
    }

    fn poll_stats(&mut self) {
        if self.stats_polled.elapsed() < self.settings.stats_interval() {
            return;
        }
        self.stats_polled = Instant::now();
        if let Some(session) = &self.session {
            self.stats = session.stats.read();
        }
    }

    fn save_snapshot(&mut self) {
        let path = self.settings.snapshot_path(self.snapshots);
        match self.compositor.save_snapshot(&path) {
            Ok(()) => {
                self.snapshots += 1;
                self.status = format!("Saved {}", path.display());
            }
            Err(e) => {
                log::warn!("Snapshot failed: {}", e);
                self.status = format!("Snapshot failed: {}", e);
            }
        }
    }

    fn controls_ui(&mut self, ui: &mut egui::Ui) {
        let running = self.session.is_some();
        if ui.button(if running { "⏹ Stop" } else { "▶ Start" }).clicked() {
            if running {
                self.stop();
            } else {
                self.start();
            }
        }

        ui.separator();

        ui.add_enabled_ui(running, |ui| {
            let Some(handle) = self.handle().cloned() else {
                return;
            };
            if ui.button("Auto").clicked() {
                handle.auto();
            }
            if ui.button("Reset").clicked() {
                handle.reset();
            }
            if ui.button("Zoom In").clicked() {
                handle.zoom_in();
            }
            if ui.button("Zoom Out").clicked() {
                handle.zoom_out();
            }
            ui.label(format!("{:.0}x", handle.zoom()));
        });

        ui.separator();

        if ui
            .add_enabled(running, egui::Button::new("📷 Snapshot"))
            .clicked()
        {
            self.save_snapshot();
        }

        ui.separator();

        // Takes effect on the next start
        egui::ComboBox::from_id_salt("source")
            .selected_text(self.settings.source.name())
            .show_ui(ui, |ui| {
                for kind in SourceKind::all() {
                    ui.selectable_value(&mut self.settings.source, *kind, kind.name());
                }
            });

        ui.separator();
        ui.toggle_value(&mut self.show_crt, "⚙ CRT");
    }

    fn crt_ui(&mut self, ui: &mut egui::Ui) {
        ui.heading("CRT");
        let crt = &mut self.settings.crt;
        ui.add(egui::Slider::new(&mut crt.threshold, 0.0..=1.5).text("Flat radius"));
        ui.add(egui::Slider::new(&mut crt.strength, 0.0..=2.0).text("Curvature"));
        ui.add(egui::Slider::new(&mut crt.vignette, 0.0..=1.0).text("Vignette"));
        ui.add(egui::Slider::new(&mut crt.glow, 0.0..=2.0).text("Glow"));
        if ui.button("Defaults").clicked() {
            *crt = Default::default();
        }
        self.compositor.set_params(self.settings.crt);
    }

    fn stats_ui(&self, ui: &mut egui::Ui) {
        ui.label(format!("Amplitude: {:.2} V", self.stats.amplitude));
        ui.separator();
        ui.label(format!("Frequency: {:.2} Hz", self.stats.frequency));
        ui.separator();
        ui.label(format!("Wavelength: {:.3} s", self.stats.wavelength));
        ui.separator();
        ui.label(&self.status);
    }
}

impl eframe::App for ScopeApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        ctx.request_repaint();
        self.poll_stats();

        egui::TopBottomPanel::top("top_panel").show(ctx, |ui| {
            ui.horizontal(|ui| {
                ui.heading("crt-scope");
                ui.separator();
                self.controls_ui(ui);
            });
        });

        egui::TopBottomPanel::bottom("stats_panel").show(ctx, |ui| {
            ui.horizontal(|ui| self.stats_ui(ui));
        });

        if self.show_crt {
            egui::SidePanel::left("crt_panel")
                .resizable(false)
                .show(ctx, |ui| self.crt_ui(ui));
        }

        egui::CentralPanel::default()
            .frame(egui::Frame::none().fill(egui::Color32::from_rgb(8, 8, 8)))
            .show(ctx, |ui| {
                ui.centered_and_justified(|ui| self.compositor.show(ui));
            });
    }

    fn on_exit(&mut self, gl: Option<&eframe::glow::Context>) {
        self.stop();
        self.compositor.destroy(gl);
        self.settings.save();
        log::info!("crt-scope exited");
    }
}
