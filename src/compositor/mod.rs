//! Compositor - presents rasterized frames on the CRT surface
//!
//! Runs on the UI thread at whatever rate egui repaints. Each repaint takes
//! the newest frame from the exchange if one arrived, then draws the warped
//! surface. Uploads (GPU texture or CPU warp) happen only for new frames.
//!
//! The GPU path needs a glow context; without one (or when the shader fails
//! to build) the same effect runs on the CPU into an egui texture.

mod crt;
mod exchange;
mod gpu;

use std::path::Path;
use std::sync::{Arc, Mutex};

use eframe::egui::{self, Color32, Rect, Sense, TextureHandle, TextureOptions, Vec2};
use eframe::{egui_glow, glow};
use image::RgbaImage;
use thiserror::Error;

pub use crt::CrtParams;
pub use exchange::FrameExchange;

use crt::warp_image;
use gpu::GpuCompositor;

/// Errors from the compositor and its snapshot output
#[derive(Error, Debug)]
pub enum CompositorError {
    #[error("Shader compilation failed: {0}")]
    ShaderCompile(String),

    #[error("Program link failed: {0}")]
    ProgramLink(String),

    #[error("Failed to create GL object: {0}")]
    Resource(String),

    #[error("No frame to save")]
    NoFrame,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

/// CPU fallback state
struct CpuSurface {
    front: RgbaImage,
    texture: Option<TextureHandle>,
    /// Output size the texture was last warped at
    warped_size: [usize; 2],
    uploads: u64,
}

enum Backend {
    Gpu(Arc<Mutex<GpuCompositor>>),
    Cpu(CpuSurface),
}

pub struct Compositor {
    backend: Backend,
    params: CrtParams,
    /// Logical size of the rasterized surface
    surface: Vec2,
    present_scale: f32,
    exchange: Option<Arc<FrameExchange>>,
}

impl Compositor {
    /// Pick the GPU path when a glow context is available
    pub fn new(
        gl: Option<&Arc<glow::Context>>,
        surface: Vec2,
        params: CrtParams,
        present_scale: f32,
    ) -> Self {
        let backend = match gl {
            Some(gl) => match GpuCompositor::new(gl, RgbaImage::new(1, 1)) {
                Ok(gpu) => Backend::Gpu(Arc::new(Mutex::new(gpu))),
                Err(e) => {
                    log::warn!("GPU compositor unavailable ({}), using CPU fallback", e);
                    Backend::Cpu(CpuSurface::new())
                }
            },
            None => {
                log::info!("No GL context, compositing on the CPU");
                Backend::Cpu(CpuSurface::new())
            }
        };

        Self {
            backend,
            params,
            surface,
            present_scale,
            exchange: None,
        }
    }

    /// CPU-only compositor (also used by tests)
    pub fn cpu(surface: Vec2, params: CrtParams, present_scale: f32) -> Self {
        Self::new(None, surface, params, present_scale)
    }

    pub fn is_gpu(&self) -> bool {
        matches!(self.backend, Backend::Gpu(_))
    }

    /// Change the look; the CPU path re-warps on the next repaint
    pub fn set_params(&mut self, params: CrtParams) {
        if params == self.params {
            return;
        }
        self.params = params;
        if let Backend::Cpu(cpu) = &mut self.backend {
            cpu.warped_size = [0, 0];
        }
    }

    /// Start presenting frames from `exchange`
    pub fn attach(&mut self, exchange: Arc<FrameExchange>) {
        // Front must hold a complete frame: it goes back to the rasterizer
        // on the first swap and only the plot region is redrawn there.
        let front = exchange.latest();
        match &mut self.backend {
            Backend::Gpu(gpu) => {
                if let Ok(mut gpu) = gpu.lock() {
                    *gpu.front_mut() = front;
                    gpu.mark_dirty();
                }
            }
            Backend::Cpu(cpu) => {
                cpu.front = front;
                cpu.warped_size = [0, 0];
            }
        }
        self.exchange = Some(exchange);
    }

    /// Stop presenting; the surface shows blank from the next repaint
    pub fn detach(&mut self) {
        self.exchange = None;
        if let Backend::Cpu(cpu) = &mut self.backend {
            cpu.texture = None;
        }
    }

    pub fn is_attached(&self) -> bool {
        self.exchange.is_some()
    }

    /// Texture uploads (GPU) or warps (CPU) performed so far
    pub fn uploads(&self) -> u64 {
        match &self.backend {
            Backend::Gpu(gpu) => gpu.lock().map(|gpu| gpu.uploads()).unwrap_or(0),
            Backend::Cpu(cpu) => cpu.uploads,
        }
    }

    /// Size the surface occupies on screen
    pub fn present_size(&self) -> Vec2 {
        self.surface * self.present_scale
    }

    /// Draw the surface into `ui`
    pub fn show(&mut self, ui: &mut egui::Ui) {
        let (rect, _response) = ui.allocate_exact_size(self.present_size(), Sense::hover());

        let Some(exchange) = &self.exchange else {
            ui.painter().rect_filled(rect, 6.0, Color32::BLACK);
            return;
        };

        match &mut self.backend {
            Backend::Gpu(gpu) => {
                if let Ok(mut state) = gpu.lock() {
                    if exchange.take_if_dirty(state.front_mut()) {
                        state.mark_dirty();
                    }
                }

                let gpu = Arc::clone(gpu);
                let params = self.params;
                let callback = egui_glow::CallbackFn::new(move |_info, painter| {
                    if let Ok(mut gpu) = gpu.lock() {
                        gpu.paint(painter.gl(), &params);
                    }
                });
                ui.painter().add(egui::PaintCallback {
                    rect,
                    callback: Arc::new(callback),
                });
            }
            Backend::Cpu(cpu) => {
                let ppp = ui.ctx().pixels_per_point();
                let size = [
                    (rect.width() * ppp).round().max(1.0) as usize,
                    (rect.height() * ppp).round().max(1.0) as usize,
                ];
                let fresh = exchange.take_if_dirty(&mut cpu.front);
                if fresh || cpu.texture.is_none() || cpu.warped_size != size {
                    cpu.upload(ui.ctx(), size, &self.params);
                }
                if let Some(texture) = &cpu.texture {
                    ui.painter().image(
                        texture.id(),
                        rect,
                        Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0)),
                        Color32::WHITE,
                    );
                }
            }
        }
    }

    /// Copy of the frame currently on screen
    pub fn snapshot(&self) -> Option<RgbaImage> {
        self.exchange.as_ref()?;
        match &self.backend {
            Backend::Gpu(gpu) => gpu.lock().ok().map(|gpu| gpu.front().clone()),
            Backend::Cpu(cpu) => Some(cpu.front.clone()),
        }
    }

    /// Save the frame currently on screen as PNG
    pub fn save_snapshot(&self, path: &Path) -> Result<(), CompositorError> {
        let frame = self.snapshot().ok_or(CompositorError::NoFrame)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        frame.save_with_format(path, image::ImageFormat::Png)?;
        log::info!("Snapshot saved to {:?}", path);
        Ok(())
    }

    /// Release GPU resources; call from `App::on_exit`
    pub fn destroy(&mut self, gl: Option<&glow::Context>) {
        self.exchange = None;
        if let (Backend::Gpu(gpu), Some(gl)) = (&self.backend, gl) {
            if let Ok(gpu) = gpu.lock() {
                gpu.destroy(gl);
            }
        }
    }
}

impl CpuSurface {
    fn new() -> Self {
        Self {
            front: RgbaImage::new(1, 1),
            texture: None,
            warped_size: [0, 0],
            uploads: 0,
        }
    }

    fn upload(&mut self, ctx: &egui::Context, size: [usize; 2], params: &CrtParams) {
        let image = warp_image(&self.front, size[0], size[1], params);
        match &mut self.texture {
            Some(texture) => texture.set(image, TextureOptions::LINEAR),
            None => {
                self.texture = Some(ctx.load_texture("crt-surface", image, TextureOptions::LINEAR));
            }
        }
        self.warped_size = size;
        self.uploads += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::Canvas;
    use image::Rgba;

    fn frame(ctx: &egui::Context, compositor: &mut Compositor) {
        let _ = ctx.run(egui::RawInput::default(), |ctx| {
            egui::CentralPanel::default().show(ctx, |ui| compositor.show(ui));
        });
    }

    fn setup() -> (Compositor, Canvas, Arc<FrameExchange>) {
        let canvas = Canvas::new(40.0, 25.0, 1.0);
        let exchange = Arc::new(FrameExchange::new(canvas.image()));
        let mut compositor = Compositor::cpu(Vec2::new(40.0, 25.0), CrtParams::default(), 1.0);
        compositor.attach(Arc::clone(&exchange));
        (compositor, canvas, exchange)
    }

    #[test]
    fn test_cpu_uploads_only_new_frames() {
        let ctx = egui::Context::default();
        let (mut compositor, mut canvas, exchange) = setup();

        frame(&ctx, &mut compositor);
        let initial = compositor.uploads();
        assert_eq!(initial, 1);

        // No new frame: nothing re-warped
        frame(&ctx, &mut compositor);
        frame(&ctx, &mut compositor);
        assert_eq!(compositor.uploads(), initial);

        canvas.fill(Rgba([0, 200, 0, 255]));
        exchange.publish(&mut canvas);
        frame(&ctx, &mut compositor);
        assert_eq!(compositor.uploads(), initial + 1);
    }

    #[test]
    fn test_snapshot_is_the_taken_frame() {
        let ctx = egui::Context::default();
        let (mut compositor, mut canvas, exchange) = setup();

        canvas.fill(Rgba([1, 2, 3, 255]));
        exchange.publish(&mut canvas);
        frame(&ctx, &mut compositor);

        let snapshot = compositor.snapshot().unwrap();
        assert_eq!(*snapshot.get_pixel(5, 5), Rgba([1, 2, 3, 255]));
    }

    #[test]
    fn test_detach_clears() {
        let ctx = egui::Context::default();
        let (mut compositor, _canvas, _exchange) = setup();
        frame(&ctx, &mut compositor);

        compositor.detach();
        assert!(!compositor.is_attached());
        assert!(compositor.snapshot().is_none());
        frame(&ctx, &mut compositor);
    }

    #[test]
    fn test_save_snapshot_png() {
        let ctx = egui::Context::default();
        let (mut compositor, mut canvas, exchange) = setup();
        canvas.fill(Rgba([9, 90, 9, 255]));
        exchange.publish(&mut canvas);
        frame(&ctx, &mut compositor);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shots").join("frame.png");
        compositor.save_snapshot(&path).unwrap();

        let loaded = image::open(&path).unwrap().to_rgba8();
        assert_eq!(loaded.dimensions(), (40, 25));
        assert_eq!(*loaded.get_pixel(0, 0), Rgba([9, 90, 9, 255]));
    }

    #[test]
    fn test_params_change_rewarps() {
        let ctx = egui::Context::default();
        let (mut compositor, _canvas, _exchange) = setup();
        frame(&ctx, &mut compositor);
        let before = compositor.uploads();

        compositor.set_params(CrtParams {
            glow: 0.0,
            ..CrtParams::default()
        });
        frame(&ctx, &mut compositor);
        assert_eq!(compositor.uploads(), before + 1);
    }
}
