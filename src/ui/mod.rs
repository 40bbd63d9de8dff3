use anyhow::Result;
use egui::load::SizedTexture;
use egui::{Color32, TextureHandle, TextureOptions};
use egui_wgpu::Renderer;
use egui_winit::{EventResponse, State};
use tokio::sync::watch;
use wgpu::{CommandEncoder, Device, Queue, TextureView};
use winit::{event::WindowEvent, window::Window};

use crate::audio::FeatureReadout;
use crate::graphics::GraphicsEngine;
use crate::pipeline::PlaybackState;
use crate::render::{DrawSurface, PixelCanvas, Rgba, Surfaces};

/// What the user asked for during a UI pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UiActions {
    pub toggle_playback: bool,
    /// egui asked to be repainted right away (hover, animation).
    pub repaint: bool,
}

/// A canvas uploaded as an egui texture, refreshed only when it changed.
struct CanvasTexture {
    name: &'static str,
    handle: Option<TextureHandle>,
}

impl CanvasTexture {
    fn new(name: &'static str) -> Self {
        Self { name, handle: None }
    }

    fn upload(&mut self, ctx: &egui::Context, canvas: &mut PixelCanvas) {
        if !canvas.take_dirty() && self.handle.is_some() {
            return;
        }
        let size = [canvas.width() as usize, canvas.height() as usize];
        let image = egui::ColorImage::from_rgba_unmultiplied(size, canvas.as_rgba());
        match self.handle.as_mut() {
            Some(handle) => handle.set(image, TextureOptions::NEAREST),
            None => self.handle = Some(ctx.load_texture(self.name, image, TextureOptions::NEAREST)),
        }
    }

    /// Shows the texture at its native size and paints the canvas text on top.
    fn show(&self, ui: &mut egui::Ui, canvas: &PixelCanvas) {
        let Some(handle) = &self.handle else {
            return;
        };
        let response = ui.add(egui::Image::from_texture(SizedTexture::from_handle(handle)));
        let origin = response.rect.min;
        let painter = ui.painter_at(response.rect);
        for run in canvas.text_runs() {
            painter.text(
                origin + egui::vec2(run.x, run.y),
                egui::Align2::LEFT_TOP,
                &run.text,
                egui::FontId::proportional(11.0),
                color32(run.color),
            );
        }
    }
}

fn color32(color: Rgba) -> Color32 {
    Color32::from_rgba_unmultiplied(color.r, color.g, color.b, color.a)
}

/// Control panel: play/pause, feature readouts and the three visualization
/// surfaces.
pub struct UserInterface {
    context: egui::Context,
    state: State,
    renderer: Renderer,
    features: watch::Receiver<FeatureReadout>,
    playback: watch::Receiver<PlaybackState>,
    main: CanvasTexture,
    heatmap: CanvasTexture,
    history: CanvasTexture,
}

impl UserInterface {
    pub fn new(
        window: &Window,
        graphics_engine: &GraphicsEngine,
        features: watch::Receiver<FeatureReadout>,
        playback: watch::Receiver<PlaybackState>,
    ) -> Self {
        let context = egui::Context::default();

        let egui_state = State::new(context.clone(), egui::ViewportId::ROOT, &window, None, None);

        let renderer = Renderer::new(&graphics_engine.device, graphics_engine.config.format, None, 1);

        Self {
            context,
            state: egui_state,
            renderer,
            features,
            playback,
            main: CanvasTexture::new("main"),
            heatmap: CanvasTexture::new("heatmap"),
            history: CanvasTexture::new("history"),
        }
    }

    pub fn handle_event(&mut self, event: &WindowEvent, window: &Window) -> EventResponse {
        self.state.on_window_event(window, event)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn render(
        &mut self,
        encoder: &mut CommandEncoder,
        target: &TextureView,
        device: &Device,
        queue: &Queue,
        window: &Window,
        size_in_pixels: [u32; 2],
        surfaces: &mut Surfaces,
    ) -> Result<UiActions> {
        self.main.upload(&self.context, &mut surfaces.main);
        self.heatmap.upload(&self.context, &mut surfaces.heatmap);
        self.history.upload(&self.context, &mut surfaces.history);

        let raw_input = self.state.take_egui_input(window);
        let readout = self.features.borrow().clone();
        let playback = *self.playback.borrow();
        let mut actions = UiActions::default();

        let (main, heatmap, history) = (&self.main, &self.heatmap, &self.history);
        let full_output = self.context.run(raw_input, |ctx| {
            egui::CentralPanel::default().show(ctx, |ui| {
                ui.heading("Chromascope");
                ui.horizontal(|ui| {
                    let label = if playback.is_playing { "Pause" } else { "Play" };
                    if ui.button(label).clicked() {
                        actions.toggle_playback = true;
                    }
                    ui.label(playback.clock_label());
                });
                ui.separator();

                main.show(ui, &surfaces.main);
                ui.add_space(6.0);
                heatmap.show(ui, &surfaces.heatmap);
                ui.add_space(6.0);
                history.show(ui, &surfaces.history);
                ui.separator();

                feature_grid(ui, &readout);
                ui.separator();
                ui.label("Drop an audio file on the window to load it. Space toggles playback, Esc exits.");
            });
        });

        actions.repaint = full_output
            .viewport_output
            .get(&egui::ViewportId::ROOT)
            .map_or(false, |viewport| viewport.repaint_delay.is_zero());
        self.state.handle_platform_output(window, full_output.platform_output);

        let tris = self.context.tessellate(full_output.shapes, full_output.pixels_per_point);

        for (id, image_delta) in &full_output.textures_delta.set {
            self.renderer.update_texture(device, queue, *id, image_delta);
        }

        let screen_descriptor = egui_wgpu::ScreenDescriptor {
            size_in_pixels,
            pixels_per_point: full_output.pixels_per_point,
        };

        self.renderer.update_buffers(device, queue, encoder, &tris, &screen_descriptor);

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("egui render pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                occlusion_query_set: None,
                timestamp_writes: None,
            });

            self.renderer.render(&mut render_pass, &tris, &screen_descriptor);
        }

        for id in &full_output.textures_delta.free {
            self.renderer.free_texture(id);
        }

        Ok(actions)
    }
}

fn feature_grid(ui: &mut egui::Ui, readout: &FeatureReadout) {
    egui::Grid::new("features").num_columns(2).striped(true).show(ui, |ui| {
        ui.label("Spectral centroid");
        ui.label(readout.spectral_centroid_label());
        ui.end_row();

        ui.label("RMS");
        ui.label(readout.rms_label());
        ui.end_row();

        ui.label("Zero crossings");
        ui.label(readout.zcr_label());
        ui.end_row();

        ui.label("Loudness");
        let loudness = egui::RichText::new(readout.loudness_label());
        if readout.is_loud() {
            ui.label(loudness.color(Color32::from_rgb(255, 80, 80)).strong());
        } else {
            ui.label(loudness);
        }
        ui.end_row();

        ui.label("Chroma");
        ui.label(egui::RichText::new(readout.chroma_label()).monospace());
        ui.end_row();
    });
}
