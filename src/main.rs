use anyhow::Result;
use clap::Parser;
use log::{error, info};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use winit::{
    event::{ElementState, Event, WindowEvent},
    event_loop::{ControlFlow, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::WindowBuilder,
};

use chromascope::audio::{AudioOutput, MediaBackend};
use chromascope::graphics::GraphicsEngine;
use chromascope::render::FrameScheduler;
use chromascope::ui::{UiActions, UserInterface};
use chromascope::{PlaybackController, VisualizerConfig};

/// How often samples are pumped while no frame is pending.
const PUMP_INTERVAL: Duration = Duration::from_millis(16);

#[derive(Parser)]
#[command(name = "chromascope")]
#[command(about = "Real-time audio feature visualizer")]
struct Args {
    /// Audio file to load on startup (MP3, WAV, M4A, OGG, FLAC)
    #[arg()]
    file: Option<PathBuf>,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Samples per analysis frame (power of two)
    #[arg(long)]
    frame_size: Option<usize>,

    /// Output volume, 0.0 to 1.0
    #[arg(long)]
    volume: Option<f32>,
}

fn main() -> Result<()> {
    env_logger::init();
    let args = Args::parse();
    info!("🎵 Starting Chromascope");

    let mut config = match &args.config {
        Some(path) => VisualizerConfig::load(path).unwrap_or_else(|e| {
            error!("{}; using defaults", e);
            VisualizerConfig::default()
        }),
        None => VisualizerConfig::default(),
    };
    if let Some(frame_size) = args.frame_size {
        config.frame_size = frame_size;
    }
    if let Some(volume) = args.volume {
        config.volume = volume.clamp(0.0, 1.0);
    }

    let event_loop = EventLoop::new()?;
    let window = Arc::new(
        WindowBuilder::new()
            .with_title("Chromascope")
            .with_inner_size(winit::dpi::LogicalSize::new(config.canvas.width + 40, 720))
            .build(&event_loop)?,
    );

    let mut graphics_engine = pollster::block_on(GraphicsEngine::new(Arc::clone(&window)))?;

    let backend: Option<Box<dyn MediaBackend>> = match AudioOutput::new(config.volume) {
        Ok(output) => Some(Box::new(output)),
        Err(e) => {
            error!("Audio output unavailable, playback disabled: {}", e);
            None
        }
    };

    let waker_window = Arc::clone(&window);
    let scheduler = FrameScheduler::with_waker(move || waker_window.request_redraw());
    let mut controller = PlaybackController::new(backend, scheduler, &config);
    let mut ui = UserInterface::new(
        &window,
        &graphics_engine,
        controller.subscribe_features(),
        controller.subscribe_playback(),
    );

    if let Some(path) = &args.file {
        controller.load_source(path);
    }

    info!("Visualizer initialized successfully");

    let session = Instant::now();
    let window_clone = Arc::clone(&window);
    let mut ui_repaint = true;
    event_loop.run(move |event, elwt| match event {
        Event::WindowEvent { event, .. } => {
            if !matches!(event, WindowEvent::RedrawRequested) {
                let response = ui.handle_event(&event, &window_clone);
                ui_repaint |= response.repaint;
                if response.consumed {
                    return;
                }
            }
            match event {
                WindowEvent::CloseRequested => {
                    info!("Close requested");
                    controller.teardown();
                    elwt.exit();
                }
                WindowEvent::KeyboardInput { event, .. } => {
                    if event.state != ElementState::Pressed || event.repeat {
                        return;
                    }
                    match event.physical_key {
                        PhysicalKey::Code(KeyCode::Escape) => {
                            info!("Escape pressed");
                            controller.teardown();
                            elwt.exit();
                        }
                        PhysicalKey::Code(KeyCode::Space) => {
                            controller.toggle();
                            ui_repaint = true;
                        }
                        _ => {}
                    }
                }
                WindowEvent::DroppedFile(path) => {
                    info!("File dropped: {:?}", path);
                    controller.load_source(&path);
                    ui_repaint = true;
                }
                WindowEvent::Resized(physical_size) => {
                    graphics_engine.resize(physical_size);
                    ui_repaint = true;
                }
                WindowEvent::RedrawRequested => {
                    controller.on_redraw();

                    let size = graphics_engine.size();
                    let mut actions = UiActions::default();
                    let result = graphics_engine.render(|encoder, view, device, queue| {
                        actions = ui.render(
                            encoder,
                            view,
                            device,
                            queue,
                            &window_clone,
                            [size.width, size.height],
                            controller.surfaces_mut(),
                        )?;
                        Ok(())
                    });
                    if let Err(e) = result {
                        error!("Render error: {}", e);
                    }
                    ui_repaint = actions.repaint;
                    if actions.toggle_playback {
                        controller.toggle();
                        ui_repaint = true;
                    }
                }
                _ => {}
            }
        }
        Event::AboutToWait => {
            controller.pump(session.elapsed());
            if controller.frame_pending() || ui_repaint {
                window_clone.request_redraw();
            }
            elwt.set_control_flow(ControlFlow::WaitUntil(Instant::now() + PUMP_INTERVAL));
        }
        _ => {}
    })?;

    Ok(())
}
