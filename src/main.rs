use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use winit::{
    event::*,
    event_loop::EventLoop,
    keyboard::PhysicalKey,
    window::{CursorGrabMode, Window},
};

// Import from the library crate
use particle_gallery::{
    config::AppConfig,
    controller::{FrameLoop, InputEvent, PointerLockHost, SharedInputQueue},
    logging,
    model::AssetStore,
    ui,
    view::{self, EguiFrame, GpgpuFactory, GpuContext, RenderState},
    MAX_FRAME_DT,
};

const CONFIG_ENV: &str = "PARTICLE_GALLERY_CONFIG";
const ASSET_DIR: &str = "assets/models";

/// Cursor grab as the native stand-in for browser pointer lock. The outcome
/// is reported back through the input queue, like the DOM's lock events.
struct WindowLockHost {
    window: Arc<Window>,
    events: SharedInputQueue,
}

impl PointerLockHost for WindowLockHost {
    fn request_pointer_lock(&mut self) {
        let grabbed = self
            .window
            .set_cursor_grab(CursorGrabMode::Locked)
            .or_else(|_| self.window.set_cursor_grab(CursorGrabMode::Confined));
        let event = match grabbed {
            Ok(()) => {
                self.window.set_cursor_visible(false);
                InputEvent::PointerLockChanged { locked: true }
            }
            Err(e) => {
                tracing::warn!("cursor grab failed: {e}");
                InputEvent::PointerLockError
            }
        };
        self.events.borrow_mut().push(event);
    }

    fn exit_pointer_lock(&mut self) {
        if let Err(e) = self.window.set_cursor_grab(CursorGrabMode::None) {
            tracing::warn!("cursor release failed: {e}");
        }
        self.window.set_cursor_visible(true);
        self.events.borrow_mut().push(InputEvent::PointerLockChanged { locked: false });
    }
}

struct App {
    window: Arc<Window>,
    gpu: GpuContext,
    render_state: RenderState,

    // egui
    egui_state: egui_winit::State,
    egui_ctx: egui::Context,

    frame_loop: FrameLoop<GpgpuFactory>,
    assets: AssetStore,
    lock_host: WindowLockHost,

    // Frame timing
    last_frame_time: Instant,
}

impl App {
    async fn new(window: Arc<Window>, config: AppConfig) -> Result<Self, view::GpuInitError> {
        let gpu = GpuContext::new_native(window.clone()).await?;
        let render_state = RenderState::new(&gpu);

        let factory = GpgpuFactory::new(
            gpu.device.clone(),
            gpu.queue.clone(),
            gpu.format,
            render_state.camera.bind_group_layout.clone(),
        );
        let aspect = gpu.width() as f32 / gpu.height() as f32;
        let frame_loop = FrameLoop::new(&config, factory, aspect);

        let assets = AssetStore::load_dir(ASSET_DIR, frame_loop.models.catalog().ids());
        frame_loop.push(InputEvent::ActivateModel(config.default_model.clone()));

        // Initialize egui
        let egui_ctx = egui::Context::default();
        let egui_state = egui_winit::State::new(
            egui_ctx.clone(),
            egui::ViewportId::ROOT,
            &window,
            Some(window.scale_factor() as f32),
            None,
            None,
        );

        let lock_host = WindowLockHost { window: window.clone(), events: frame_loop.events() };

        Ok(Self {
            window,
            gpu,
            render_state,
            egui_state,
            egui_ctx,
            frame_loop,
            assets,
            lock_host,
            last_frame_time: Instant::now(),
        })
    }

    /// Translate a window event into the input queue. Returns true when handled.
    fn input(&mut self, event: &WindowEvent) -> bool {
        // First let egui process the event
        if self.egui_state.on_window_event(self.window.as_ref(), event).consumed {
            return true;
        }

        match event {
            WindowEvent::KeyboardInput { event: KeyEvent { state, physical_key, repeat, .. }, .. } => {
                if let PhysicalKey::Code(code) = physical_key {
                    // KeyCode's Debug names match DOM `KeyboardEvent.code` ("KeyW", "ArrowUp", "Escape")
                    let code = format!("{code:?}");
                    match state {
                        ElementState::Pressed if !repeat => self.frame_loop.push(InputEvent::KeyDown(code)),
                        ElementState::Pressed => {}
                        ElementState::Released => self.frame_loop.push(InputEvent::KeyUp(code)),
                    }
                }
                true
            }
            WindowEvent::MouseInput { state: ElementState::Pressed, button: MouseButton::Left, .. } => {
                self.frame_loop.push(InputEvent::LockRequested);
                true
            }
            WindowEvent::Focused(false) => {
                self.frame_loop.push(InputEvent::FocusLost);
                true
            }
            _ => false,
        }
    }

    fn resize(&mut self, new_size: winit::dpi::PhysicalSize<u32>) {
        self.gpu.resize(new_size.width, new_size.height);
        self.frame_loop.push(InputEvent::Resized { width: new_size.width, height: new_size.height });
    }

    fn handle_mouse_motion(&mut self, dx: f64, dy: f64) {
        self.frame_loop.push(InputEvent::MouseMove { dx: dx as f32, dy: dy as f32 });
    }

    fn redraw(&mut self) -> Result<(), wgpu::SurfaceError> {
        let now = Instant::now();
        let dt = (now - self.last_frame_time).as_secs_f32().min(MAX_FRAME_DT);
        self.last_frame_time = now;

        self.frame_loop.frame(dt, &self.assets, &mut self.lock_host);

        let raw_input = self.egui_state.take_egui_input(&self.window);
        let output = ui::build_ui(&self.egui_ctx, raw_input, &mut self.frame_loop, dt);
        self.egui_state.handle_platform_output(&self.window, output.platform_output);
        let primitives = self.egui_ctx.tessellate(output.shapes, output.pixels_per_point);

        let (width, height) = (self.gpu.width(), self.gpu.height());
        self.render_state
            .update_camera(&self.gpu.queue, self.frame_loop.camera.camera(), width, height);
        self.render_state.draw_frame(
            &self.gpu,
            view::visible_engine(&self.frame_loop),
            Some(EguiFrame {
                primitives,
                textures_delta: output.textures_delta,
                pixels_per_point: output.pixels_per_point,
            }),
        )
    }

    fn shutdown(&mut self) {
        self.frame_loop.models.shutdown(&mut self.frame_loop.scene);
    }
}

fn load_config() -> AppConfig {
    let Ok(path) = std::env::var(CONFIG_ENV) else {
        return AppConfig::default();
    };
    match AppConfig::load(Path::new(&path)) {
        Ok(config) => {
            tracing::info!(models = config.models.len(), "loaded config from {path}");
            config
        }
        Err(e) => {
            tracing::error!("invalid config {path}: {e}; using built-in defaults");
            AppConfig::default()
        }
    }
}

#[allow(deprecated)]
fn run() -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config();

    let event_loop = EventLoop::new()?;
    let window_attributes = Window::default_attributes()
        .with_title("Particle Gallery")
        .with_inner_size(winit::dpi::LogicalSize::new(1280, 720));
    let window = Arc::new(event_loop.create_window(window_attributes)?);

    let mut app = pollster::block_on(App::new(window, config))?;

    event_loop.run(move |event, elwt| match event {
        Event::WindowEvent { ref event, window_id } if window_id == app.window.id() => {
            if !app.input(event) {
                match event {
                    WindowEvent::CloseRequested => {
                        app.shutdown();
                        elwt.exit();
                    }
                    WindowEvent::Resized(physical_size) => app.resize(*physical_size),
                    WindowEvent::RedrawRequested => match app.redraw() {
                        Ok(()) => {}
                        Err(wgpu::SurfaceError::OutOfMemory) => {
                            tracing::error!("GPU out of memory");
                            app.shutdown();
                            elwt.exit();
                        }
                        Err(e) => tracing::warn!("frame dropped: {e}"),
                    },
                    _ => {}
                }
            }
        }
        Event::DeviceEvent { event: DeviceEvent::MouseMotion { delta }, .. } => {
            app.handle_mouse_motion(delta.0, delta.1);
        }
        Event::AboutToWait => {
            app.window.request_redraw();
        }
        _ => {}
    })?;
    Ok(())
}

fn main() {
    logging::init();
    if let Err(e) = run() {
        tracing::error!("fatal: {e}");
        std::process::exit(1);
    }
}
