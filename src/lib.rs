// Re-export all public modules so they can be used from main.rs
pub mod config;
pub mod logging;
pub mod ui;

// MVC Architecture
pub mod model;
pub mod view;
pub mod controller;

/// Upper bound on a single frame's dt, so a stalled tab does not teleport the camera.
pub const MAX_FRAME_DT: f32 = 0.1;

#[cfg(target_arch = "wasm32")]
use std::cell::RefCell;
#[cfg(target_arch = "wasm32")]
use std::rc::Rc;
#[cfg(target_arch = "wasm32")]
use wasm_bindgen::closure::Closure;
#[cfg(target_arch = "wasm32")]
use wasm_bindgen::{prelude::wasm_bindgen, JsCast, JsValue};
#[cfg(target_arch = "wasm32")]
use web_sys::{Document, Event, HtmlCanvasElement, KeyboardEvent, MouseEvent, Window};

#[cfg(target_arch = "wasm32")]
use config::AppConfig;
#[cfg(target_arch = "wasm32")]
use controller::{FrameLoop, InputEvent, PointerLockHost, SharedInputQueue};
#[cfg(target_arch = "wasm32")]
use model::{AssetStore, ModelAsset};
#[cfg(target_arch = "wasm32")]
use view::{EguiFrame, GpgpuFactory, GpuContext, RenderState};

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(start)]
pub async fn start() -> Result<(), JsValue> {
    logging::init();
    let (window, document, canvas) = init_canvas()?;
    setup_app(&window, &document, &canvas).await
}

/// Pointer lock through the DOM. Grants and denials come back as
/// `pointerlockchange` / `pointerlockerror` events.
#[cfg(target_arch = "wasm32")]
struct WebLockHost {
    canvas: HtmlCanvasElement,
    document: Document,
}

#[cfg(target_arch = "wasm32")]
impl PointerLockHost for WebLockHost {
    fn request_pointer_lock(&mut self) {
        self.canvas.request_pointer_lock();
    }

    fn exit_pointer_lock(&mut self) {
        self.document.exit_pointer_lock();
    }
}

/// Main application setup for WASM
#[cfg(target_arch = "wasm32")]
async fn setup_app(window: &Window, document: &Document, canvas: &HtmlCanvasElement) -> Result<(), JsValue> {
    let mut gpu = GpuContext::new(canvas, canvas.width(), canvas.height())
        .await
        .map_err(|e| js_error(format!("GPU init failed: {e}")))?;

    let config = AppConfig::default();
    let mut render_state = RenderState::new(&gpu);
    let factory = GpgpuFactory::new(
        gpu.device.clone(),
        gpu.queue.clone(),
        gpu.format,
        render_state.camera.bind_group_layout.clone(),
    );
    let aspect = gpu.width() as f32 / gpu.height() as f32;
    let mut frame_loop = FrameLoop::new(&config, factory, aspect);

    let assets = Rc::new(RefCell::new(AssetStore::new()));
    for id in frame_loop.models.catalog().ids() {
        spawn_model_fetch(id.to_string(), config.default_model.clone(), assets.clone(), frame_loop.events());
    }

    let egui_ctx = egui::Context::default();
    let egui_events: Rc<RefCell<Vec<egui::Event>>> = Rc::new(RefCell::new(Vec::new()));

    setup_input_listeners(document, window, canvas, frame_loop.events(), egui_events.clone(), egui_ctx.clone())?;

    let mut lock_host = WebLockHost { canvas: canvas.clone(), document: document.clone() };
    let performance = window.performance().ok_or(js_error("no performance on window"))?;
    let mut last_time = performance.now();
    let canvas = canvas.clone();

    // Continuous redraw using requestAnimationFrame
    let f = RcCellCallback::new(window.clone(), move || {
        let now = performance.now();
        let dt = (((now - last_time) / 1000.0) as f32).clamp(0.0, MAX_FRAME_DT);
        last_time = now;

        if canvas.width() != gpu.width() || canvas.height() != gpu.height() {
            gpu.resize(canvas.width(), canvas.height());
        }

        frame_loop.frame(dt, &*assets.borrow(), &mut lock_host);

        let events = egui_events.borrow_mut().drain(..).collect();
        let raw_input = ui::canvas_raw_input(gpu.width(), gpu.height(), now, events);
        let output = ui::build_ui(&egui_ctx, raw_input, &mut frame_loop, dt);
        let primitives = egui_ctx.tessellate(output.shapes, output.pixels_per_point);

        render_state.update_camera(&gpu.queue, frame_loop.camera.camera(), gpu.width(), gpu.height());
        let egui_frame = EguiFrame {
            primitives,
            textures_delta: output.textures_delta,
            pixels_per_point: output.pixels_per_point,
        };
        if let Err(e) = render_state.draw_frame(&gpu, view::visible_engine(&frame_loop), Some(egui_frame)) {
            tracing::error!("frame dropped: {e}");
        }
    });
    f.start()
}

/// Fetch `models/<id>.glb` into the store. When the default model arrives its
/// activation is enqueued for the next frame.
#[cfg(target_arch = "wasm32")]
fn spawn_model_fetch(id: String, default_model: String, assets: Rc<RefCell<AssetStore>>, events: SharedInputQueue) {
    wasm_bindgen_futures::spawn_local(async move {
        let url = format!("models/{id}.glb");
        match fetch_bytes(&url).await {
            Ok(bytes) => match ModelAsset::from_gltf_slice(&bytes) {
                Ok(asset) => {
                    tracing::info!(model = %id, vertices = asset.vertex_count(), "loaded {url}");
                    assets.borrow_mut().insert(id.clone(), asset);
                    if id == default_model {
                        events.borrow_mut().push(InputEvent::ActivateModel(id));
                    }
                }
                Err(e) => tracing::warn!(model = %id, "failed to parse {url}: {e}"),
            },
            Err(e) => tracing::warn!(model = %id, "failed to fetch {url}: {e:?}"),
        }
    });
}

#[cfg(target_arch = "wasm32")]
async fn fetch_bytes(url: &str) -> Result<Vec<u8>, JsValue> {
    use wasm_bindgen_futures::JsFuture;

    let window = web_sys::window().ok_or(js_error("no global `window`"))?;
    let response: web_sys::Response = JsFuture::from(window.fetch_with_str(url)).await?.dyn_into()?;
    if !response.ok() {
        return Err(js_error(format!("HTTP {}", response.status())));
    }
    let buffer = JsFuture::from(response.array_buffer()?).await?;
    Ok(js_sys::Uint8Array::new(&buffer).to_vec())
}

/// Every DOM listener only enqueues; the frame loop applies the events.
#[cfg(target_arch = "wasm32")]
fn setup_input_listeners(
    document: &Document,
    window: &Window,
    canvas: &HtmlCanvasElement,
    events: SharedInputQueue,
    egui_events: Rc<RefCell<Vec<egui::Event>>>,
    egui_ctx: egui::Context,
) -> Result<(), JsValue> {
    use controller::input::wasm::{keyboard_event_to_input, mouse_move_to_input};

    let is_navigation = |code: &str| {
        matches!(
            code,
            "KeyW" | "KeyA" | "KeyS" | "KeyD" | "ArrowUp" | "ArrowDown" | "ArrowLeft" | "ArrowRight"
        )
    };

    // Keyboard down
    {
        let events = events.clone();
        let keydown = Closure::wrap(Box::new(move |e: KeyboardEvent| {
            if is_navigation(e.code().as_str()) {
                e.prevent_default();
            }
            if !e.repeat() {
                events.borrow_mut().push(keyboard_event_to_input(&e, true));
            }
        }) as Box<dyn FnMut(KeyboardEvent)>);
        document.add_event_listener_with_callback("keydown", keydown.as_ref().unchecked_ref())?;
        keydown.forget();
    }

    // Keyboard up
    {
        let events = events.clone();
        let keyup = Closure::wrap(Box::new(move |e: KeyboardEvent| {
            events.borrow_mut().push(keyboard_event_to_input(&e, false));
        }) as Box<dyn FnMut(KeyboardEvent)>);
        document.add_event_listener_with_callback("keyup", keyup.as_ref().unchecked_ref())?;
        keyup.forget();
    }

    // Focus loss - clear all keys
    {
        let events = events.clone();
        let blur = Closure::wrap(Box::new(move |_e: Event| {
            events.borrow_mut().push(InputEvent::FocusLost);
        }) as Box<dyn FnMut(Event)>);
        window.add_event_listener_with_callback("blur", blur.as_ref().unchecked_ref())?;
        blur.forget();
    }

    // Visibility change - clear all keys
    {
        let events = events.clone();
        let visibility = Closure::wrap(Box::new(move |_e: Event| {
            events.borrow_mut().push(InputEvent::FocusLost);
        }) as Box<dyn FnMut(Event)>);
        document.add_event_listener_with_callback("visibilitychange", visibility.as_ref().unchecked_ref())?;
        visibility.forget();
    }

    // Pointer lock change
    {
        let events = events.clone();
        let doc_pl = document.clone();
        let plc = Closure::wrap(Box::new(move |_e: Event| {
            let locked = doc_pl.pointer_lock_element().is_some();
            events.borrow_mut().push(InputEvent::PointerLockChanged { locked });
        }) as Box<dyn FnMut(Event)>);
        document.add_event_listener_with_callback("pointerlockchange", plc.as_ref().unchecked_ref())?;
        plc.forget();
    }

    // Pointer lock denied
    {
        let events = events.clone();
        let ple = Closure::wrap(Box::new(move |_e: Event| {
            events.borrow_mut().push(InputEvent::PointerLockError);
        }) as Box<dyn FnMut(Event)>);
        document.add_event_listener_with_callback("pointerlockerror", ple.as_ref().unchecked_ref())?;
        ple.forget();
    }

    // Canvas click requests the lock, unless it landed on a UI element
    {
        let events = events.clone();
        let click = Closure::wrap(Box::new(move |_e: MouseEvent| {
            if !egui_ctx.is_pointer_over_area() {
                events.borrow_mut().push(InputEvent::LockRequested);
            }
        }) as Box<dyn FnMut(MouseEvent)>);
        canvas.add_event_listener_with_callback("click", click.as_ref().unchecked_ref())?;
        click.forget();
    }

    // Mouse move: look deltas always, cursor position for egui only while unlocked
    {
        let events = events.clone();
        let egui_events = egui_events.clone();
        let doc_mm = document.clone();
        let mm = Closure::wrap(Box::new(move |e: MouseEvent| {
            events.borrow_mut().push(mouse_move_to_input(&e));
            if doc_mm.pointer_lock_element().is_none() {
                let pos = egui::pos2(e.client_x() as f32, e.client_y() as f32);
                egui_events.borrow_mut().push(egui::Event::PointerMoved(pos));
            }
        }) as Box<dyn FnMut(MouseEvent)>);
        document.add_event_listener_with_callback("mousemove", mm.as_ref().unchecked_ref())?;
        mm.forget();
    }

    // Mouse buttons for egui
    for (name, pressed) in [("mousedown", true), ("mouseup", false)] {
        let egui_events = egui_events.clone();
        let button = Closure::wrap(Box::new(move |e: MouseEvent| {
            if e.button() != 0 {
                return;
            }
            egui_events.borrow_mut().push(egui::Event::PointerButton {
                pos: egui::pos2(e.client_x() as f32, e.client_y() as f32),
                button: egui::PointerButton::Primary,
                pressed,
                modifiers: egui::Modifiers::default(),
            });
        }) as Box<dyn FnMut(MouseEvent)>);
        canvas.add_event_listener_with_callback(name, button.as_ref().unchecked_ref())?;
        button.forget();
    }

    // Window resize: resize the canvas backing store and tell the camera
    {
        let window_rs = window.clone();
        let canvas_rs = canvas.clone();
        let resize = Closure::wrap(Box::new(move |_e: Event| {
            let (width, height) = window_size(&window_rs);
            canvas_rs.set_width(width);
            canvas_rs.set_height(height);
            events.borrow_mut().push(InputEvent::Resized { width, height });
        }) as Box<dyn FnMut(Event)>);
        window.add_event_listener_with_callback("resize", resize.as_ref().unchecked_ref())?;
        resize.forget();
    }

    Ok(())
}

#[cfg(target_arch = "wasm32")]
fn window_size(window: &Window) -> (u32, u32) {
    let dim = |v: Result<JsValue, JsValue>| v.ok().and_then(|v| v.as_f64()).unwrap_or(1.0).max(1.0) as u32;
    (dim(window.inner_width()), dim(window.inner_height()))
}

#[cfg(target_arch = "wasm32")]
fn init_canvas() -> Result<(Window, Document, HtmlCanvasElement), JsValue> {
    let window = web_sys::window().ok_or(js_error("no global `window`"))?;
    let document = window.document().ok_or(js_error("no document on window"))?;
    let body = document.body().ok_or(js_error("no body on document"))?;
    let canvas_el = document
        .create_element("canvas")?
        .dyn_into::<HtmlCanvasElement>()
        .map_err(|_| js_error("failed to create canvas"))?;
    let (width, height) = window_size(&window);
    canvas_el.set_width(width);
    canvas_el.set_height(height);
    body.append_child(&canvas_el)?;
    Ok((window, document, canvas_el))
}

#[cfg(target_arch = "wasm32")]
fn js_error<E: Into<String>>(msg: E) -> JsValue {
    JsValue::from_str(&msg.into())
}

#[cfg(target_arch = "wasm32")]
struct RcCellCallback {
    inner: Rc<RefCell<Box<dyn FnMut()>>>,
    window: Window,
}

#[cfg(target_arch = "wasm32")]
impl RcCellCallback {
    fn new(window: Window, f: impl FnMut() + 'static) -> Self {
        Self {
            inner: Rc::new(RefCell::new(Box::new(f))),
            window,
        }
    }

    fn start(self) -> Result<(), JsValue> {
        let inner = self.inner.clone();
        let window = self.window.clone();

        let callback = Rc::new(RefCell::new(None::<Closure<dyn FnMut()>>));
        let callback_clone = callback.clone();

        *callback.borrow_mut() = Some(Closure::wrap(Box::new(move || {
            inner.borrow_mut().as_mut()();

            // Recursively schedule next frame
            if let Some(cb) = callback_clone.borrow().as_ref() {
                if let Err(e) = window.request_animation_frame(cb.as_ref().unchecked_ref()) {
                    tracing::error!("requestAnimationFrame failed: {e:?}");
                }
            }
        }) as Box<dyn FnMut()>));

        if let Some(cb) = callback.borrow().as_ref() {
            self.window.request_animation_frame(cb.as_ref().unchecked_ref())?;
        }

        // Leak the closure to keep it alive
        std::mem::forget(callback);
        Ok(())
    }
}
