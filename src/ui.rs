use egui::{Color32, Context, RichText};

use crate::controller::{FrameLoop, InputEvent};
use crate::model::{Color, EngineFactory, ModelParams};

/// Fill of the switcher button for the active model.
pub const ACTIVE_HIGHLIGHT: Color32 = Color32::from_rgb(0xF7, 0x77, 0xA8);

pub const CLICK_PROMPT: &str = "Click to Enable Controls";
pub const CONTROLS_HINT: &str = "WASD to move | Mouse to look | ESC to exit";

/// Build the complete UI and return egui output
///
/// The UI never mutates the camera or the active engine directly: model
/// switches are enqueued as `InputEvent::ActivateModel`, and debug edits go
/// through `ModelLifecycleManager::set_params`.
pub fn build_ui<F: EngineFactory>(
    egui_ctx: &Context,
    raw_input: egui::RawInput,
    frame_loop: &mut FrameLoop<F>,
    dt: f32,
) -> egui::FullOutput {
    egui_ctx.run(raw_input, |ctx| {
        if frame_loop.camera.overlay_visible() {
            draw_instructions(ctx);
        }
        draw_model_switcher(ctx, frame_loop);
        draw_particles_window(ctx, frame_loop);
        draw_info(ctx, frame_loop, dt);
    })
}

/// RawInput for a fixed-size canvas, used where no egui platform crate exists.
#[cfg(target_arch = "wasm32")]
pub fn canvas_raw_input(width: u32, height: u32, now_ms: f64, events: Vec<egui::Event>) -> egui::RawInput {
    let mut raw_input = egui::RawInput::default();
    raw_input.time = Some(now_ms / 1000.0);
    raw_input.screen_rect = Some(egui::Rect::from_min_size(
        egui::Pos2::new(0.0, 0.0),
        egui::vec2(width as f32, height as f32),
    ));
    raw_input.events = events;
    raw_input
}

fn draw_instructions(ctx: &Context) {
    egui::Area::new(egui::Id::new("instructions"))
        .anchor(egui::Align2::CENTER_CENTER, [0.0, 0.0])
        .interactable(false)
        .show(ctx, |ui| {
            egui::Frame::NONE
                .fill(Color32::from_black_alpha(160))
                .corner_radius(6.0)
                .inner_margin(16.0)
                .show(ui, |ui| {
                    ui.vertical_centered(|ui| {
                        ui.label(RichText::new(CLICK_PROMPT).size(22.0).color(Color32::WHITE));
                        ui.add_space(6.0);
                        ui.label(RichText::new(CONTROLS_HINT).color(Color32::LIGHT_GRAY));
                    });
                });
        });
}

fn draw_model_switcher<F: EngineFactory>(ctx: &Context, frame_loop: &FrameLoop<F>) {
    let active = frame_loop.models.active_model();
    let mut clicked: Option<String> = None;

    egui::Area::new(egui::Id::new("model_switcher"))
        .anchor(egui::Align2::CENTER_BOTTOM, [0.0, -12.0])
        .show(ctx, |ui| {
            ui.horizontal(|ui| {
                for descriptor in frame_loop.models.catalog().iter() {
                    let is_active = active == Some(descriptor.id.as_str());
                    let [r, g, b] = descriptor.params().color.to_rgb8();
                    let text = if is_active {
                        RichText::new(&descriptor.id).color(Color32::BLACK).strong()
                    } else {
                        RichText::new(&descriptor.id).color(Color32::from_rgb(r, g, b))
                    };
                    let mut button = egui::Button::new(text).min_size(egui::vec2(72.0, 28.0));
                    if is_active {
                        button = button.fill(ACTIVE_HIGHLIGHT);
                    }
                    if ui.add(button).clicked() {
                        clicked = Some(descriptor.id.clone());
                    }
                }
            });
        });

    if let Some(id) = clicked {
        frame_loop.push(InputEvent::ActivateModel(id));
    }
}

/// Debug panel. Returns the edited parameters when anything changed.
fn edit_params(ui: &mut egui::Ui, params: &ModelParams) -> Option<ModelParams> {
    let mut edited = *params;
    let mut changed = false;

    let mut rgb = edited.color.to_rgb8();
    ui.horizontal(|ui| {
        ui.label(RichText::new("color").small());
        if ui.color_edit_button_srgb(&mut rgb).changed() {
            edited.color = Color::from_rgb8(rgb[0], rgb[1], rgb[2]);
            changed = true;
        }
    });
    changed |= ui
        .add(egui::Slider::new(&mut edited.size, 1.0..=10.0).step_by(0.1).text("size"))
        .changed();
    changed |= ui
        .add(egui::Slider::new(&mut edited.force, 0.0..=0.8).step_by(0.01).text("force"))
        .changed();
    changed |= ui
        .add(egui::Slider::new(&mut edited.min_alpha, 0.0..=1.0).step_by(0.01).text("min alpha"))
        .changed();
    changed |= ui
        .add(egui::Slider::new(&mut edited.max_alpha, 0.0..=1.0).step_by(0.01).text("max alpha"))
        .changed();

    changed.then_some(edited)
}

fn draw_particles_window<F: EngineFactory>(ctx: &Context, frame_loop: &mut FrameLoop<F>) {
    let Some(params) = frame_loop.models.session().params().copied() else {
        return;
    };
    let mut edited = None;

    egui::Window::new("particles")
        .anchor(egui::Align2::RIGHT_TOP, [-8.0, 8.0])
        .default_width(220.0)
        .resizable(false)
        .show(ctx, |ui| {
            edited = edit_params(ui, &params);
        });

    if let Some(params) = edited {
        frame_loop.models.set_params(params);
    }
}

fn draw_info<F: EngineFactory>(ctx: &Context, frame_loop: &FrameLoop<F>, dt: f32) {
    let camera = frame_loop.camera.camera();
    let pos = camera.position;

    egui::Area::new(egui::Id::new("info"))
        .anchor(egui::Align2::LEFT_TOP, [8.0, 8.0])
        .interactable(false)
        .show(ctx, |ui| {
            ui.label(RichText::new(format!("FPS: {:.0}", if dt > 0.0 { 1.0 / dt } else { 0.0 })).small());
            ui.label(RichText::new(format!("Pos: x: {:.2} y: {:.2} z: {:.2}", pos.x, pos.y, pos.z)).small());
            ui.label(
                RichText::new(format!(
                    "Yaw: {:.1} Pitch: {:.1}",
                    camera.yaw().to_degrees(),
                    camera.pitch().to_degrees()
                ))
                .small(),
            );
            let model = frame_loop.models.active_model().unwrap_or("none");
            let state = if frame_loop.models.has_binding() { "running" } else { "idle" };
            ui.label(RichText::new(format!("Model: {model} ({state})")).small());
        });
}
