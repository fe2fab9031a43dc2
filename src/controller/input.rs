/// Platform-agnostic input handling system
use std::cell::RefCell;
use std::collections::{HashSet, VecDeque};
use std::rc::Rc;

/// Platform-independent input events. Host callbacks only ever enqueue these;
/// the frame loop applies them in arrival order before updating.
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    // Keyboard events, keyed by physical key code ("KeyW", "ArrowUp", ...)
    KeyDown(String),
    KeyUp(String),

    // Mouse events
    MouseMove { dx: f32, dy: f32 },
    /// User gesture asking for pointer lock (canvas click).
    LockRequested,

    // Pointer lock protocol
    PointerLockChanged { locked: bool },
    PointerLockError,

    // Window events
    FocusLost,
    Resized { width: u32, height: u32 },

    // UI requests
    ActivateModel(String),
}

/// FIFO of pending input events, drained once per frame.
#[derive(Debug, Default)]
pub struct InputQueue {
    events: VecDeque<InputEvent>,
}

impl InputQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, event: InputEvent) {
        self.events.push_back(event);
    }

    pub fn drain(&mut self) -> impl Iterator<Item = InputEvent> + '_ {
        self.events.drain(..)
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Queue handle shared between event callbacks and the frame loop.
pub type SharedInputQueue = Rc<RefCell<InputQueue>>;

/// Keyboard edge state
#[derive(Debug, Default)]
pub struct InputState {
    pressed_keys: HashSet<String>,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a key transition. Repeated identical events change nothing.
    pub fn set_key(&mut self, code: &str, pressed: bool) {
        if pressed {
            if !self.pressed_keys.contains(code) {
                self.pressed_keys.insert(code.to_string());
            }
        } else {
            self.pressed_keys.remove(code);
        }
    }

    pub fn is_key_pressed(&self, code: &str) -> bool {
        self.pressed_keys.contains(code)
    }

    pub fn clear_keys(&mut self) {
        self.pressed_keys.clear();
    }

    pub fn pressed_count(&self) -> usize {
        self.pressed_keys.len()
    }
}

/// Key mapping configuration
#[derive(Debug, Clone)]
pub struct KeyBindings {
    pub forward: String,
    pub backward: String,
    pub left: String,
    pub right: String,
    pub escape: String,
    pub reset_model: String,
}

impl Default for KeyBindings {
    fn default() -> Self {
        Self {
            forward: "KeyW".to_string(),
            backward: "KeyS".to_string(),
            left: "KeyA".to_string(),
            right: "KeyD".to_string(),
            escape: "Escape".to_string(),
            reset_model: "KeyR".to_string(),
        }
    }
}

/// High-level input processor
#[derive(Debug, Clone, Default)]
pub struct InputProcessor {
    bindings: KeyBindings,
}

impl InputProcessor {
    pub fn new(bindings: KeyBindings) -> Self {
        Self { bindings }
    }

    pub fn is_moving_forward(&self, input: &InputState) -> bool {
        input.is_key_pressed(&self.bindings.forward) || input.is_key_pressed("ArrowUp")
    }

    pub fn is_moving_backward(&self, input: &InputState) -> bool {
        input.is_key_pressed(&self.bindings.backward) || input.is_key_pressed("ArrowDown")
    }

    pub fn is_moving_left(&self, input: &InputState) -> bool {
        input.is_key_pressed(&self.bindings.left) || input.is_key_pressed("ArrowLeft")
    }

    pub fn is_moving_right(&self, input: &InputState) -> bool {
        input.is_key_pressed(&self.bindings.right) || input.is_key_pressed("ArrowRight")
    }

    pub fn is_escape(&self, code: &str) -> bool {
        code == self.bindings.escape
    }

    pub fn wants_model_reset(&self, code: &str) -> bool {
        code == self.bindings.reset_model
    }

    /// Movement intent in camera space: `x` strafes right, `y` moves forward.
    /// Components are -1, 0 or 1; opposing keys cancel.
    pub fn movement_intent(&self, input: &InputState) -> glam::Vec2 {
        let axis = |pos: bool, neg: bool| (pos as i8 - neg as i8) as f32;
        glam::Vec2::new(
            axis(self.is_moving_right(input), self.is_moving_left(input)),
            axis(self.is_moving_forward(input), self.is_moving_backward(input)),
        )
    }
}

#[cfg(target_arch = "wasm32")]
pub mod wasm {
    use super::*;
    use web_sys::{KeyboardEvent, MouseEvent};

    pub fn keyboard_event_to_input(e: &KeyboardEvent, is_down: bool) -> InputEvent {
        let code = e.code();
        if is_down {
            InputEvent::KeyDown(code)
        } else {
            InputEvent::KeyUp(code)
        }
    }

    pub fn mouse_move_to_input(e: &MouseEvent) -> InputEvent {
        InputEvent::MouseMove {
            dx: e.movement_x() as f32,
            dy: e.movement_y() as f32,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_key_events_are_idempotent() {
        let mut input = InputState::new();
        input.set_key("KeyW", true);
        input.set_key("KeyW", true);
        assert_eq!(input.pressed_count(), 1);
        input.set_key("KeyW", false);
        input.set_key("KeyW", false);
        assert!(!input.is_key_pressed("KeyW"));
    }

    #[test]
    fn opposing_keys_cancel() {
        let processor = InputProcessor::default();
        let mut input = InputState::new();
        input.set_key("KeyW", true);
        input.set_key("KeyS", true);
        input.set_key("KeyD", true);
        assert_eq!(processor.movement_intent(&input), glam::Vec2::new(1.0, 0.0));
    }

    #[test]
    fn arrow_keys_mirror_wasd() {
        let processor = InputProcessor::default();
        let mut input = InputState::new();
        input.set_key("ArrowUp", true);
        input.set_key("ArrowLeft", true);
        assert_eq!(processor.movement_intent(&input), glam::Vec2::new(-1.0, 1.0));
    }

    #[test]
    fn queue_drains_in_arrival_order() {
        let mut queue = InputQueue::new();
        queue.push(InputEvent::KeyDown("KeyW".into()));
        queue.push(InputEvent::PointerLockChanged { locked: true });
        queue.push(InputEvent::MouseMove { dx: 1.0, dy: 2.0 });
        let drained: Vec<_> = queue.drain().collect();
        assert_eq!(
            drained,
            vec![
                InputEvent::KeyDown("KeyW".into()),
                InputEvent::PointerLockChanged { locked: true },
                InputEvent::MouseMove { dx: 1.0, dy: 2.0 },
            ]
        );
        assert!(queue.is_empty());
    }
}
