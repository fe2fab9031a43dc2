// CONTROLLER: Input, lock protocol, camera and model lifecycle
pub mod input;
pub mod pointer_lock;
pub mod camera_controller;
pub mod engine_slot;
pub mod model_lifecycle;
pub mod frame_loop;

pub use input::{InputEvent, InputProcessor, InputQueue, InputState, KeyBindings, SharedInputQueue};
pub use pointer_lock::{PointerLockHost, PointerLockSession};
pub use camera_controller::CameraController;
pub use engine_slot::{BindingId, EngineSlot, Replacement};
pub use model_lifecycle::{ActiveModelSession, LifecycleError, ModelLifecycleManager, NotReadyReason};
pub use frame_loop::{FrameLoop, FrameReport};
