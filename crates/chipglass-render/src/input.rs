//! Input multiplexing: mouse, keyboard, and touch events fold into a small
//! command set the engine executes synchronously. The controller is pure
//! state-machine; it never touches the renderer.

use std::collections::HashMap;

use chipglass_core::{LayerKey, Rgb, Vec2};

use crate::viewport::Viewport;

/// Wheel/keyboard zoom-in step; zoom-out is the reciprocal-ish 0.9.
pub const ZOOM_IN_FACTOR: f64 = 1.1;
pub const ZOOM_OUT_FACTOR: f64 = 0.9;

/// Keyboard pan step as a fraction of the viewport size.
const KEY_PAN_FRACTION: f64 = 0.1;

/// Commands the engine understands.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Pan { dx: f64, dy: f64 },
    ZoomAt { at: Vec2, factor: f64 },
    Fit,
    CenterOn(Vec2),
    PointerAt(Vec2),
    ToggleGrid,
    ToggleMetrics,
    ToggleLayerPanel,
    SetLayerVisible { key: LayerKey, visible: bool },
    SetLayerColor { key: LayerKey, color: Rgb },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Middle,
    Right,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Key {
    ArrowUp,
    ArrowDown,
    ArrowLeft,
    ArrowRight,
    Enter,
    F,
    G,
    P,
    L,
    Space,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Touch {
    pub id: u64,
    pub x: f64,
    pub y: f64,
}

/// Host-side input events, already normalized to logical pixels.
#[derive(Debug, Clone, PartialEq)]
pub enum InputEvent {
    MouseDown { button: MouseButton, x: f64, y: f64 },
    MouseUp { button: MouseButton },
    MouseMove { x: f64, y: f64 },
    /// Positive `delta_y` is wheel-down (zoom out).
    Wheel { x: f64, y: f64, delta_y: f64 },
    KeyDown { key: Key, shift: bool },
    KeyUp { key: Key },
    TouchStart { touches: Vec<Touch> },
    TouchMove { touches: Vec<Touch> },
    TouchEnd { touches: Vec<Touch> },
}

#[derive(Debug, Clone, Copy)]
struct Drag {
    button: MouseButton,
    last: Vec2,
}

/// Translates raw events into [`Command`]s.
#[derive(Debug, Default)]
pub struct InputController {
    space_down: bool,
    drag: Option<Drag>,
    touches: HashMap<u64, Vec2>,
}

impl InputController {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn handle(&mut self, event: InputEvent, viewport: &Viewport) -> Vec<Command> {
        match event {
            InputEvent::Wheel { x, y, delta_y } => {
                let factor = if delta_y < 0.0 {
                    ZOOM_IN_FACTOR
                } else {
                    ZOOM_OUT_FACTOR
                };
                vec![Command::ZoomAt {
                    at: Vec2::new(x, y),
                    factor,
                }]
            }

            InputEvent::MouseDown { button, x, y } => {
                let pans = button == MouseButton::Middle
                    || (button == MouseButton::Left && self.space_down);
                if pans {
                    self.drag = Some(Drag {
                        button,
                        last: Vec2::new(x, y),
                    });
                }
                Vec::new()
            }
            InputEvent::MouseUp { button } => {
                if self.drag.map(|d| d.button) == Some(button) {
                    self.drag = None;
                }
                Vec::new()
            }
            InputEvent::MouseMove { x, y } => {
                let here = Vec2::new(x, y);
                let mut commands = vec![Command::PointerAt(here)];
                if let Some(drag) = self.drag.as_mut() {
                    let (dx, dy) = (here.x - drag.last.x, here.y - drag.last.y);
                    drag.last = here;
                    commands.push(Command::Pan { dx, dy });
                }
                commands
            }

            InputEvent::KeyDown { key, shift } => self.handle_key(key, shift, viewport),
            InputEvent::KeyUp { key } => {
                if key == Key::Space {
                    self.space_down = false;
                }
                Vec::new()
            }

            InputEvent::TouchStart { touches } => {
                self.touches = touches
                    .iter()
                    .map(|t| (t.id, Vec2::new(t.x, t.y)))
                    .collect();
                Vec::new()
            }
            InputEvent::TouchMove { touches } => self.handle_touch_move(touches),
            InputEvent::TouchEnd { touches } => {
                for t in &touches {
                    self.touches.remove(&t.id);
                }
                Vec::new()
            }
        }
    }

    fn handle_key(&mut self, key: Key, shift: bool, viewport: &Viewport) -> Vec<Command> {
        let step_x = viewport.width * KEY_PAN_FRACTION;
        let step_y = viewport.height * KEY_PAN_FRACTION;
        let center = Vec2::new(viewport.width / 2.0, viewport.height / 2.0);
        match key {
            Key::ArrowLeft => vec![Command::Pan { dx: step_x, dy: 0.0 }],
            Key::ArrowRight => vec![Command::Pan { dx: -step_x, dy: 0.0 }],
            Key::ArrowUp => vec![Command::Pan { dx: 0.0, dy: step_y }],
            Key::ArrowDown => vec![Command::Pan { dx: 0.0, dy: -step_y }],
            Key::Enter => vec![Command::ZoomAt {
                at: center,
                factor: if shift { ZOOM_OUT_FACTOR } else { ZOOM_IN_FACTOR },
            }],
            Key::F => vec![Command::Fit],
            Key::G => vec![Command::ToggleGrid],
            Key::P => vec![Command::ToggleMetrics],
            Key::L => vec![Command::ToggleLayerPanel],
            Key::Space => {
                self.space_down = true;
                Vec::new()
            }
        }
    }

    fn handle_touch_move(&mut self, touches: Vec<Touch>) -> Vec<Command> {
        let mut commands = Vec::new();
        match touches.len() {
            1 => {
                let t = touches[0];
                let here = Vec2::new(t.x, t.y);
                if let Some(prev) = self.touches.get(&t.id).copied() {
                    commands.push(Command::Pan {
                        dx: here.x - prev.x,
                        dy: here.y - prev.y,
                    });
                }
                self.touches.insert(t.id, here);
            }
            2 => {
                let (a, b) = (touches[0], touches[1]);
                let (pa, pb) = (
                    self.touches.get(&a.id).copied(),
                    self.touches.get(&b.id).copied(),
                );
                if let (Some(pa), Some(pb)) = (pa, pb) {
                    let prev_dist = pa.distance_to(pb);
                    let dist = Vec2::new(a.x, a.y).distance_to(Vec2::new(b.x, b.y));
                    if prev_dist > 1.0 && dist > 1.0 {
                        let midpoint = Vec2::new((a.x + b.x) / 2.0, (a.y + b.y) / 2.0);
                        commands.push(Command::ZoomAt {
                            at: midpoint,
                            factor: dist / prev_dist,
                        });
                    }
                }
                self.touches.insert(a.id, Vec2::new(a.x, a.y));
                self.touches.insert(b.id, Vec2::new(b.x, b.y));
            }
            _ => {}
        }
        commands
    }
}
