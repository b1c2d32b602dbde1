use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PointerModifiers {
    #[serde(default)]
    pub ctrl: bool,
    #[serde(default)]
    pub shift: bool,
    #[serde(default)]
    pub alt: bool,
}

impl PointerModifiers {
    /// Ctrl or Shift extend the current selection instead of replacing it.
    pub fn is_additive(self) -> bool {
        self.ctrl || self.shift
    }
}

/// One pointer event in window pixels, origin at the bottom-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PointerEvent {
    pub x: f32,
    pub y: f32,
    /// Where the button went down for the current gesture.
    pub pressed_x: f32,
    pub pressed_y: f32,
    /// Position delivered with the previous event of the gesture.
    pub previous_x: f32,
    pub previous_y: f32,
    #[serde(default)]
    pub modifiers: PointerModifiers,
    /// First event of a press/drag/release gesture; later drags merge into its undo step.
    #[serde(default)]
    pub first_in_gesture: bool,
}

impl PointerEvent {
    /// Event that starts a gesture at `(x, y)`.
    pub fn at(x: f32, y: f32) -> Self {
        Self {
            x,
            y,
            pressed_x: x,
            pressed_y: y,
            previous_x: x,
            previous_y: y,
            modifiers: PointerModifiers::default(),
            first_in_gesture: true,
        }
    }

    /// Continuation of `self`'s gesture, now at `(x, y)`.
    pub fn moved_to(&self, x: f32, y: f32) -> Self {
        Self {
            x,
            y,
            pressed_x: self.pressed_x,
            pressed_y: self.pressed_y,
            previous_x: self.x,
            previous_y: self.y,
            modifiers: self.modifiers,
            first_in_gesture: false,
        }
    }

    pub fn with_modifiers(mut self, modifiers: PointerModifiers) -> Self {
        self.modifiers = modifiers;
        self
    }

    pub fn position(&self) -> (f32, f32) {
        (self.x, self.y)
    }

    pub fn previous(&self) -> (f32, f32) {
        (self.previous_x, self.previous_y)
    }

    pub fn delta(&self) -> (f32, f32) {
        (self.x - self.previous_x, self.y - self.previous_y)
    }

    pub fn distance_sq_from_previous(&self) -> f32 {
        let (dx, dy) = self.delta();
        dx * dx + dy * dy
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum KeyCode {
    Escape,
    Enter,
    Delete,
    Backspace,
    Left,
    Right,
    Up,
    Down,
    C,
    X,
    Y,
    Z,
    Other,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct KeyModifiers {
    #[serde(default)]
    pub ctrl: bool,
    #[serde(default)]
    pub shift: bool,
    #[serde(default)]
    pub alt: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyEvent {
    pub key: KeyCode,
    #[serde(default)]
    pub modifiers: KeyModifiers,
}

impl KeyEvent {
    pub fn plain(key: KeyCode) -> Self {
        Self {
            key,
            modifiers: KeyModifiers::default(),
        }
    }

    pub fn ctrl(key: KeyCode) -> Self {
        Self {
            key,
            modifiers: KeyModifiers {
                ctrl: true,
                ..KeyModifiers::default()
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyCommand {
    Cancel,
    Finish,
    Delete,
    Undo,
    Redo,
    Copy,
    Cut,
    /// Arrow-key move; `coarse` when Shift is held.
    Nudge { dx: i8, dy: i8, coarse: bool },
}

pub fn map_key_event_to_command(event: KeyEvent) -> Option<KeyCommand> {
    let KeyModifiers { ctrl, shift, .. } = event.modifiers;
    match event.key {
        KeyCode::Escape => Some(KeyCommand::Cancel),
        KeyCode::Enter => Some(KeyCommand::Finish),
        KeyCode::Delete | KeyCode::Backspace => Some(KeyCommand::Delete),
        KeyCode::Z if ctrl && shift => Some(KeyCommand::Redo),
        KeyCode::Z if ctrl => Some(KeyCommand::Undo),
        KeyCode::Y if ctrl => Some(KeyCommand::Redo),
        KeyCode::C if ctrl => Some(KeyCommand::Copy),
        KeyCode::X if ctrl => Some(KeyCommand::Cut),
        KeyCode::Left => Some(KeyCommand::Nudge {
            dx: -1,
            dy: 0,
            coarse: shift,
        }),
        KeyCode::Right => Some(KeyCommand::Nudge {
            dx: 1,
            dy: 0,
            coarse: shift,
        }),
        KeyCode::Up => Some(KeyCommand::Nudge {
            dx: 0,
            dy: 1,
            coarse: shift,
        }),
        KeyCode::Down => Some(KeyCommand::Nudge {
            dx: 0,
            dy: -1,
            coarse: shift,
        }),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn moved_to_tracks_previous_position_and_clears_first_flag() {
        let press = PointerEvent::at(10.0, 10.0);
        let drag = press.moved_to(14.0, 13.0);
        let next = drag.moved_to(20.0, 13.0);

        assert!(press.first_in_gesture);
        assert!(!drag.first_in_gesture);
        assert_eq!(drag.delta(), (4.0, 3.0));
        assert_eq!(drag.distance_sq_from_previous(), 25.0);
        assert_eq!(next.previous(), (14.0, 13.0));
        assert_eq!((next.pressed_x, next.pressed_y), (10.0, 10.0));
    }

    #[test]
    fn ctrl_shortcuts_map_to_history_and_clipboard_commands() {
        assert_eq!(
            map_key_event_to_command(KeyEvent::ctrl(KeyCode::Z)),
            Some(KeyCommand::Undo)
        );
        assert_eq!(
            map_key_event_to_command(KeyEvent::ctrl(KeyCode::Y)),
            Some(KeyCommand::Redo)
        );
        let ctrl_shift_z = KeyEvent {
            key: KeyCode::Z,
            modifiers: KeyModifiers {
                ctrl: true,
                shift: true,
                alt: false,
            },
        };
        assert_eq!(map_key_event_to_command(ctrl_shift_z), Some(KeyCommand::Redo));
        assert_eq!(
            map_key_event_to_command(KeyEvent::ctrl(KeyCode::X)),
            Some(KeyCommand::Cut)
        );
        assert_eq!(map_key_event_to_command(KeyEvent::plain(KeyCode::Z)), None);
    }

    #[test]
    fn shift_arrow_requests_coarse_nudge() {
        let event = KeyEvent {
            key: KeyCode::Up,
            modifiers: KeyModifiers {
                shift: true,
                ..KeyModifiers::default()
            },
        };
        assert_eq!(
            map_key_event_to_command(event),
            Some(KeyCommand::Nudge {
                dx: 0,
                dy: 1,
                coarse: true
            })
        );
    }

    #[test]
    fn escape_cancels() {
        assert_eq!(
            map_key_event_to_command(KeyEvent::plain(KeyCode::Escape)),
            Some(KeyCommand::Cancel)
        );
    }
}
