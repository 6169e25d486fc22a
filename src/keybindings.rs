//! Keyboard shortcuts.
//!
//! Keys are compared against the lowercased `KeyboardEvent.key` value, so
//! arrows are `"arrowleft"` etc. and printable keys are the character itself.

use serde::{Deserialize, Serialize};

use crate::constants::KEY_PAN_FRACTION;
use crate::editor::EditMode;

/// Something the viewer can be asked to do from the keyboard.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Action {
    /// Pan by a fraction of the view span
    Pan { dx: f64, dz: f64 },
    /// Zoom one step in at the last pointer position
    ZoomIn,
    /// Zoom one step out at the last pointer position
    ZoomOut,
    /// Return to the window before the last rectangle zoom
    ZoomBack,
    ViewAll,
    Refresh,
    /// Toggle an edit mode
    EditMode(EditMode),
    /// Pair the current bookmark, or unpair it if already paired
    Pair,
    MarkNoise,
    NewGroup,
    SelectGroup,
    Undo,
    Redo,
    Jump,
    /// Put the guard at the pointer's mz
    SetGuard,
    ClearGuard,
    ToggleColorblind,
}

/// Key assignments. Ctrl combinations are used only for undo and redo.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyBindings {
    pub left: String,
    pub up: String,
    pub right: String,
    pub down: String,
    pub refresh: String,
    pub view_all: String,
    pub trace: String,
    pub envelope: String,
    pub noise: String,
    pub add: String,
    pub select: String,
    /// With Ctrl held
    pub undo: String,
    /// With Ctrl held
    pub redo: String,
    pub jump: String,
    pub back: String,
    pub zoom_in: String,
    pub zoom_out: String,
    pub pair: String,
    pub color: String,
    pub guard: String,
    pub hide_guard: String,
}

impl Default for KeyBindings {
    fn default() -> Self {
        let key = |k: &str| k.to_string();
        Self {
            left: key("arrowleft"),
            up: key("arrowup"),
            right: key("arrowright"),
            down: key("arrowdown"),
            refresh: key("r"),
            view_all: key("a"),
            trace: key("t"),
            envelope: key("e"),
            noise: key("x"),
            add: key("n"),
            select: key("m"),
            undo: key("z"),
            redo: key("y"),
            jump: key("j"),
            back: key("z"),
            zoom_in: key("+"),
            zoom_out: key("-"),
            pair: key("p"),
            color: key("l"),
            guard: key("g"),
            hide_guard: key("h"),
        }
    }
}

impl KeyBindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// The action bound to a key press, if any.
    pub fn action_for(&self, key: &str, ctrl: bool) -> Option<Action> {
        let key = key.to_lowercase();

        if ctrl {
            return if key == self.undo {
                Some(Action::Undo)
            } else if key == self.redo {
                Some(Action::Redo)
            } else {
                None
            };
        }

        let bindings: [(&str, Action); 19] = [
            (self.left.as_str(), Action::Pan { dx: -KEY_PAN_FRACTION, dz: 0.0 }),
            (self.up.as_str(), Action::Pan { dx: 0.0, dz: KEY_PAN_FRACTION }),
            (self.right.as_str(), Action::Pan { dx: KEY_PAN_FRACTION, dz: 0.0 }),
            (self.down.as_str(), Action::Pan { dx: 0.0, dz: -KEY_PAN_FRACTION }),
            (self.refresh.as_str(), Action::Refresh),
            (self.view_all.as_str(), Action::ViewAll),
            (self.trace.as_str(), Action::EditMode(EditMode::Trace)),
            (self.envelope.as_str(), Action::EditMode(EditMode::Envelope)),
            (self.noise.as_str(), Action::MarkNoise),
            (self.add.as_str(), Action::NewGroup),
            (self.select.as_str(), Action::SelectGroup),
            (self.guard.as_str(), Action::SetGuard),
            (self.hide_guard.as_str(), Action::ClearGuard),
            (self.jump.as_str(), Action::Jump),
            (self.back.as_str(), Action::ZoomBack),
            (self.zoom_in.as_str(), Action::ZoomIn),
            (self.zoom_out.as_str(), Action::ZoomOut),
            (self.pair.as_str(), Action::Pair),
            (self.color.as_str(), Action::ToggleColorblind),
        ];

        bindings
            .iter()
            .find(|(bound, _)| !bound.is_empty() && *bound == key.as_str())
            .map(|(_, action)| *action)
    }
}
