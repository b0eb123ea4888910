//! Forwarding of on-screen joypad touches to the emulator core.

use std::fmt;
use std::str::FromStr;

use bitflags::bitflags;
use log::trace;
use num_enum::{FromPrimitive, IntoPrimitive, TryFromPrimitive};

use crate::error::AppError;

/// Prefix of the view ids of the on-screen joypad buttons (e.g. `joypad_START`)
pub const CONTROL_ID_PREFIX: &str = "joypad_";

/// One of the eight joypad controls, with the key code the emulator core expects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, TryFromPrimitive, IntoPrimitive)]
#[repr(u8)]
pub enum JoypadButton {
    Right = 0,
    Left = 1,
    Up = 2,
    Down = 3,
    A = 4,
    B = 5,
    Start = 6,
    Select = 7,
}

impl JoypadButton {
    pub const ALL: [JoypadButton; 8] = [
        JoypadButton::Right,
        JoypadButton::Left,
        JoypadButton::Up,
        JoypadButton::Down,
        JoypadButton::A,
        JoypadButton::B,
        JoypadButton::Start,
        JoypadButton::Select,
    ];

    /// The key code passed to the emulator core
    pub fn code(self) -> u8 {
        self.into()
    }

    pub fn name(self) -> &'static str {
        match self {
            JoypadButton::Right => "RIGHT",
            JoypadButton::Left => "LEFT",
            JoypadButton::Up => "UP",
            JoypadButton::Down => "DOWN",
            JoypadButton::A => "A",
            JoypadButton::B => "B",
            JoypadButton::Start => "START",
            JoypadButton::Select => "SELECT",
        }
    }

    /// The id of the view that renders this button
    pub fn control_id(self) -> String {
        format!("{CONTROL_ID_PREFIX}{}", self.name())
    }

    pub fn from_control_id(id: &str) -> Option<Self> {
        id.strip_prefix(CONTROL_ID_PREFIX)?.parse().ok()
    }

    fn mask(self) -> ButtonMask {
        ButtonMask::from_bits_truncate(1 << self.code())
    }
}

impl fmt::Display for JoypadButton {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for JoypadButton {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        JoypadButton::ALL
            .into_iter()
            .find(|button| button.name() == s)
            .ok_or_else(|| AppError::UnknownControl(s.to_string()))
    }
}

bitflags! {
    /// The set of joypad buttons currently held down
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ButtonMask: u8 {
        const RIGHT = 1 << 0;
        const LEFT = 1 << 1;
        const UP = 1 << 2;
        const DOWN = 1 << 3;
        const A = 1 << 4;
        const B = 1 << 5;
        const START = 1 << 6;
        const SELECT = 1 << 7;
    }
}

/// The action of a touch on a joypad button
///
/// See [the MotionEvent docs](https://developer.android.com/reference/android/view/MotionEvent#ACTION_DOWN)
///
/// This implements `Into<i32>` and `From<i32>` for converting to/from Android
/// SDK integer values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, FromPrimitive, IntoPrimitive)]
#[non_exhaustive]
#[repr(i32)]
pub enum TouchAction {
    Down = 0,
    Up = 1,
    Move = 2,
    Cancel = 3,

    #[doc(hidden)]
    #[num_enum(catch_all)]
    __Unknown(i32),
}

/// The foreign "key down" / "key up" entry points of the emulator core
pub trait KeySink {
    fn key_down(&mut self, code: u8);
    fn key_up(&mut self, code: u8);
}

impl<S: KeySink + ?Sized> KeySink for Box<S> {
    fn key_down(&mut self, code: u8) {
        (**self).key_down(code)
    }

    fn key_up(&mut self, code: u8) {
        (**self).key_up(code)
    }
}

/// Turns touches on the joypad buttons into key events for the emulator core.
///
/// A press is forwarded only once until the button is released, and a
/// release is forwarded only for a button that was pressed, so the core
/// always sees a press before the matching release.
#[derive(Debug)]
pub struct InputDispatcher<S> {
    sink: S,
    pressed: ButtonMask,
}

impl<S: KeySink> InputDispatcher<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            pressed: ButtonMask::empty(),
        }
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn pressed(&self) -> ButtonMask {
        self.pressed
    }

    /// Handles a touch on `button`; returns `true` if the touch was consumed
    pub fn on_touch(&mut self, button: JoypadButton, action: TouchAction) -> bool {
        match action {
            TouchAction::Down => {
                self.press(button);
                true
            }
            // A cancelled gesture must still release the button
            TouchAction::Up | TouchAction::Cancel => {
                self.release(button);
                true
            }
            TouchAction::Move => true,
            _ => false,
        }
    }

    pub fn press(&mut self, button: JoypadButton) -> bool {
        if self.pressed.contains(button.mask()) {
            return false;
        }
        trace!("Pressed button {button}");
        self.pressed.insert(button.mask());
        self.sink.key_down(button.code());
        true
    }

    pub fn release(&mut self, button: JoypadButton) -> bool {
        if !self.pressed.contains(button.mask()) {
            return false;
        }
        trace!("Released button {button}");
        self.pressed.remove(button.mask());
        self.sink.key_up(button.code());
        true
    }

    /// Releases every held button, e.g. when the activity loses focus
    pub fn release_all(&mut self) {
        for button in JoypadButton::ALL {
            self.release(button);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Default)]
    struct Recorder {
        events: Vec<(&'static str, u8)>,
    }

    impl KeySink for Recorder {
        fn key_down(&mut self, code: u8) {
            self.events.push(("down", code));
        }

        fn key_up(&mut self, code: u8) {
            self.events.push(("up", code));
        }
    }

    #[test]
    fn codes_follow_control_order() {
        let codes: Vec<u8> = JoypadButton::ALL.iter().map(|b| b.code()).collect();
        assert_eq!(codes, (0..8).collect::<Vec<u8>>());
        assert_eq!(JoypadButton::try_from(6u8).unwrap(), JoypadButton::Start);
        assert!(JoypadButton::try_from(8u8).is_err());
    }

    #[test]
    fn control_ids_round_trip() {
        for button in JoypadButton::ALL {
            assert_eq!(JoypadButton::from_control_id(&button.control_id()), Some(button));
        }
        assert_eq!(JoypadButton::Select.control_id(), "joypad_SELECT");
        assert_eq!(JoypadButton::from_control_id("joypad_X"), None);
        assert_eq!(JoypadButton::from_control_id("A"), None);
        assert!(matches!(
            "TURBO".parse::<JoypadButton>(),
            Err(AppError::UnknownControl(name)) if name == "TURBO"
        ));
    }

    #[test]
    fn press_is_reported_before_release() {
        let mut input = InputDispatcher::new(Recorder::default());
        assert!(input.on_touch(JoypadButton::A, TouchAction::Down));
        assert!(input.on_touch(JoypadButton::A, TouchAction::Move));
        assert!(input.on_touch(JoypadButton::A, TouchAction::Up));
        assert_eq!(input.sink().events, vec![("down", 4), ("up", 4)]);
        assert_eq!(input.pressed(), ButtonMask::empty());
    }

    #[test]
    fn unmatched_events_are_not_forwarded() {
        let mut input = InputDispatcher::new(Recorder::default());
        assert!(!input.release(JoypadButton::B));
        assert!(input.press(JoypadButton::B));
        assert!(!input.press(JoypadButton::B));
        assert_eq!(input.pressed(), ButtonMask::B);
        assert_eq!(input.sink().events, vec![("down", 5)]);
    }

    #[test]
    fn cancel_releases_and_unknown_actions_are_ignored() {
        let mut input = InputDispatcher::new(Recorder::default());
        input.on_touch(JoypadButton::Up, TouchAction::Down);
        input.on_touch(JoypadButton::Up, TouchAction::Cancel);
        assert!(!input.on_touch(JoypadButton::Up, TouchAction::from(9)));
        assert_eq!(input.sink().events, vec![("down", 2), ("up", 2)]);
    }

    #[test]
    fn release_all_lifts_held_buttons() {
        let mut input = InputDispatcher::new(Recorder::default());
        input.press(JoypadButton::Left);
        input.press(JoypadButton::Start);
        assert_eq!(input.pressed(), ButtonMask::LEFT | ButtonMask::START);
        input.release_all();
        assert!(input.pressed().is_empty());
        assert_eq!(
            input.sink().events,
            vec![("down", 1), ("down", 6), ("up", 1), ("up", 6)]
        );
    }
}
