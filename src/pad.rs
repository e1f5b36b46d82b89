#[cfg(feature = "wasm")]
use wasm_bindgen::prelude::*;

/// Snapshot of the eight key states, used both for the `committed`
/// bank (what JOYP reads reflect) and the `next` bank (what user
/// input mutates).
#[derive(Clone, Copy, Default, PartialEq, Eq)]
struct PadState {
    up: bool,
    down: bool,
    left: bool,
    right: bool,
    start: bool,
    select: bool,
    b: bool,
    a: bool,
}

impl PadState {
    /// Inverted nibble (bit = 1 means released) for the direction bank.
    fn direction_bits(&self) -> u8 {
        (if self.right { 0x00 } else { 0x01 })
            | (if self.left { 0x00 } else { 0x02 })
            | (if self.up { 0x00 } else { 0x04 })
            | (if self.down { 0x00 } else { 0x08 })
    }

    /// Inverted nibble (bit = 1 means released) for the action bank.
    fn action_bits(&self) -> u8 {
        (if self.a { 0x00 } else { 0x01 })
            | (if self.b { 0x00 } else { 0x02 })
            | (if self.select { 0x00 } else { 0x04 })
            | (if self.start { 0x00 } else { 0x08 })
    }
}

pub struct Pad {
    /// Key state published to JOYP reads, replaced wholesale by
    /// `commit_key_states()`.
    committed: PadState,

    /// Key state mutated by `key_press()`/`key_lift()`, not yet
    /// visible to reads until the next commit.
    next: PadState,

    /// True when the direction bank (P14) is selected, ie. JOYP bit 4
    /// was written as zero.
    direction_selected: bool,

    /// True when the action bank (P15) is selected, ie. JOYP bit 5
    /// was written as zero.
    action_selected: bool,

    /// When set, pressing one of Up/Down/Left/Right releases its
    /// opposite in `next`, preventing opposing directions from both
    /// registering as pressed at once.
    anti_socd: bool,

    /// Joypad interrupt request flag, mirrored into IF bit 4.
    int_pad: bool,
}

#[cfg_attr(feature = "wasm", wasm_bindgen)]
pub enum PadKey {
    Up,
    Down,
    Left,
    Right,
    Start,
    Select,
    A,
    B,
}

impl Pad {
    pub fn new() -> Self {
        Self {
            committed: PadState::default(),
            next: PadState::default(),
            direction_selected: false,
            action_selected: false,
            anti_socd: false,
            int_pad: false,
        }
    }

    pub fn reset(&mut self) {
        self.committed = PadState::default();
        self.next = PadState::default();
        self.direction_selected = false;
        self.action_selected = false;
        self.set_int_pad(false);
    }

    pub fn read(&mut self, addr: u16) -> u8 {
        match addr & 0x00ff {
            0x0000 => {
                let mut value = if self.direction_selected || self.action_selected {
                    0x00
                } else {
                    0x0f
                };
                if self.direction_selected {
                    value |= self.committed.direction_bits();
                }
                if self.action_selected {
                    value |= self.committed.action_bits();
                }
                value
                    | if self.direction_selected { 0x00 } else { 0x10 }
                    | if self.action_selected { 0x00 } else { 0x20 }
                    | 0xc0
            }
            addr => panic!("Reading from unknown Pad location 0x{:04x}", addr),
        }
    }

    pub fn write(&mut self, addr: u16, value: u8) {
        match addr & 0x00ff {
            0x0000 => {
                self.direction_selected = value & 0x10 == 0x00;
                self.action_selected = value & 0x20 == 0x00;
            }
            addr => panic!("Writing to unknown Pad location 0x{:04x}", addr),
        }
    }

    /// Computes the bits newly set between `committed` and `next`,
    /// raises the joypad interrupt if any of them fall in the
    /// currently selected bank, then atomically replaces `committed`
    /// with `next`. Intended to be called once per emulated frame.
    pub fn commit_key_states(&mut self) {
        let direction_edge = (self.next.up && !self.committed.up)
            || (self.next.down && !self.committed.down)
            || (self.next.left && !self.committed.left)
            || (self.next.right && !self.committed.right);
        let action_edge = (self.next.start && !self.committed.start)
            || (self.next.select && !self.committed.select)
            || (self.next.b && !self.committed.b)
            || (self.next.a && !self.committed.a);
        if (self.direction_selected && direction_edge) || (self.action_selected && action_edge) {
            self.set_int_pad(true);
        }
        self.committed = self.next;
    }

    pub fn int_pad(&self) -> bool {
        self.int_pad
    }

    pub fn set_int_pad(&mut self, value: bool) {
        self.int_pad = value;
    }

    #[inline(always)]
    pub fn ack_pad(&mut self) {
        self.set_int_pad(false);
    }

    /// True when a key in the currently selected bank is held down in
    /// the live (uncommitted) state, used to wake a `Stopped` CPU.
    pub fn wake_pending(&self) -> bool {
        let direction_pressed =
            self.next.up || self.next.down || self.next.left || self.next.right;
        let action_pressed =
            self.next.start || self.next.select || self.next.b || self.next.a;
        (self.direction_selected && direction_pressed) || (self.action_selected && action_pressed)
    }

    pub fn anti_socd(&self) -> bool {
        self.anti_socd
    }

    pub fn set_anti_socd(&mut self, value: bool) {
        self.anti_socd = value;
    }

    pub fn key_press(&mut self, key: PadKey) {
        if self.anti_socd {
            match key {
                PadKey::Up => self.next.down = false,
                PadKey::Down => self.next.up = false,
                PadKey::Left => self.next.right = false,
                PadKey::Right => self.next.left = false,
                _ => (),
            }
        }
        match key {
            PadKey::Up => self.next.up = true,
            PadKey::Down => self.next.down = true,
            PadKey::Left => self.next.left = true,
            PadKey::Right => self.next.right = true,
            PadKey::Start => self.next.start = true,
            PadKey::Select => self.next.select = true,
            PadKey::A => self.next.a = true,
            PadKey::B => self.next.b = true,
        }
    }

    pub fn key_lift(&mut self, key: PadKey) {
        match key {
            PadKey::Up => self.next.up = false,
            PadKey::Down => self.next.down = false,
            PadKey::Left => self.next.left = false,
            PadKey::Right => self.next.right = false,
            PadKey::Start => self.next.start = false,
            PadKey::Select => self.next.select = false,
            PadKey::A => self.next.a = false,
            PadKey::B => self.next.b = false,
        }
    }
}

impl Default for Pad {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::{Pad, PadKey};

    #[test]
    fn test_joyp_idle_reads_all_ones() {
        let mut pad = Pad::new();
        pad.write(0x0000, 0x30);
        assert_eq!(pad.read(0x0000), 0xff);
    }

    #[test]
    fn test_joyp_reflects_committed_not_next() {
        let mut pad = Pad::new();
        pad.write(0x0000, 0x20); // direction bank selected
        pad.key_press(PadKey::Up);
        assert_eq!(pad.read(0x0000), 0xef);
        pad.commit_key_states();
        assert_eq!(pad.read(0x0000), 0xeb);
    }

    #[test]
    fn test_commit_raises_interrupt_on_selected_bank() {
        let mut pad = Pad::new();
        pad.write(0x0000, 0x20); // direction bank selected
        pad.key_press(PadKey::A); // action key, bank not selected
        pad.commit_key_states();
        assert!(!pad.int_pad());
        pad.key_press(PadKey::Up); // direction key, bank selected
        pad.commit_key_states();
        assert!(pad.int_pad());
    }

    #[test]
    fn test_anti_socd_releases_opposite() {
        let mut pad = Pad::new();
        pad.set_anti_socd(true);
        pad.write(0x0000, 0x20);
        pad.key_press(PadKey::Down);
        pad.key_press(PadKey::Up);
        pad.commit_key_states();
        assert_eq!(pad.read(0x0000), 0xeb);
    }

    #[test]
    fn test_concurrent_selection_ors_inverses() {
        let mut pad = Pad::new();
        pad.write(0x0000, 0x00); // both banks selected
        pad.key_press(PadKey::Up);
        pad.key_press(PadKey::Select);
        pad.commit_key_states();
        let value = pad.read(0x0000);
        assert_eq!(value & 0x04, 0x00);
        assert_eq!(value & 0x01, 0x01);
    }
}
