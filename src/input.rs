/// Joypad buttons. The matrix splits them into an action column (A, B,
/// Select, Start) and a direction column, selected via bits 5 and 4 of the
/// 0xFF00 register.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Button {
    A,
    B,
    Select,
    Start,
    Right,
    Left,
    Up,
    Down,
}

impl Button {
    fn bit(self) -> u8 {
        match self {
            Button::A => 0x01,
            Button::B => 0x02,
            Button::Select => 0x04,
            Button::Start => 0x08,
            Button::Right => 0x10,
            Button::Left => 0x20,
            Button::Up => 0x40,
            Button::Down => 0x80,
        }
    }
}

/// Joypad state: an active-low button mask (low nibble actions, high nibble
/// directions) composed with the column-select bits a game writes to 0xFF00.
#[derive(Debug)]
pub struct Joypad {
    select: u8,
    mask: u8,
}

impl Joypad {
    pub fn new() -> Self {
        Self {
            select: 0x30,
            mask: 0xFF,
        }
    }

    /// Read 0xFF00: unused bits high, select bits as written, and the
    /// selected column's button states in the low nibble (0 = pressed).
    pub fn read(&self) -> u8 {
        let mut nibble = 0x0F;
        if self.select & 0x10 == 0 {
            nibble &= (self.mask >> 4) & 0x0F;
        }
        if self.select & 0x20 == 0 {
            nibble &= self.mask & 0x0F;
        }
        0xC0 | self.select | nibble
    }

    /// Write 0xFF00: only the column-select bits are writable.
    pub fn write(&mut self, val: u8) {
        self.select = val & 0x30;
    }

    /// Press a button. Returns true on the released-to-pressed edge, which
    /// is when the joypad interrupt fires.
    pub fn press(&mut self, button: Button) -> bool {
        let bit = button.bit();
        let was_released = self.mask & bit != 0;
        self.mask &= !bit;
        was_released
    }

    pub fn release(&mut self, button: Button) {
        self.mask |= button.bit();
    }
}

impl Default for Joypad {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idle_register_reads_all_released() {
        let pad = Joypad::new();
        assert_eq!(pad.read() & 0x0F, 0x0F);
    }

    #[test]
    fn selected_column_reports_pressed_button() {
        let mut pad = Joypad::new();
        pad.press(Button::Start);
        pad.write(0x10); // action column (bit 5 low)
        assert_eq!(pad.read() & 0x0F, 0x07);
        pad.write(0x20); // direction column
        assert_eq!(pad.read() & 0x0F, 0x0F);
    }

    #[test]
    fn direction_column_uses_high_nibble_of_mask() {
        let mut pad = Joypad::new();
        pad.press(Button::Down);
        pad.write(0x20);
        assert_eq!(pad.read() & 0x0F, 0x07);
    }

    #[test]
    fn press_edge_fires_once() {
        let mut pad = Joypad::new();
        assert!(pad.press(Button::A));
        assert!(!pad.press(Button::A));
        pad.release(Button::A);
        assert!(pad.press(Button::A));
    }
}
