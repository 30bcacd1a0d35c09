use std::fmt;

const NOTES: &'static [&'static str] = &[
    "C ", "C#", "D ", "D#", "E ", "F ", "F#", "G ", "G#", "A ", "A#", "B "
];

/// A 4-byte macro or pattern instruction. Byte 0 is the most significant
/// byte of the big-endian word; `w1` is the low 16-bit half.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Word(pub u32);

impl Word {
    pub fn new(b0: u8, b1: u8, b2: u8, b3: u8) -> Self {
        Word(((b0 as u32) << 24) | ((b1 as u32) << 16) | ((b2 as u32) << 8) | b3 as u32)
    }

    pub fn b0(&self) -> u8 { (self.0 >> 24) as u8 }
    pub fn b1(&self) -> u8 { (self.0 >> 16) as u8 }
    pub fn b2(&self) -> u8 { (self.0 >> 8) as u8 }
    pub fn b3(&self) -> u8 { self.0 as u8 }
    pub fn w1(&self) -> u16 { self.0 as u16 }

    pub fn set_b0(&mut self, v: u8) {
        self.0 = (self.0 & 0x00ffffff) | ((v as u32) << 24);
    }

    pub fn set_b2(&mut self, v: u8) {
        self.0 = (self.0 & 0xffff00ff) | ((v as u32) << 8);
    }

    pub fn set_b3(&mut self, v: u8) {
        self.0 = (self.0 & 0xffffff00) | v as u32;
    }
}

/// Pattern stream view of an instruction, used for disassembly.
pub struct PatternEvent(pub Word);

impl fmt::Display for PatternEvent {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let w = self.0;
        let t = w.b0();

        if t < 0xf0 {
            let note = t & 0x3f;
            let kind = match t & 0xc0 {
                0x80 => "wait",
                0xc0 => "port",
                _    => "note",
            };
            return write!(f, "{}{} {} {:02x} {:02x} {:02x}", NOTES[note as usize % 12], note / 12,
                          kind, w.b1(), w.b2(), w.b3())
        }

        let name = match t & 0x0f {
            0x0 => "End ",
            0x1 => "Loop",
            0x2 => "Cont",
            0x3 => "Wait",
            0x4 => "Stop",
            0x5 => "Kup^",
            0x6 => "Vibr",
            0x7 => "Enve",
            0x8 => "GsPt",
            0x9 => "RoPt",
            0xa => "Fade",
            0xb => "PPat",
            0xc => "Lock",
            0xd => "Cue ",
            0xe => "StCu",
            _   => "NOP ",
        };
        write!(f, "{} {:02x} {:04x}", name, w.b1(), w.w1())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_word_fields() {
        let mut w = Word(0x1c2b0a34);
        assert_eq!(w.b0(), 0x1c);
        assert_eq!(w.b1(), 0x2b);
        assert_eq!(w.b2(), 0x0a);
        assert_eq!(w.b3(), 0x34);
        assert_eq!(w.w1(), 0x0a34);

        w.set_b0(0);
        assert_eq!(w.0, 0x002b0a34);
        w.set_b2(0xf3);
        assert_eq!(w.0, 0x002bf334);
        w.set_b3(0);
        assert_eq!(w, Word::new(0x00, 0x2b, 0xf3, 0x00));
    }

    #[test]
    fn test_pattern_event_display() {
        assert_eq!(format!("{}", PatternEvent(Word::new(0x9e, 0x01, 0x02, 0x05))), "F#2 wait 01 02 05");
        assert_eq!(format!("{}", PatternEvent(Word::new(0xf3, 0x07, 0x00, 0x00))), "Wait 07 0000");
        assert_eq!(format!("{}", PatternEvent(Word::new(0xf0, 0x00, 0x00, 0x00))), "End  00 0000");
    }
}
