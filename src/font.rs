use crate::types::Pt;

/// Standard Type1 faces the report draws with. No font program is embedded for these.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StandardFont {
    Helvetica,
    HelveticaBold,
    HelveticaOblique,
}

impl StandardFont {
    pub fn base_font_name(&self) -> &'static str {
        match self {
            StandardFont::Helvetica => "Helvetica",
            StandardFont::HelveticaBold => "Helvetica-Bold",
            StandardFont::HelveticaOblique => "Helvetica-Oblique",
        }
    }

    pub fn from_name(raw: &str) -> Option<Self> {
        match raw.trim() {
            "Helvetica" => Some(StandardFont::Helvetica),
            "Helvetica-Bold" => Some(StandardFont::HelveticaBold),
            "Helvetica-Oblique" => Some(StandardFont::HelveticaOblique),
            _ => None,
        }
    }

    fn is_bold(&self) -> bool {
        matches!(self, StandardFont::HelveticaBold)
    }

    fn ascii_widths(&self) -> &'static [u16; 95] {
        if self.is_bold() {
            &HELVETICA_BOLD_WIDTHS
        } else {
            &HELVETICA_WIDTHS
        }
    }

    /// Advance width in 1/1000 em of the glyph actually drawn for `ch` under WinAnsi.
    pub fn char_width(&self, ch: char) -> u16 {
        let Some(code) = winansi_code(ch) else {
            return self.char_width('?');
        };
        match code {
            0x20..=0x7E => self.ascii_widths()[(code - 0x20) as usize],
            0xA0 => 278,
            0x80..=0x9F => special_width(code, self.is_bold()),
            _ => MISSING_WIDTH,
        }
    }
}

const MISSING_WIDTH: u16 = 556;

/// Width of `text` at `size`, measured exactly as the PDF writer will encode it.
pub fn measure_text_width(font: StandardFont, size: Pt, text: &str) -> Pt {
    let units: i64 = text.chars().map(|ch| font.char_width(ch) as i64).sum();
    let units = units.clamp(0, i32::MAX as i64) as i32;
    size.mul_ratio(units, 1000)
}

/// WinAnsiEncoding code for `ch`, or `None` when the encoding cannot represent it.
pub(crate) fn winansi_code(ch: char) -> Option<u8> {
    let code = ch as u32;
    match code {
        0x20..=0x7E | 0xA0..=0xFF => Some(code as u8),
        _ => WINANSI_SPECIALS
            .iter()
            .find(|(c, _)| *c == ch)
            .map(|(_, byte)| *byte),
    }
}

const WINANSI_SPECIALS: [(char, u8); 27] = [
    ('€', 0x80),
    ('‚', 0x82),
    ('ƒ', 0x83),
    ('„', 0x84),
    ('…', 0x85),
    ('†', 0x86),
    ('‡', 0x87),
    ('ˆ', 0x88),
    ('‰', 0x89),
    ('Š', 0x8A),
    ('‹', 0x8B),
    ('Œ', 0x8C),
    ('Ž', 0x8E),
    ('‘', 0x91),
    ('’', 0x92),
    ('“', 0x93),
    ('”', 0x94),
    ('•', 0x95),
    ('–', 0x96),
    ('—', 0x97),
    ('˜', 0x98),
    ('™', 0x99),
    ('š', 0x9A),
    ('›', 0x9B),
    ('œ', 0x9C),
    ('ž', 0x9E),
    ('Ÿ', 0x9F),
];

fn special_width(code: u8, bold: bool) -> u16 {
    match code {
        0x82 | 0x91 | 0x92 => {
            if bold {
                278
            } else {
                222
            }
        }
        0x84 | 0x93 | 0x94 => {
            if bold {
                500
            } else {
                333
            }
        }
        0x9A => {
            if bold {
                556
            } else {
                500
            }
        }
        0x85 | 0x89 | 0x8C | 0x97 | 0x99 => 1000,
        0x88 | 0x8B | 0x98 | 0x9B => 333,
        0x8A | 0x9F => 667,
        0x8E => 611,
        0x95 => 350,
        0x9C => 944,
        0x9E => 500,
        _ => 556,
    }
}

// AFM advance widths for codes 0x20..=0x7E.
#[rustfmt::skip]
const HELVETICA_WIDTHS: [u16; 95] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556,
    278, 278, 584, 584, 584, 556, 1015,
    667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833,
    722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611,
    278, 278, 278, 469, 556, 333,
    556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833,
    556, 556, 556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500,
    334, 260, 334, 584,
];

#[rustfmt::skip]
const HELVETICA_BOLD_WIDTHS: [u16; 95] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278,
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556,
    333, 333, 584, 584, 584, 611, 975,
    722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833,
    722, 778, 667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611,
    333, 278, 333, 584, 556, 333,
    556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889,
    611, 611, 611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500,
    389, 280, 389, 584,
];
