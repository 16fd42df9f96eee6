use crate::types::Pt;

/// Base-14 fonts the composer writes. Both are referenced by name and never
/// embedded, so every conforming reader already has their programs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StandardFont {
    Helvetica,
    HelveticaBold,
}

impl StandardFont {
    pub const ALL: [StandardFont; 2] = [StandardFont::Helvetica, StandardFont::HelveticaBold];

    pub fn base_font(&self) -> &'static str {
        self.metrics().base_font
    }

    /// Resource name used in content streams (`/F1 10 Tf`).
    pub fn resource_name(&self) -> &'static str {
        match self {
            StandardFont::Helvetica => "F1",
            StandardFont::HelveticaBold => "F2",
        }
    }

    pub fn metrics(&self) -> &'static FontMetrics {
        match self {
            StandardFont::Helvetica => &HELVETICA,
            StandardFont::HelveticaBold => &HELVETICA_BOLD,
        }
    }
}

/// Anything that can report the advance width of a string at a size.
pub trait MeasureText {
    fn measure(&self, text: &str, size: Pt) -> Pt;
}

impl MeasureText for StandardFont {
    fn measure(&self, text: &str, size: Pt) -> Pt {
        self.metrics().measure_text_width(text, size)
    }
}

impl MeasureText for FontMetrics {
    fn measure(&self, text: &str, size: Pt) -> Pt {
        self.measure_text_width(text, size)
    }
}

#[derive(Debug)]
pub struct FontMetrics {
    pub base_font: &'static str,
    pub first_char: u8,
    // Advance widths in 1/1000 em for WinAnsi codes first_char..=first_char + widths.len() - 1.
    pub widths: &'static [u16],
    pub missing_width: u16,
    pub cap_height: i16,
}

impl FontMetrics {
    /// Width of `ch` as the content stream draws it: characters outside
    /// WinAnsi are written as `?`.
    pub fn char_width(&self, ch: char) -> u16 {
        self.code_width(winansi_code(ch).unwrap_or(b'?'))
    }

    pub fn code_width(&self, code: u8) -> u16 {
        match code
            .checked_sub(self.first_char)
            .and_then(|idx| self.widths.get(idx as usize))
        {
            Some(&width) if width > 0 => width,
            _ => self.missing_width,
        }
    }

    pub fn measure_text_width(&self, text: &str, size: Pt) -> Pt {
        let units: i64 = text.chars().map(|ch| self.char_width(ch) as i64).sum();
        let units = units.clamp(0, i32::MAX as i64) as i32;
        size.mul_ratio(units, 1000)
    }

    pub fn cap_height_at(&self, size: Pt) -> Pt {
        size.mul_ratio(self.cap_height as i32, 1000)
    }
}

// Adobe Core 14 AFM widths for WinAnsi codes 32..=255. Zero marks a code with no glyph.
static HELVETICA_WIDTHS: [u16; 224] = [
    278, 278, 355, 556, 556, 889, 667, 191, 333, 333, 389, 584, 278, 333, 278, 278, // 32..47
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 278, 278, 584, 584, 584, 556, // 48..63
    1015, 667, 667, 722, 722, 667, 611, 778, 722, 278, 500, 667, 556, 833, 722, 778, // 64..79
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 278, 278, 278, 469, 556, // 80..95
    333, 556, 556, 500, 556, 556, 278, 556, 556, 222, 222, 500, 222, 833, 556, 556, // 96..111
    556, 556, 333, 500, 278, 556, 500, 722, 500, 500, 500, 334, 260, 334, 584, 0, // 112..127
    556, 0, 222, 556, 333, 1000, 556, 556, 333, 1000, 667, 333, 1000, 0, 611, 0, // 128..143
    0, 222, 222, 333, 333, 350, 556, 1000, 333, 1000, 500, 333, 944, 0, 500, 667, // 144..159
    278, 333, 556, 556, 556, 556, 260, 556, 333, 737, 370, 556, 584, 333, 737, 333, // 160..175
    400, 584, 333, 333, 333, 556, 537, 278, 333, 333, 365, 556, 834, 834, 834, 611, // 176..191
    667, 667, 667, 667, 667, 667, 1000, 722, 667, 667, 667, 667, 278, 278, 278, 278, // 192..207
    722, 722, 778, 778, 778, 778, 778, 584, 778, 722, 722, 722, 722, 667, 667, 611, // 208..223
    556, 556, 556, 556, 556, 556, 889, 500, 556, 556, 556, 556, 278, 278, 278, 278, // 224..239
    556, 556, 556, 556, 556, 556, 556, 584, 611, 556, 556, 556, 556, 500, 556, 500, // 240..255
];

static HELVETICA_BOLD_WIDTHS: [u16; 224] = [
    278, 333, 474, 556, 556, 889, 722, 238, 333, 333, 389, 584, 278, 333, 278, 278, // 32..47
    556, 556, 556, 556, 556, 556, 556, 556, 556, 556, 333, 333, 584, 584, 584, 611, // 48..63
    975, 722, 722, 722, 722, 667, 611, 778, 722, 278, 556, 722, 611, 833, 722, 778, // 64..79
    667, 778, 722, 667, 611, 722, 667, 944, 667, 667, 611, 333, 278, 333, 584, 556, // 80..95
    333, 556, 611, 556, 611, 556, 333, 611, 611, 278, 278, 556, 278, 889, 611, 611, // 96..111
    611, 611, 389, 556, 333, 611, 556, 778, 556, 556, 500, 389, 280, 389, 584, 0, // 112..127
    556, 0, 278, 556, 500, 1000, 556, 556, 333, 1000, 667, 333, 1000, 0, 611, 0, // 128..143
    0, 278, 278, 500, 500, 350, 556, 1000, 333, 1000, 556, 333, 944, 0, 500, 667, // 144..159
    278, 333, 556, 556, 556, 556, 280, 556, 333, 737, 370, 556, 584, 333, 737, 333, // 160..175
    400, 584, 333, 333, 333, 611, 556, 278, 333, 333, 365, 556, 834, 834, 834, 611, // 176..191
    722, 722, 722, 722, 722, 722, 1000, 722, 667, 667, 667, 667, 278, 278, 278, 278, // 192..207
    722, 722, 778, 778, 778, 778, 778, 584, 778, 722, 722, 722, 722, 667, 667, 611, // 208..223
    556, 556, 556, 556, 556, 556, 889, 556, 556, 556, 556, 556, 278, 278, 278, 278, // 224..239
    611, 611, 611, 611, 611, 611, 611, 584, 611, 611, 611, 611, 611, 556, 611, 556, // 240..255
];

static HELVETICA: FontMetrics = FontMetrics {
    base_font: "Helvetica",
    first_char: 32,
    widths: &HELVETICA_WIDTHS,
    missing_width: 556,
    cap_height: 718,
};

static HELVETICA_BOLD: FontMetrics = FontMetrics {
    base_font: "Helvetica-Bold",
    first_char: 32,
    widths: &HELVETICA_BOLD_WIDTHS,
    missing_width: 556,
    cap_height: 718,
};

/// WinAnsi (cp1252) code for `ch`, or `None` when the encoding has no slot for it.
pub(crate) fn winansi_code(ch: char) -> Option<u8> {
    let code = match ch {
        '\u{0000}'..='\u{007F}' | '\u{00A0}'..='\u{00FF}' => ch as u8,
        '\u{20AC}' => 0x80,
        '\u{201A}' => 0x82,
        '\u{0192}' => 0x83,
        '\u{201E}' => 0x84,
        '\u{2026}' => 0x85,
        '\u{2020}' => 0x86,
        '\u{2021}' => 0x87,
        '\u{02C6}' => 0x88,
        '\u{2030}' => 0x89,
        '\u{0160}' => 0x8A,
        '\u{2039}' => 0x8B,
        '\u{0152}' => 0x8C,
        '\u{017D}' => 0x8E,
        '\u{2018}' => 0x91,
        '\u{2019}' => 0x92,
        '\u{201C}' => 0x93,
        '\u{201D}' => 0x94,
        '\u{2022}' => 0x95,
        '\u{2013}' => 0x96,
        '\u{2014}' => 0x97,
        '\u{02DC}' => 0x98,
        '\u{2122}' => 0x99,
        '\u{0161}' => 0x9A,
        '\u{203A}' => 0x9B,
        '\u{0153}' => 0x9C,
        '\u{017E}' => 0x9E,
        '\u{0178}' => 0x9F,
        _ => return None,
    };
    Some(code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn measures_ascii_with_afm_widths() {
        let font = StandardFont::Helvetica;
        // H=722 e=556 l=222 l=222 o=556 -> 2278 units
        let width = font.measure("Hello", Pt::from_i32(10));
        assert_eq!(width.to_milli_i64(), 22_780);
        assert_eq!(font.measure("", Pt::from_i32(10)), Pt::ZERO);
    }

    #[test]
    fn bold_is_wider_than_regular() {
        let size = Pt::from_i32(12);
        let text = "Patient Intake Summary";
        assert!(
            StandardFont::HelveticaBold.measure(text, size) > StandardFont::Helvetica.measure(text, size)
        );
    }

    #[test]
    fn unmapped_characters_measure_as_drawn() {
        let metrics = StandardFont::Helvetica.metrics();
        assert_eq!(metrics.char_width('\u{4e2d}'), metrics.char_width('?'));
        assert_eq!(metrics.char_width('\t'), 556);
        assert_eq!(metrics.char_width(' '), 278);
        assert_eq!(metrics.char_width('~'), 584);
        assert_eq!(metrics.code_width(0x81), 556);
    }

    #[test]
    fn latin1_letters_use_their_base_glyph_widths() {
        let size = Pt::from_i32(10);
        for font in StandardFont::ALL {
            assert_eq!(font.measure("\u{00d6}", size), font.measure("O", size));
            assert_eq!(font.measure("\u{00d1}\u{00d6}\u{00c9}", size), font.measure("NOE", size));
            assert_eq!(font.measure("\u{00c7}", size), font.measure("C", size));
        }
        let metrics = StandardFont::Helvetica.metrics();
        assert_eq!(metrics.char_width('\u{00e9}'), 556);
        assert_eq!(metrics.char_width('\u{00c6}'), 1000);
        assert_eq!(metrics.char_width('\u{2014}'), 1000);
        assert_eq!(metrics.char_width('\u{2019}'), 222);
        assert_eq!(StandardFont::HelveticaBold.metrics().char_width('\u{00f1}'), 611);
    }

    #[test]
    fn winansi_codes_cover_latin1_and_cp1252() {
        assert_eq!(winansi_code('A'), Some(0x41));
        assert_eq!(winansi_code('\u{00e9}'), Some(0xE9));
        assert_eq!(winansi_code('\u{20AC}'), Some(0x80));
        assert_eq!(winansi_code('\u{0085}'), None);
        assert_eq!(winansi_code('\u{4e2d}'), None);
    }

    #[test]
    fn resource_names_are_distinct() {
        assert_ne!(
            StandardFont::Helvetica.resource_name(),
            StandardFont::HelveticaBold.resource_name()
        );
        assert_eq!(StandardFont::HelveticaBold.base_font(), "Helvetica-Bold");
        assert_eq!(
            StandardFont::Helvetica
                .metrics()
                .cap_height_at(Pt::from_i32(10))
                .to_milli_i64(),
            7_180
        );
    }
}
