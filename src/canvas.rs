use crate::font::StandardFont;
use crate::pdf::ImageData;
use crate::types::{Color, Pt, Rect, Size};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Drawing operations in PDF user space (origin at the bottom-left corner).
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SaveState,
    RestoreState,
    SetFillColor(Color),
    SetStrokeColor(Color),
    SetLineWidth(Pt),
    // Applies both fill and stroke alpha (ca/CA). Values outside 0..1 are clamped.
    SetOpacity(f32),
    SetFont {
        font: StandardFont,
        size: Pt,
    },
    MoveTo {
        x: Pt,
        y: Pt,
    },
    LineTo {
        x: Pt,
        y: Pt,
    },
    Stroke,
    StrokeRect(Rect),
    // Baseline-anchored single line of text in the current font.
    DrawString {
        x: Pt,
        y: Pt,
        text: String,
    },
    // Image scaled to fill the rectangle exactly.
    DrawImage {
        rect: Rect,
        resource_id: String,
    },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Page {
    pub commands: Vec<Command>,
}

impl Page {
    pub fn strings(&self) -> impl Iterator<Item = (Pt, Pt, &str)> {
        self.commands.iter().filter_map(|cmd| match cmd {
            Command::DrawString { x, y, text } => Some((*x, *y, text.as_str())),
            _ => None,
        })
    }

    pub fn images(&self) -> impl Iterator<Item = (&Rect, &str)> {
        self.commands.iter().filter_map(|cmd| match cmd {
            Command::DrawImage { rect, resource_id } => Some((rect, resource_id.as_str())),
            _ => None,
        })
    }

    pub fn is_blank(&self) -> bool {
        self.strings().next().is_none() && self.images().next().is_none()
    }
}

#[derive(Debug, Clone)]
pub struct Document {
    pub page_size: Size,
    pub pages: Vec<Page>,
    pub images: BTreeMap<String, Arc<ImageData>>,
}

impl Document {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}

#[derive(Debug, Clone)]
struct GraphicsState {
    fill_color: Color,
    stroke_color: Color,
    line_width: Pt,
    font: Option<(StandardFont, Pt)>,
}

impl GraphicsState {
    fn initial() -> Self {
        Self {
            fill_color: Color::BLACK,
            stroke_color: Color::BLACK,
            line_width: Pt::from_f32(1.0),
            font: None,
        }
    }
}

/// Records pages of drawing commands. Images are registered once per canvas
/// and shared by every page that draws them.
pub struct Canvas {
    page_size: Size,
    pages: Vec<Page>,
    current: Page,
    state_stack: Vec<GraphicsState>,
    current_state: GraphicsState,
    images: BTreeMap<String, Arc<ImageData>>,
    image_ids_by_digest: BTreeMap<[u8; 32], String>,
}

impl Canvas {
    pub fn new(page_size: Size) -> Self {
        Self {
            page_size,
            pages: Vec::new(),
            current: Page::default(),
            state_stack: Vec::new(),
            current_state: GraphicsState::initial(),
            images: BTreeMap::new(),
            image_ids_by_digest: BTreeMap::new(),
        }
    }

    pub fn page_size(&self) -> Size {
        self.page_size
    }

    /// Number of pages shown so far plus the one being recorded.
    pub fn page_count(&self) -> usize {
        self.pages.len() + 1
    }

    pub fn save_state(&mut self) {
        self.state_stack.push(self.current_state.clone());
        self.current.commands.push(Command::SaveState);
    }

    pub fn restore_state(&mut self) {
        if let Some(state) = self.state_stack.pop() {
            self.current_state = state;
            self.current.commands.push(Command::RestoreState);
        }
    }

    pub fn set_fill_color(&mut self, color: Color) {
        if self.current_state.fill_color == color {
            return;
        }
        self.current_state.fill_color = color;
        self.current.commands.push(Command::SetFillColor(color));
    }

    pub fn set_stroke_color(&mut self, color: Color) {
        if self.current_state.stroke_color == color {
            return;
        }
        self.current_state.stroke_color = color;
        self.current.commands.push(Command::SetStrokeColor(color));
    }

    pub fn set_line_width(&mut self, width: Pt) {
        let width = width.max(Pt::ZERO);
        if self.current_state.line_width == width {
            return;
        }
        self.current_state.line_width = width;
        self.current.commands.push(Command::SetLineWidth(width));
    }

    pub fn set_opacity(&mut self, alpha: f32) {
        let alpha = if alpha.is_nan() {
            1.0
        } else {
            alpha.clamp(0.0, 1.0)
        };
        self.current.commands.push(Command::SetOpacity(alpha));
    }

    pub fn set_font(&mut self, font: StandardFont, size: Pt) {
        if self.current_state.font == Some((font, size)) {
            return;
        }
        self.current_state.font = Some((font, size));
        self.current.commands.push(Command::SetFont { font, size });
    }

    pub fn move_to(&mut self, x: Pt, y: Pt) {
        self.current.commands.push(Command::MoveTo { x, y });
    }

    pub fn line_to(&mut self, x: Pt, y: Pt) {
        self.current.commands.push(Command::LineTo { x, y });
    }

    pub fn stroke(&mut self) {
        self.current.commands.push(Command::Stroke);
    }

    pub fn line(&mut self, x1: Pt, y1: Pt, x2: Pt, y2: Pt) {
        self.move_to(x1, y1);
        self.line_to(x2, y2);
        self.stroke();
    }

    pub fn stroke_rect(&mut self, rect: Rect) {
        self.current.commands.push(Command::StrokeRect(rect));
    }

    pub fn draw_string(&mut self, x: Pt, y: Pt, text: impl Into<String>) {
        let text = text.into();
        if text.is_empty() {
            return;
        }
        self.current.commands.push(Command::DrawString { x, y, text });
    }

    /// Registers image data and returns its resource id. Identical pixel data
    /// registered twice resolves to the same id.
    pub fn register_image(&mut self, image: ImageData) -> String {
        let digest: [u8; 32] = Sha256::digest(image.content_bytes()).into();
        if let Some(id) = self.image_ids_by_digest.get(&digest) {
            return id.clone();
        }
        let id = format!("Im{}", self.images.len() + 1);
        self.images.insert(id.clone(), Arc::new(image));
        self.image_ids_by_digest.insert(digest, id.clone());
        id
    }

    pub fn draw_image(&mut self, rect: Rect, resource_id: impl Into<String>) {
        self.current.commands.push(Command::DrawImage {
            rect,
            resource_id: resource_id.into(),
        });
    }

    pub fn show_page(&mut self) {
        let current = std::mem::take(&mut self.current);
        self.pages.push(current);
        self.state_stack.clear();
        self.current_state = GraphicsState::initial();
    }

    pub fn finish(mut self) -> Document {
        if !self.current.commands.is_empty() || self.pages.is_empty() {
            self.show_page();
        }
        Document {
            page_size: self.page_size,
            pages: self.pages,
            images: self.images,
        }
    }

    /// Like `finish`, but keeps an empty trailing page so page counts stay fixed.
    pub fn finish_pages(mut self, count: usize) -> Document {
        if !self.current.commands.is_empty() {
            self.show_page();
        }
        while self.pages.len() < count {
            self.show_page();
        }
        Document {
            page_size: self.page_size,
            pages: self.pages,
            images: self.images,
        }
    }
}
