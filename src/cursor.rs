use crate::geometry::PageGeometry;
use crate::types::Pt;

/// Write position of one layout run. `y` grows downward from the top margin.
#[derive(Debug, Clone)]
pub(crate) struct LayoutCursor {
    y: Pt,
    top: Pt,
    bottom: Pt,
    page_number: usize,
    has_content: bool,
}

impl LayoutCursor {
    pub(crate) fn new(geometry: &PageGeometry) -> Self {
        Self {
            y: geometry.content_top(),
            top: geometry.content_top(),
            bottom: geometry.content_bottom(),
            page_number: 1,
            has_content: false,
        }
    }

    pub(crate) fn y(&self) -> Pt {
        self.y
    }

    pub(crate) fn page_number(&self) -> usize {
        self.page_number
    }

    /// Space left above the bottom margin. Negative once an overfull block was placed.
    pub(crate) fn remaining(&self) -> Pt {
        self.bottom - self.y
    }

    /// An empty page never breaks, so oversized content is still placed and layout advances.
    pub(crate) fn needs_break(&self, required: Pt) -> bool {
        self.has_content && self.remaining() < required
    }

    pub(crate) fn advance(&mut self, dy: Pt) {
        self.y += dy;
        self.has_content = true;
    }

    pub(crate) fn next_page(&mut self) {
        self.page_number += 1;
        self.y = self.top;
        self.has_content = false;
    }
}
