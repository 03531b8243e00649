use crate::types::Pt;

#[derive(Debug, Clone, PartialEq)]
pub struct PageMetrics {
    pub page_number: usize,
    pub text_lines: usize,
    pub image_count: usize,
    /// Distance from the top margin to the final write position.
    pub used_height: Pt,
}

impl PageMetrics {
    pub(crate) fn new(page_number: usize) -> Self {
        Self {
            page_number,
            text_lines: 0,
            image_count: 0,
            used_height: Pt::ZERO,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct LayoutMetrics {
    pub pages: Vec<PageMetrics>,
    pub page_breaks: usize,
    pub sections_rendered: usize,
    pub sections_skipped: usize,
    pub images_rendered: usize,
    /// Images the builder rejected under the skip policy.
    pub images_rejected: usize,
}

impl LayoutMetrics {
    pub fn page_count(&self) -> usize {
        self.pages.len()
    }
}
