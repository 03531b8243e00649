use crate::error::ExportError;
use crate::types::{Pt, Size};
use serde::{Deserialize, Serialize};

/// What to do when an image's natural size is smaller than its box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalePolicy {
    /// Always scale to the box, even above natural size.
    #[default]
    AllowUpscale,
    /// Never draw an image larger than one point per pixel.
    ClampToNatural,
}

impl ScalePolicy {
    /// Uniformly scales `width_px` x `height_px` to fit `max_width` x `max_height`.
    ///
    /// The limiting side lands exactly on its bound; the other side is rounded to the
    /// nearest milli-point so the result is identical across runs and platforms.
    pub fn fit(&self, width_px: u32, height_px: u32, max_width: Pt, max_height: Pt) -> (Pt, Pt) {
        if width_px == 0 || height_px == 0 {
            return (Pt::ZERO, Pt::ZERO);
        }
        let natural_w = Pt::from_milli_i64(i64::from(width_px) * 1000);
        let natural_h = Pt::from_milli_i64(i64::from(height_px) * 1000);
        if *self == ScalePolicy::ClampToNatural && natural_w <= max_width && natural_h <= max_height
        {
            return (natural_w, natural_h);
        }

        let w = clamp_i32(width_px);
        let h = clamp_i32(height_px);
        // max_width / w <= max_height / h  <=>  max_width * h <= max_height * w
        let width_limited = (max_width.to_milli_i64() as i128) * (h as i128)
            <= (max_height.to_milli_i64() as i128) * (w as i128);
        if width_limited {
            (max_width, max_width.mul_ratio(h, w))
        } else {
            (max_height.mul_ratio(w, h), max_height)
        }
    }
}

fn clamp_i32(value: u32) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

/// Page size, margins, type sizes, spacing and break thresholds for one layout run.
///
/// Thresholds are measured as the remaining space between the write position and the
/// bottom margin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PageGeometry {
    pub page_size: Size,
    pub margin: Pt,
    pub body_size: Pt,
    pub title_size: Pt,
    pub footer_size: Pt,
    pub line_gap: Pt,
    pub heading_gap: Pt,
    pub block_gap: Pt,
    pub image_gap: Pt,
    pub text_threshold: Pt,
    pub image_threshold: Pt,
    pub footer_threshold: Pt,
    pub max_image_height: Pt,
    pub scale_policy: ScalePolicy,
}

impl Default for PageGeometry {
    fn default() -> Self {
        Self {
            page_size: Size::a4(),
            margin: Pt::from_i32(40),
            body_size: Pt::from_i32(11),
            title_size: Pt::from_i32(14),
            footer_size: Pt::from_i32(9),
            line_gap: Pt::from_i32(14),
            heading_gap: Pt::from_i32(24),
            block_gap: Pt::from_i32(6),
            image_gap: Pt::from_i32(12),
            text_threshold: Pt::from_i32(60),
            image_threshold: Pt::from_i32(260),
            footer_threshold: Pt::from_i32(40),
            max_image_height: Pt::from_i32(300),
            scale_policy: ScalePolicy::AllowUpscale,
        }
    }
}

impl PageGeometry {
    pub fn with_margin(mut self, margin: Pt) -> Self {
        self.margin = margin;
        self
    }

    pub fn with_scale_policy(mut self, policy: ScalePolicy) -> Self {
        self.scale_policy = policy;
        self
    }

    pub fn usable_width(&self) -> Pt {
        self.page_size.width - self.margin * 2
    }

    pub fn content_top(&self) -> Pt {
        self.margin
    }

    pub fn content_bottom(&self) -> Pt {
        self.page_size.height - self.margin
    }

    pub fn usable_height(&self) -> Pt {
        self.content_bottom() - self.content_top()
    }

    pub fn validate(&self) -> Result<(), ExportError> {
        let invalid = |msg: &str| Err(ExportError::InvalidConfiguration(msg.to_string()));
        if self.margin < Pt::ZERO {
            return invalid("margin must not be negative");
        }
        if self.usable_width() <= Pt::ZERO || self.usable_height() <= Pt::ZERO {
            return invalid("margins leave no room on the page");
        }
        for (name, value) in [
            ("body size", self.body_size),
            ("title size", self.title_size),
            ("footer size", self.footer_size),
            ("line gap", self.line_gap),
            ("max image height", self.max_image_height),
        ] {
            if value <= Pt::ZERO {
                return Err(ExportError::InvalidConfiguration(format!(
                    "{name} must be positive"
                )));
            }
        }
        for (name, value) in [
            ("heading gap", self.heading_gap),
            ("block gap", self.block_gap),
            ("image gap", self.image_gap),
            ("text threshold", self.text_threshold),
            ("image threshold", self.image_threshold),
            ("footer threshold", self.footer_threshold),
        ] {
            if value < Pt::ZERO {
                return Err(ExportError::InvalidConfiguration(format!(
                    "{name} must not be negative"
                )));
            }
        }
        Ok(())
    }
}
