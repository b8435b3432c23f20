use serde::{Deserialize, Serialize};

/// Axis-aligned box in pixel coordinates, `x1 < x2` and `y1 < y2`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f64,
    pub y1: f64,
    pub x2: f64,
    pub y2: f64,
}

impl BoundingBox {
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f64 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f64 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> f64 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    pub fn as_array(&self) -> [f64; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }

    /// Clamps the box into a `width` x `height` frame.
    pub fn clamped(&self, width: u32, height: u32) -> Self {
        let (w, h) = (width as f64, height as f64);
        Self {
            x1: self.x1.clamp(0.0, w),
            y1: self.y1.clamp(0.0, h),
            x2: self.x2.clamp(0.0, w),
            y2: self.y2.clamp(0.0, h),
        }
    }

    /// True when the box still has positive extent on both axes.
    pub fn is_proper(&self) -> bool {
        self.x1 < self.x2 && self.y1 < self.y2
    }
}

/// One object instance reported by the detector for one frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub confidence: f64,
    pub class_id: u32,
    pub class_label: String,
}

impl Detection {
    pub fn new(bbox: BoundingBox, confidence: f64, class_id: u32, class_label: String) -> Self {
        Self {
            bbox,
            confidence,
            class_id,
            class_label,
        }
    }

    /// Overlay caption, e.g. `head-up: 0.87`.
    pub fn caption(&self) -> String {
        format!("{}: {:.2}", self.class_label, self.confidence)
    }
}
