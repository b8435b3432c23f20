//! Box arithmetic shared by the YOLO decoders.

fn area(b: &[f64; 4]) -> f64 {
    (b[2] - b[0]).max(0.0) * (b[3] - b[1]).max(0.0)
}

/// Intersection over union of two `[x1, y1, x2, y2]` boxes; 0 when disjoint.
pub fn bbox_iou(a: &[f64; 4], b: &[f64; 4]) -> f64 {
    let overlap = [a[0].max(b[0]), a[1].max(b[1]), a[2].min(b[2]), a[3].min(b[3])];
    let inter = area(&overlap);
    if inter <= 0.0 {
        return 0.0;
    }
    inter / (area(a) + area(b) - inter)
}

/// Converts a centre/size box to corner form.
pub fn cxcywh_to_xyxy(cx: f64, cy: f64, w: f64, h: f64) -> [f64; 4] {
    [cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0]
}

/// Index and value of the largest element, `None` for an empty slice.
pub fn argmax(values: impl Iterator<Item = f64>) -> Option<(usize, f64)> {
    values.enumerate().fold(None, |best, (i, v)| match best {
        Some((_, bv)) if bv >= v => best,
        _ => Some((i, v)),
    })
}
