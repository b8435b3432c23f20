//! Pre- and post-processing shared by both YOLO generations.
//!
//! Preprocessing letterboxes the frame into the square model input;
//! post-processing decodes the raw output tensor into candidates in frame
//! pixel space and applies class-aware NMS.

use ndarray::Array4;

use crate::detection::domain::object_detector::DetectorGeneration;
use crate::shared::detection::BoundingBox;
use crate::shared::frame::Frame;

use super::math::{argmax, bbox_iou, cxcywh_to_xyxy};

/// Gray used by Ultralytics for letterbox padding.
const PAD_VALUE: f32 = 114.0 / 255.0;

/// Mapping between frame pixels and letterboxed model input.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Letterbox {
    pub scale: f64,
    pub pad_x: u32,
    pub pad_y: u32,
}

impl Letterbox {
    /// Maps a point from model input space back to frame space.
    pub fn unmap(&self, x: f64, y: f64) -> (f64, f64) {
        (
            (x - self.pad_x as f64) / self.scale,
            (y - self.pad_y as f64) / self.scale,
        )
    }
}

/// Letterbox-resize a frame to `target_size` x `target_size`, NCHW float32.
pub fn letterbox(frame: &Frame, target_size: u32) -> (Array4<f32>, Letterbox) {
    let fw = frame.width() as f64;
    let fh = frame.height() as f64;
    let target = target_size as f64;

    let scale = (target / fw).min(target / fh);
    let new_w = ((fw * scale).round() as u32).min(target_size);
    let new_h = ((fh * scale).round() as u32).min(target_size);
    let pad_x = (target_size - new_w) / 2;
    let pad_y = (target_size - new_h) / 2;

    let mut tensor = Array4::<f32>::from_elem(
        (1, 3, target_size as usize, target_size as usize),
        PAD_VALUE,
    );

    let src = frame.as_ndarray();
    let src_h = frame.height() as usize;
    let src_w = frame.width() as usize;

    // Nearest-neighbour resize into the padded region
    for y in 0..new_h as usize {
        let src_y = ((y as f64 / scale) as usize).min(src_h - 1);
        for x in 0..new_w as usize {
            let src_x = ((x as f64 / scale) as usize).min(src_w - 1);
            let ty = pad_y as usize + y;
            let tx = pad_x as usize + x;
            for c in 0..3 {
                tensor[[0, c, ty, tx]] = src[[src_y, src_x, c]] as f32 / 255.0;
            }
        }
    }

    (
        tensor,
        Letterbox {
            scale,
            pad_x,
            pad_y,
        },
    )
}

/// One decoded box before labels are attached.
#[derive(Clone, Debug, PartialEq)]
pub struct Candidate {
    pub bbox: [f64; 4],
    pub confidence: f64,
    pub class_id: u32,
}

/// How to read one output tensor.
#[derive(Clone, Copy, Debug)]
pub struct DecodeParams {
    pub generation: DetectorGeneration,
    pub confidence_threshold: f64,
    pub letterbox: Letterbox,
    pub frame_width: u32,
    pub frame_height: u32,
}

/// Decodes a raw YOLO output (`[1, rows, feats]`, `[1, feats, rows]` or the
/// same without the batch axis) into candidates above the threshold.
pub fn decode(data: &[f32], shape: &[usize], params: &DecodeParams) -> Result<Vec<Candidate>, String> {
    let (a, b) = match *shape {
        [1, a, b] | [a, b] => (a, b),
        _ => return Err(format!("unexpected YOLO output shape {shape:?}")),
    };

    let box_fields = params.generation.box_fields();
    // Candidates outnumber features in every YOLO export
    let transposed = a < b;
    let (num_rows, num_feats) = if transposed { (b, a) } else { (a, b) };
    if num_feats <= box_fields {
        return Err(format!(
            "{} output needs more than {box_fields} values per row, got {num_feats}",
            params.generation
        ));
    }
    if data.len() < num_rows * num_feats {
        return Err(format!(
            "output buffer holds {} values, shape {shape:?} needs {}",
            data.len(),
            num_rows * num_feats
        ));
    }

    let feat = |row: usize, f: usize| -> f64 {
        let idx = if transposed {
            f * num_rows + row
        } else {
            row * num_feats + f
        };
        data[idx] as f64
    };

    let mut candidates = Vec::new();
    for row in 0..num_rows {
        let scores = (box_fields..num_feats).map(|f| feat(row, f));
        let Some((class_idx, class_score)) = argmax(scores) else {
            continue;
        };
        let confidence = match params.generation {
            DetectorGeneration::YoloV5 => feat(row, 4) * class_score,
            DetectorGeneration::YoloV8 => class_score,
        };
        if confidence < params.confidence_threshold {
            continue;
        }

        let [x1, y1, x2, y2] =
            cxcywh_to_xyxy(feat(row, 0), feat(row, 1), feat(row, 2), feat(row, 3));
        let (x1, y1) = params.letterbox.unmap(x1, y1);
        let (x2, y2) = params.letterbox.unmap(x2, y2);
        let bbox = BoundingBox::new(x1, y1, x2, y2)
            .clamped(params.frame_width, params.frame_height);
        if !bbox.is_proper() {
            continue;
        }

        candidates.push(Candidate {
            bbox: bbox.as_array(),
            confidence: confidence.clamp(0.0, 1.0),
            class_id: class_idx as u32,
        });
    }
    Ok(candidates)
}

/// Greedy class-aware NMS: boxes only suppress boxes of the same class.
///
/// Output is ordered by descending confidence.
pub fn nms(mut candidates: Vec<Candidate>, iou_threshold: f64) -> Vec<Candidate> {
    candidates.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep: Vec<Candidate> = Vec::with_capacity(candidates.len());
    for c in candidates {
        let suppressed = keep
            .iter()
            .any(|k| k.class_id == c.class_id && bbox_iou(&k.bbox, &c.bbox) > iou_threshold);
        if !suppressed {
            keep.push(c);
        }
    }
    keep
}
