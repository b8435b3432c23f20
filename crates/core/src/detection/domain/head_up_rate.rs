use crate::shared::constants::DEFAULT_HEAD_UP_CLASS_ID;
use crate::shared::detection::Detection;

/// Share of a frame's detections that belong to the head-up class.
///
/// This is a proportion among detections, not among people present:
/// an empty detection set yields 0.0. The result is independent of the
/// order of `detections` and always lies in `[0, 1]`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HeadUpMetric {
    head_up_class_id: u32,
}

impl HeadUpMetric {
    pub fn new(head_up_class_id: u32) -> Self {
        Self { head_up_class_id }
    }

    pub fn head_up_class_id(&self) -> u32 {
        self.head_up_class_id
    }

    pub fn rate(&self, detections: &[Detection]) -> f64 {
        if detections.is_empty() {
            return 0.0;
        }
        let head_up = detections
            .iter()
            .filter(|d| d.class_id == self.head_up_class_id)
            .count();
        head_up as f64 / detections.len() as f64
    }
}

impl Default for HeadUpMetric {
    fn default() -> Self {
        Self::new(DEFAULT_HEAD_UP_CLASS_ID)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::detection::BoundingBox;
    use approx::assert_relative_eq;
    use rstest::rstest;

    fn det(class_id: u32, confidence: f64) -> Detection {
        Detection::new(
            BoundingBox::new(0.0, 0.0, 10.0, 10.0),
            confidence,
            class_id,
            format!("class{class_id}"),
        )
    }

    #[test]
    fn test_empty_is_zero() {
        assert_eq!(HeadUpMetric::default().rate(&[]), 0.0);
    }

    #[test]
    fn test_two_of_three_head_up() {
        let dets = vec![det(0, 0.9), det(0, 0.8), det(1, 0.7)];
        assert_relative_eq!(HeadUpMetric::default().rate(&dets), 2.0 / 3.0);
    }

    #[test]
    fn test_order_independent() {
        let metric = HeadUpMetric::default();
        let a = vec![det(0, 0.9), det(1, 0.8), det(1, 0.7), det(0, 0.6)];
        let mut b = a.clone();
        b.reverse();
        let mut c = a.clone();
        c.rotate_left(1);
        assert_relative_eq!(metric.rate(&a), metric.rate(&b));
        assert_relative_eq!(metric.rate(&a), metric.rate(&c));
    }

    #[rstest]
    #[case::all_up(vec![0, 0, 0], 1.0)]
    #[case::all_down(vec![1, 1], 0.0)]
    #[case::other_classes(vec![2, 3, 0, 1], 0.25)]
    fn test_rate_within_unit_interval(#[case] classes: Vec<u32>, #[case] expected: f64) {
        let dets: Vec<_> = classes.into_iter().map(|c| det(c, 0.5)).collect();
        let rate = HeadUpMetric::default().rate(&dets);
        assert!((0.0..=1.0).contains(&rate));
        assert_relative_eq!(rate, expected);
    }

    #[test]
    fn test_configurable_head_up_class() {
        let dets = vec![det(0, 0.9), det(1, 0.8), det(1, 0.7)];
        assert_relative_eq!(HeadUpMetric::new(1).rate(&dets), 2.0 / 3.0);
    }

    #[test]
    fn test_confidence_does_not_weight_rate() {
        let dets = vec![det(0, 0.01), det(1, 0.99)];
        assert_relative_eq!(HeadUpMetric::default().rate(&dets), 0.5);
    }
}
