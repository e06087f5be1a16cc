// Numeric kernels shared by the face tracker.

use crate::core::face::{BBox, ImageDimensions};

/// Floor applied to every similarity before taking its logarithm.
pub const LOG_FLOOR: f64 = 1e-10;

/// Floor for normalized areas in the scale log-ratio.
pub const AREA_FLOOR: f64 = 1e-6;

/// Floor for aspect ratios in the aspect log-ratio.
pub const ASPECT_FLOOR: f64 = 0.1;

/// Added to IoU so that non-overlapping boxes still have a defined log.
pub const IOU_OFFSET: f64 = 0.01;

/// Gaussian kernel `exp(-d²/(2σ²))`, a similarity in `(0, 1]`.
pub fn gaussian(d: f64, sigma: f64) -> f64 {
    (-(d * d) / (2.0 * sigma * sigma)).exp()
}

/// `ln(max(x, LOG_FLOOR))`. `NaN` inputs fall to the floor.
pub fn floored_ln(x: f64) -> f64 {
    x.max(LOG_FLOOR).ln()
}

/// Intersection-over-Union of two boxes, `0` when the union is empty.
pub fn iou(a: &BBox, b: &BBox) -> f64 {
    let ix1 = a.x1.max(b.x1);
    let iy1 = a.y1.max(b.y1);
    let ix2 = a.x2.min(b.x2);
    let iy2 = a.y2.min(b.y2);

    let inter = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
    let union = a.area() + b.area() - inter;

    if union > 0.0 { inter / union } else { 0.0 }
}

/// Size-independent description of a face box within its image.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoxFeatures {
    pub center_x: f64,
    pub center_y: f64,
    pub area: f64,
    pub aspect_ratio: f64,
}

impl BoxFeatures {
    pub fn extract(bbox: &BBox, dims: ImageDimensions) -> Self {
        let (w, h) = (dims.safe_width(), dims.safe_height());
        let (cx, cy) = bbox.center();

        Self {
            center_x: cx / w,
            center_y: cy / h,
            area: bbox.area() / (w * h),
            aspect_ratio: bbox.width() / bbox.height().max(1.0),
        }
    }

    pub fn center_distance(&self, other: &Self) -> f64 {
        (self.center_x - other.center_x).hypot(self.center_y - other.center_y)
    }

    pub fn area_log_ratio(&self, other: &Self) -> f64 {
        (self.area.max(AREA_FLOOR) / other.area.max(AREA_FLOOR)).ln().abs()
    }

    pub fn aspect_log_ratio(&self, other: &Self) -> f64 {
        (self.aspect_ratio.max(ASPECT_FLOOR) / other.aspect_ratio.max(ASPECT_FLOOR))
            .ln()
            .abs()
    }
}

/// Ordinal position within a detection list mapped to `[0, 1]`; `0` for a
/// single face.
pub fn rank_ratio(index: usize, count: usize) -> f64 {
    if count > 1 {
        index as f64 / (count - 1) as f64
    } else {
        0.0
    }
}

/// Softmax stabilized by subtracting the largest logit. `NaN` logits count as
/// `-inf`. When the largest logit is infinite the mass is spread evenly over
/// the largest ones, or over all of them if every logit is `-inf`.
pub fn softmax(logits: &[f64]) -> Vec<f64> {
    if logits.is_empty() {
        return Vec::new();
    }

    let logits: Vec<f64> = logits
        .iter()
        .map(|&l| if l.is_nan() { f64::NEG_INFINITY } else { l })
        .collect();
    let max = logits.iter().copied().fold(f64::NEG_INFINITY, f64::max);

    if !max.is_finite() {
        let winners = if max == f64::INFINITY {
            logits.iter().filter(|&&l| l == max).count()
        } else {
            logits.len()
        };
        return logits
            .iter()
            .map(|&l| {
                if max == f64::NEG_INFINITY || l == max {
                    1.0 / winners as f64
                } else {
                    0.0
                }
            })
            .collect();
    }

    let exps: Vec<f64> = logits.iter().map(|l| (l - max).exp()).collect();
    let sum: f64 = exps.iter().sum();

    exps.into_iter().map(|e| e / sum).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-12;

    #[test]
    fn test_gaussian() {
        assert!((gaussian(0.0, 0.4) - 1.0).abs() < EPS);
        assert!((gaussian(0.1, 0.1) - (-0.5f64).exp()).abs() < EPS);
        assert_eq!(gaussian(f64::INFINITY, 0.1), 0.0);
    }

    #[test]
    fn test_floored_ln() {
        assert_eq!(floored_ln(0.0), LOG_FLOOR.ln());
        assert_eq!(floored_ln(f64::NAN), LOG_FLOOR.ln());
        assert!((floored_ln(1.0)).abs() < EPS);
    }

    #[test]
    fn test_iou() {
        let a = BBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BBox::new(5.0, 0.0, 15.0, 10.0);
        let c = BBox::new(20.0, 20.0, 30.0, 30.0);

        assert!((iou(&a, &a) - 1.0).abs() < EPS);
        assert!((iou(&a, &b) - 50.0 / 150.0).abs() < EPS);
        assert_eq!(iou(&a, &c), 0.0);

        let empty = BBox::new(3.0, 3.0, 3.0, 3.0);
        assert_eq!(iou(&empty, &empty), 0.0);
    }

    #[test]
    fn test_extract_features() {
        let f = BoxFeatures::extract(
            &BBox::new(0.0, 0.0, 50.0, 25.0),
            ImageDimensions::new(100.0, 100.0),
        );
        assert!((f.center_x - 0.25).abs() < EPS);
        assert!((f.center_y - 0.125).abs() < EPS);
        assert!((f.area - 0.125).abs() < EPS);
        assert!((f.aspect_ratio - 2.0).abs() < EPS);
    }

    #[test]
    fn test_features_of_degenerate_input_are_finite() {
        let f = BoxFeatures::extract(
            &BBox::new(5.0, 5.0, 5.0, 5.0),
            ImageDimensions::new(0.0, 0.0),
        );
        let g = BoxFeatures::extract(
            &BBox::new(0.0, 0.0, 10.0, 10.0),
            ImageDimensions::new(100.0, 100.0),
        );
        assert!(f.area_log_ratio(&g).is_finite());
        assert!(f.aspect_log_ratio(&g).is_finite());
        assert!(f.center_distance(&g).is_finite());
    }

    #[test]
    fn test_rank_ratio() {
        assert_eq!(rank_ratio(0, 1), 0.0);
        assert_eq!(rank_ratio(0, 0), 0.0);
        assert_eq!(rank_ratio(2, 3), 1.0);
        assert_eq!(rank_ratio(1, 5), 0.25);
    }

    #[test]
    fn test_softmax() {
        assert!(softmax(&[]).is_empty());

        let p = softmax(&[1000.0, 1000.0]);
        assert!((p[0] - 0.5).abs() < EPS);
        assert!((p[1] - 0.5).abs() < EPS);

        let q = softmax(&[0.0, 2.0_f64.ln()]);
        assert!((q[0] - 1.0 / 3.0).abs() < EPS);
        assert!((q[1] - 2.0 / 3.0).abs() < EPS);
    }

    #[test]
    fn test_softmax_non_finite_logits() {
        assert_eq!(softmax(&[f64::NEG_INFINITY, f64::NEG_INFINITY]), vec![0.5, 0.5]);
        assert_eq!(softmax(&[f64::NAN, f64::NAN]), vec![0.5, 0.5]);
        assert_eq!(
            softmax(&[f64::INFINITY, 0.0, f64::INFINITY, f64::NEG_INFINITY]),
            vec![0.5, 0.0, 0.5, 0.0]
        );

        let mixed = softmax(&[f64::NAN, 0.0, f64::NEG_INFINITY]);
        assert_eq!(mixed, vec![0.0, 1.0, 0.0]);
    }
}
