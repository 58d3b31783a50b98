use serde::{Deserialize, Serialize};

/// Bounding box in normalized frame coordinates.
///
/// Producers do not guarantee the `[0, 1]` range. The planner uses the raw
/// values; renderers call `clamped` first.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 4]", into = "[f32; 4]")]
pub struct BoundingBox {
    pub xmin: f32,
    pub ymin: f32,
    pub xmax: f32,
    pub ymax: f32,
}

impl BoundingBox {
    pub fn new(xmin: f32, ymin: f32, xmax: f32, ymax: f32) -> Self {
        Self {
            xmin,
            ymin,
            xmax,
            ymax,
        }
    }

    /// Area with negative extents counted as zero.
    pub fn area(&self) -> f32 {
        (self.xmax - self.xmin).max(0.0) * (self.ymax - self.ymin).max(0.0)
    }

    pub fn center_x(&self) -> f32 {
        (self.xmin + self.xmax) / 2.0
    }

    pub fn clamped(&self) -> Self {
        Self {
            xmin: self.xmin.clamp(0.0, 1.0),
            ymin: self.ymin.clamp(0.0, 1.0),
            xmax: self.xmax.clamp(0.0, 1.0),
            ymax: self.ymax.clamp(0.0, 1.0),
        }
    }

    /// Pixel rectangle `(x0, y0, x1, y1)` for a frame of the given size.
    pub fn to_pixels(&self, width: u32, height: u32) -> (u32, u32, u32, u32) {
        let b = self.clamped();
        let w = width as f32;
        let h = height as f32;
        (
            (b.xmin * w) as u32,
            (b.ymin * h) as u32,
            (b.xmax * w) as u32,
            (b.ymax * h) as u32,
        )
    }
}

impl From<[f32; 4]> for BoundingBox {
    fn from(v: [f32; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

impl From<BoundingBox> for [f32; 4] {
    fn from(b: BoundingBox) -> Self {
        [b.xmin, b.ymin, b.xmax, b.ymax]
    }
}

/// One recognized object.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox: BoundingBox,
    pub score: f32,
    pub class_name: String,
}

impl Detection {
    pub fn new(bbox: impl Into<BoundingBox>, score: f32, class_name: impl Into<String>) -> Self {
        Self {
            bbox: bbox.into(),
            score,
            class_name: class_name.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn inverted_box_has_zero_area() {
        let b = BoundingBox::new(0.6, 0.2, 0.4, 0.8);
        assert_eq!(b.area(), 0.0);
    }

    #[test]
    fn clamp_keeps_box_inside_frame() {
        let b = BoundingBox::new(-0.05, 0.1, 1.02, 1.2).clamped();
        assert_eq!(b, BoundingBox::new(0.0, 0.1, 1.0, 1.0));
        assert_eq!(
            BoundingBox::new(-0.1, 0.0, 1.1, 0.5).to_pixels(320, 240),
            (0, 0, 320, 120)
        );
    }

    #[test]
    fn deserializes_array_bbox() {
        let det: Detection =
            serde_json::from_str(r#"{"bbox":[0.1,0.4,0.3,0.6],"score":0.8,"class_name":"chair"}"#)
                .expect("parse detection");
        assert_eq!(det.class_name, "chair");
        assert!((det.bbox.center_x() - 0.2).abs() < 1e-6);
    }
}
