use geo::{BoundingRect, Polygon};

/// Axis-aligned rectangle in source image pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl Rect {
    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> f32 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    /// Containment is inclusive on both axes.
    pub fn contains(&self, x: f32, y: f32) -> bool {
        self.x1 <= x && x <= self.x2 && self.y1 <= y && y <= self.y2
    }

    pub fn iou(&self, other: &Rect) -> f32 {
        let ix = (self.x2.min(other.x2) - self.x1.max(other.x1)).max(0.0);
        let iy = (self.y2.min(other.y2) - self.y1.max(other.y1)).max(0.0);
        let intersection = ix * iy;
        let union = self.area() + other.area() - intersection;
        if union <= 0.0 {
            0.0
        } else {
            intersection / union
        }
    }
}

/// One box from the label detector.
#[derive(Debug, Clone, Copy)]
pub struct Detection {
    pub class_id: usize,
    pub confidence: f32,
    pub rect: Rect,
}

/// One recognized piece of text with its quadrilateral from the text detector.
#[derive(Debug, Clone)]
pub struct TextSpan {
    pub quad: Polygon<f32>,
    pub text: String,
    pub confidence: f32,
}

impl TextSpan {
    /// Center of the axis-aligned bounding box of the quadrilateral corners.
    /// `None` for a degenerate (empty) quad.
    pub fn center(&self) -> Option<(f32, f32)> {
        let bounds = self.quad.bounding_rect()?;
        let center = bounds.center();
        Some((center.x, center.y))
    }
}

/// Final per-detection outcome: the box and, when a span inside it survived
/// validation, the digit string read from it.
#[derive(Debug, Clone)]
pub struct LabelReading {
    pub detection: Detection,
    pub digits: Option<String>,
}

/// Candidate text region before recognition.
#[derive(Debug, Clone)]
pub struct TextBox {
    pub score: f32,
    pub quad: Polygon<f32>,
}

/// Raw recognizer output for one cropped region. A failed crop decodes to the
/// default (empty) line.
#[derive(Debug, Clone, Default)]
pub struct TextLine {
    pub text: String,
    pub character_scores: Vec<f32>,
}

impl TextLine {
    /// Mean per-character score, used as the span confidence.
    pub fn mean_score(&self) -> f32 {
        if self.character_scores.is_empty() {
            0.0
        } else {
            self.character_scores.iter().sum::<f32>() / self.character_scores.len() as f32
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn containment_is_inclusive() {
        let rect = Rect {
            x1: 10.0,
            y1: 10.0,
            x2: 100.0,
            y2: 100.0,
        };
        assert!(rect.contains(10.0, 10.0));
        assert!(rect.contains(100.0, 100.0));
        assert!(rect.contains(50.0, 50.0));
        assert!(!rect.contains(9.9, 50.0));
        assert!(!rect.contains(50.0, 100.1));
    }

    #[test]
    fn iou_of_identical_and_disjoint_rects() {
        let a = Rect {
            x1: 0.0,
            y1: 0.0,
            x2: 10.0,
            y2: 10.0,
        };
        let b = Rect {
            x1: 20.0,
            y1: 20.0,
            x2: 30.0,
            y2: 30.0,
        };
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
        assert_eq!(a.iou(&b), 0.0);
    }

    #[test]
    fn iou_of_half_overlap() {
        let a = Rect {
            x1: 0.0,
            y1: 0.0,
            x2: 10.0,
            y2: 10.0,
        };
        let b = Rect {
            x1: 5.0,
            y1: 0.0,
            x2: 15.0,
            y2: 10.0,
        };
        // 50 overlap / 150 union
        assert!((a.iou(&b) - 1.0 / 3.0).abs() < 1e-6);
    }

    #[test]
    fn mean_score_of_empty_line_is_zero() {
        assert_eq!(TextLine::default().mean_score(), 0.0);
        let line = TextLine {
            text: "12".into(),
            character_scores: vec![0.8, 0.6],
        };
        assert!((line.mean_score() - 0.7).abs() < 1e-6);
    }
}
