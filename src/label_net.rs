use std::cmp::Reverse;
use std::path::PathBuf;

use float_ord::FloatOrd;
use image::DynamicImage;
use ndarray::{ArrayView2, Axis};
use ort::{inputs, Session};
use tracing::instrument;

use crate::error::Result;
use crate::session::{build_session, ShapeProfile};
use crate::util::{letterbox, normalized_chw, Letterbox};
use crate::{Detection, ExecutionProvider, Rect};

// Detector inputs are plain [0, 1] pixels, no channel normalization.
const MEAN_VALUES: [f32; 3] = [0.0, 0.0, 0.0];
const NORM_VALUES: [f32; 3] = [1.0, 1.0, 1.0];

/// Weight-label detector: a single-class-family YOLO-style model exported to
/// ONNX with a `[1, 4 + classes, anchors]` output.
pub struct LabelNet {
    session: Session,
    input_size: u32,
}

impl LabelNet {
    #[instrument(level = "debug")]
    pub fn init(
        path: PathBuf,
        input_size: u32,
        num_threads: usize,
        execution_providers: &[ExecutionProvider],
        cache_path: Option<PathBuf>,
    ) -> Result<Self> {
        let shape = format!("images:1x3x{input_size}x{input_size}");
        let profile = ShapeProfile {
            min: shape.clone(),
            opt: shape.clone(),
            max: shape,
        };
        let session = build_session(path, num_threads, execution_providers, cache_path, &profile)?;

        log::debug!("label session inputs: {:?}", session.inputs);
        log::debug!("label session outputs: {:?}", session.outputs);

        Ok(Self {
            session,
            input_size,
        })
    }

    /// Boxes for one image, in source image coordinates, confidence-filtered
    /// and class-agnostically deduplicated.
    #[instrument(level = "debug", skip(self, image))]
    pub fn detect_labels(
        &self,
        image: &DynamicImage,
        confidence_threshold: f32,
        iou_threshold: f32,
        max_detections: usize,
    ) -> Result<Vec<Detection>> {
        let (canvas, mapping) = letterbox(image, self.input_size);
        let input_values =
            normalized_chw(&canvas, &MEAN_VALUES, &NORM_VALUES).insert_axis(Axis(0));
        let outputs = self.session.run(inputs!["images" => input_values]?)?;
        let pred = outputs
            .first_key_value()
            .unwrap()
            .1
            .try_extract_tensor::<f32>()?;

        let rows = pred.len_of(Axis(1));
        let anchors = pred.len_of(Axis(2));
        let pred = pred.to_owned().remove_axis(Axis(0));
        let pred = pred.to_shape((rows, anchors)).unwrap();

        let candidates = decode_boxes(
            pred.view(),
            mapping,
            confidence_threshold,
            image.width() as f32,
            image.height() as f32,
        );
        log::debug!("{} anchors above threshold", candidates.len());

        Ok(non_max_suppression(
            candidates,
            iou_threshold,
            max_detections,
        ))
    }
}

/// One candidate box per anchor at or above the confidence threshold, mapped
/// back through the letterbox into source image coordinates and clamped to the
/// image bounds.
fn decode_boxes(
    pred: ArrayView2<f32>,
    mapping: Letterbox,
    confidence_threshold: f32,
    width_bound: f32,
    height_bound: f32,
) -> Vec<Detection> {
    let rows = pred.len_of(Axis(0));
    let anchors = pred.len_of(Axis(1));
    let num_classes = rows.saturating_sub(4);

    let mut candidates = Vec::new();
    for anchor in 0..anchors {
        let Some((class_id, confidence)) = (0..num_classes)
            .map(|class| (class, pred[(4 + class, anchor)]))
            .max_by_key(|(_, score)| FloatOrd(*score))
        else {
            continue;
        };
        if confidence < confidence_threshold {
            continue;
        }
        let (cx, cy) = (pred[(0, anchor)], pred[(1, anchor)]);
        let (w, h) = (pred[(2, anchor)], pred[(3, anchor)]);
        let (x1, y1) = mapping.unmap(cx - w / 2.0, cy - h / 2.0);
        let (x2, y2) = mapping.unmap(cx + w / 2.0, cy + h / 2.0);
        candidates.push(Detection {
            class_id,
            confidence,
            rect: Rect {
                x1: x1.clamp(0.0, width_bound),
                y1: y1.clamp(0.0, height_bound),
                x2: x2.clamp(0.0, width_bound),
                y2: y2.clamp(0.0, height_bound),
            },
        });
    }
    candidates
}

/// Greedy class-agnostic non-max suppression over confidence-sorted boxes.
fn non_max_suppression(
    mut candidates: Vec<Detection>,
    iou_threshold: f32,
    max_detections: usize,
) -> Vec<Detection> {
    candidates.sort_by_key(|detection| Reverse(FloatOrd(detection.confidence)));
    let mut kept: Vec<Detection> = Vec::new();
    for candidate in candidates {
        if kept.len() >= max_detections {
            break;
        }
        if kept
            .iter()
            .all(|previous| previous.rect.iou(&candidate.rect) < iou_threshold)
        {
            kept.push(candidate);
        }
    }
    kept
}

#[cfg(test)]
mod tests {
    use ndarray::Array2;

    use super::*;

    fn detection(confidence: f32, x1: f32, y1: f32, x2: f32, y2: f32) -> Detection {
        Detection {
            class_id: 0,
            confidence,
            rect: Rect { x1, y1, x2, y2 },
        }
    }

    #[test]
    fn nms_suppresses_overlapping_lower_confidence_box() {
        let kept = non_max_suppression(
            vec![
                detection(0.6, 12.0, 12.0, 102.0, 102.0),
                detection(0.9, 10.0, 10.0, 100.0, 100.0),
            ],
            0.3,
            50,
        );
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].confidence, 0.9);
    }

    #[test]
    fn nms_keeps_distant_boxes() {
        let kept = non_max_suppression(
            vec![
                detection(0.9, 10.0, 10.0, 50.0, 50.0),
                detection(0.6, 200.0, 200.0, 250.0, 250.0),
            ],
            0.3,
            50,
        );
        assert_eq!(kept.len(), 2);
        // highest confidence first
        assert_eq!(kept[0].confidence, 0.9);
    }

    #[test]
    fn decode_filters_by_confidence_and_clamps_to_image() {
        // [4 + 2 classes, 3 anchors], identity letterbox
        let pred = Array2::from_shape_vec(
            (6, 3),
            vec![
                50.0, 100.0, 10.0, // cx
                50.0, 100.0, 10.0, // cy
                20.0, 10.0, 40.0, // w
                10.0, 10.0, 40.0, // h
                0.9, 0.1, 0.05, // class 0
                0.1, 0.2, 0.6, // class 1
            ],
        )
        .unwrap();
        let mapping = Letterbox {
            gain: 1.0,
            pad_x: 0.0,
            pad_y: 0.0,
        };

        let decoded = decode_boxes(pred.view(), mapping, 0.25, 200.0, 200.0);
        assert_eq!(decoded.len(), 2);

        assert_eq!(decoded[0].class_id, 0);
        assert_eq!(decoded[0].confidence, 0.9);
        assert_eq!(
            decoded[0].rect,
            Rect {
                x1: 40.0,
                y1: 45.0,
                x2: 60.0,
                y2: 55.0
            }
        );

        // the second kept anchor spills past the top-left corner and clamps
        assert_eq!(decoded[1].class_id, 1);
        assert_eq!(
            decoded[1].rect,
            Rect {
                x1: 0.0,
                y1: 0.0,
                x2: 30.0,
                y2: 30.0
            }
        );
    }

    #[test]
    fn nms_respects_max_detections() {
        let candidates = (0..10)
            .map(|i| {
                let offset = i as f32 * 100.0;
                detection(0.5, offset, 0.0, offset + 50.0, 50.0)
            })
            .collect();
        let kept = non_max_suppression(candidates, 0.3, 3);
        assert_eq!(kept.len(), 3);
    }
}
