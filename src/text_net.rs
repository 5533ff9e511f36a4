use std::path::PathBuf;

use geo::{Coord, MinimumRotatedRect, Scale};
use image::{imageops::FilterType, DynamicImage, GrayImage};
use imageproc::{
    contours::find_contours,
    contrast::{threshold_mut, ThresholdType},
    distance_transform::Norm,
    morphology::dilate_mut,
};
use ndarray::{ArrayView2, Axis};
use ort::{inputs, Session};
use tracing::instrument;

use crate::error::Result;
use crate::session::{build_session, ShapeProfile};
use crate::util::{self, box_score_fast, max_side, normalized_chw, to_geo_poly, to_luma_image, unclip};
use crate::{ExecutionProvider, TextBox};

// ImageNet statistics, the convention DBNet-style detectors are trained with.
const MEAN_VALUES: [f32; 3] = [0.485, 0.456, 0.406];
const NORM_VALUES: [f32; 3] = [1.0 / 0.229, 1.0 / 0.224, 1.0 / 0.225];

const LONG_SIDE_THRESHOLD: f32 = 3.0;
const MAX_CANDIDATES: usize = 1000;

/// Text-span detector: produces candidate text quadrilaterals from a
/// segmentation probability map.
pub struct TextNet {
    session: Session,
}

impl TextNet {
    #[instrument(level = "debug")]
    pub fn init(
        path: PathBuf,
        num_threads: usize,
        max_side_len: u32,
        execution_providers: &[ExecutionProvider],
        cache_path: Option<PathBuf>,
    ) -> Result<Self> {
        let profile = ShapeProfile {
            min: "x:1x3x32x32".into(),
            opt: format!("x:1x3x{max_side_len}x{max_side_len}"),
            max: format!("x:1x3x{max_side_len}x{max_side_len}"),
        };
        let session = build_session(path, num_threads, execution_providers, cache_path, &profile)?;

        log::debug!("text session inputs: {:?}", session.inputs);
        log::debug!("text session outputs: {:?}", session.outputs);

        Ok(Self { session })
    }

    /// Candidate text regions for the image, scaled back to source
    /// coordinates.
    #[instrument(level = "debug", skip(self, image))]
    pub fn find_spans(
        &self,
        image: &DynamicImage,
        scale: util::Scale,
        box_threshold: f32,
        box_score_threshold: f32,
        unclip_ratio: f32,
    ) -> Result<Vec<TextBox>> {
        let image = image.resize_exact(scale.target_width, scale.target_height, FilterType::Nearest);
        let input_values =
            normalized_chw(&image, &MEAN_VALUES, &NORM_VALUES).insert_axis(Axis(0));
        let outputs = self.session.run(inputs!["x" => input_values]?)?;
        let pred_mat = outputs
            .first_key_value()
            .unwrap()
            .1
            .try_extract_tensor::<f32>()?;

        let width = pred_mat.len_of(Axis(3));
        let height = pred_mat.len_of(Axis(2));

        let pred_data = pred_mat
            .to_owned()
            .remove_axis(Axis(0))
            .remove_axis(Axis(0));
        let pred_data = pred_data.to_shape((height, width)).unwrap();

        let mut mask = to_luma_image(pred_data.view());

        let threshold = (box_threshold * 255.0) as u8;
        threshold_mut(&mut mask, threshold, ThresholdType::Binary);
        dilate_mut(&mut mask, Norm::L1, 2);

        Ok(quads_from_mask(
            pred_data.view(),
            mask,
            scale,
            box_score_threshold,
            unclip_ratio,
        ))
    }
}

/// Contours of the binarized map, filtered by probability score, expanded by
/// the unclip offset, and rescaled to source image coordinates.
#[instrument(skip(pred_data, mask), level = "trace")]
fn quads_from_mask(
    pred_data: ArrayView2<f32>,
    mask: GrayImage,
    util::Scale {
        factor_x, factor_y, ..
    }: util::Scale,
    box_score_threshold: f32,
    unclip_ratio: f32,
) -> Vec<TextBox> {
    find_contours::<i32>(&mask)
        .into_iter()
        .take(MAX_CANDIDATES)
        .filter(|contour| contour.points.len() > 2)
        .filter_map(|contour| to_geo_poly(&contour.points).minimum_rotated_rect())
        .filter(|quad| max_side(quad) >= LONG_SIDE_THRESHOLD)
        .filter_map(|quad| {
            let score = box_score_fast(&quad, pred_data.view());
            (score >= box_score_threshold).then_some((quad, score))
        })
        .filter_map(|(quad, score)| Some((unclip(quad, unclip_ratio)?, score)))
        .filter(|(quad, _)| max_side(quad) >= LONG_SIDE_THRESHOLD + 2.0)
        .map(|(quad, score)| TextBox {
            score,
            quad: quad.scale_around_point(factor_x, factor_y, Coord::zero()),
        })
        .collect()
}
