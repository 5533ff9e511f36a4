use geo::{
    point, Area, BoundingRect, Contains, Coord, EuclideanLength, HasDimensions, LineString,
    MinimumRotatedRect, Polygon,
};
use geo_clipper::{Clipper, EndType, JoinType};
use image::{imageops, imageops::FilterType, DynamicImage, GrayImage, ImageBuffer, Rgb, RgbImage};
use imageproc::point::Point;
use ndarray::{s, Array3, ArrayView2, Axis};
use tracing::instrument;

/// Pad color of the letterboxed detector input.
const PAD_VALUE: u8 = 114;

/// Image as a CHW float tensor with per-channel normalization applied as
/// `pixel * norm - mean * norm` over the [0, 1] pixel range.
#[instrument(level = "debug", skip(image))]
pub(crate) fn normalized_chw(
    image: &DynamicImage,
    mean_vals: &[f32; 3],
    norm_vals: &[f32; 3],
) -> Array3<f32> {
    let image = image.to_rgb32f();
    Array3::from_shape_fn(
        (3, image.height() as usize, image.width() as usize),
        |(ch, y, x)| {
            let pixel = image.get_pixel(x as u32, y as u32).0[ch];
            pixel * norm_vals[ch] - mean_vals[ch] * norm_vals[ch]
        },
    )
}

pub(crate) fn to_luma_image(data: ArrayView2<f32>) -> GrayImage {
    let height = data.len_of(Axis(0));
    let width = data.len_of(Axis(1));
    let pixel_data = data
        .axis_iter(Axis(0))
        .flat_map(|row| row.into_iter())
        .map(|p| (p * 255.0) as u8)
        .collect::<Vec<u8>>();
    ImageBuffer::from_raw(width as u32, height as u32, pixel_data).unwrap()
}

pub(crate) fn to_geo_poly(points: &[Point<i32>]) -> Polygon<f32> {
    let points = points
        .iter()
        .map(|point| Coord {
            x: point.x as f32,
            y: point.y as f32,
        })
        .collect();
    Polygon::new(LineString::new(points), vec![])
}

pub(crate) fn max_side(quad: &Polygon<f32>) -> f32 {
    quad.exterior()
        .lines()
        .map(|line| line.euclidean_length() as i32)
        .max()
        .unwrap() as f32
}

/// Mean of the probability map under `quad`. Bounds are clamped so a contour
/// touching the map edge cannot slice out of range.
pub(crate) fn box_score_fast(quad: &Polygon<f32>, pred_data: ArrayView2<f32>) -> f32 {
    let Some(bounds) = quad.bounding_rect() else {
        return 0.0;
    };
    let height = pred_data.len_of(Axis(0));
    let width = pred_data.len_of(Axis(1));
    let min_x = (bounds.min().x.max(0.0) as usize).min(width);
    let min_y = (bounds.min().y.max(0.0) as usize).min(height);
    let max_x = (bounds.max().x.ceil() as usize).clamp(min_x, width);
    let max_y = (bounds.max().y.ceil() as usize).clamp(min_y, height);

    let sliced = pred_data.slice(s![min_y..max_y, min_x..max_x]);

    let contained_values = sliced
        .indexed_iter()
        .filter(|((y, x), _)| {
            quad.contains(&point![x: (min_x + *x) as f32, y: (min_y + *y) as f32])
        })
        .map(|(_, value)| *value)
        .collect::<Vec<_>>();

    if contained_values.is_empty() {
        return 0.0;
    }
    let len = contained_values.len() as f32;
    contained_values.into_iter().sum::<f32>() / len
}

pub(crate) fn unclip(quad: Polygon<f32>, unclip_ratio: f32) -> Option<Polygon<f32>> {
    let distance = (quad.unsigned_area() * 0.5 * unclip_ratio) / quad.exterior().euclidean_length();

    let expanded = quad.offset(distance, JoinType::Round(0.25), EndType::ClosedPolygon, 1.0);

    if expanded.is_empty() {
        None
    } else {
        expanded.minimum_rotated_rect()
    }
}

/// Text-detector input scaling: the long side capped at `target_size` and both
/// dimensions floored to a multiple of 32.
#[derive(Debug, Clone, Copy)]
pub struct Scale {
    pub factor_x: f32,
    pub factor_y: f32,
    pub target_width: u32,
    pub target_height: u32,
}

pub fn scale_normalized(image: &DynamicImage, target_size: u32) -> Scale {
    let aspect_ratio = image.width() as f32 / image.height() as f32;
    let (mut target_width, mut target_height) = if aspect_ratio >= 1.0 {
        let width = image.width().min(target_size);
        let height = (width as f32 / aspect_ratio) as u32;
        (width, height)
    } else {
        let height = image.height().min(target_size);
        let width = (height as f32 * aspect_ratio) as u32;
        (width, height)
    };
    if target_width % 32 != 0 {
        target_width = (target_width / 32 * 32).max(32);
    }
    if target_height % 32 != 0 {
        target_height = (target_height / 32 * 32).max(32);
    }
    let factor_x = image.width() as f32 / target_width as f32;
    let factor_y = image.height() as f32 / target_height as f32;
    log::debug!(
        "text detector input (w: {}, h: {}) -> (w: {target_width}, h: {target_height}), factors ({factor_x}, {factor_y})",
        image.width(),
        image.height()
    );
    Scale {
        factor_x,
        factor_y,
        target_width,
        target_height,
    }
}

/// Aspect-preserving resize onto a square gray canvas, plus the mapping needed
/// to take model coordinates back to source image coordinates.
#[derive(Debug, Clone, Copy)]
pub struct Letterbox {
    pub gain: f32,
    pub pad_x: f32,
    pub pad_y: f32,
}

impl Letterbox {
    /// Model input coordinates -> source image coordinates.
    pub fn unmap(&self, x: f32, y: f32) -> (f32, f32) {
        ((x - self.pad_x) / self.gain, (y - self.pad_y) / self.gain)
    }
}

pub(crate) fn letterbox(image: &DynamicImage, size: u32) -> (DynamicImage, Letterbox) {
    let gain = (size as f32 / image.width() as f32).min(size as f32 / image.height() as f32);
    let scaled_width = ((image.width() as f32 * gain).round() as u32).clamp(1, size);
    let scaled_height = ((image.height() as f32 * gain).round() as u32).clamp(1, size);
    let resized = image
        .resize_exact(scaled_width, scaled_height, FilterType::Triangle)
        .to_rgb8();

    let pad_x = (size - scaled_width) / 2;
    let pad_y = (size - scaled_height) / 2;
    let mut canvas = RgbImage::from_pixel(size, size, Rgb([PAD_VALUE, PAD_VALUE, PAD_VALUE]));
    imageops::replace(&mut canvas, &resized, pad_x as i64, pad_y as i64);

    (
        DynamicImage::ImageRgb8(canvas),
        Letterbox {
            gain,
            pad_x: pad_x as f32,
            pad_y: pad_y as f32,
        },
    )
}

/// Cropped axis-aligned region under a text quadrilateral. `None` when the
/// quad degenerates to an empty region after clamping to the image.
pub(crate) fn crop_region(image: &DynamicImage, quad: &Polygon<f32>) -> Option<DynamicImage> {
    let bounds = quad.bounding_rect()?;
    let x = (bounds.min().x.max(0.0) as u32).min(image.width());
    let y = (bounds.min().y.max(0.0) as u32).min(image.height());
    let width = (bounds.width() as u32).min(image.width() - x);
    let height = (bounds.height() as u32).min(image.height() - y);
    if width == 0 || height == 0 {
        return None;
    }
    log::trace!("cropping text region at ({x}, {y}) size {width}x{height}");
    Some(image.crop_imm(x, y, width, height))
}
