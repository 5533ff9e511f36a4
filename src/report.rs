//! Result emission: the machine-readable `DATA:` lines plus the annotated
//! image and raw-coordinate file side effects.

use std::ffi::OsStr;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect as PixelRect;
use tracing::instrument;

use crate::error::Result;
use crate::LabelReading;

/// Where annotated images and label files land. Downstream consumers read
/// from here by convention; deliberately not configurable.
pub const RESULTS_DIR: &str = "runs/detect/predict";

const BOX_COLOR: Rgb<u8> = Rgb([56, 56, 255]);
const LINE_THICKNESS: i32 = 2;

/// The one machine-readable line per detection:
/// `DATA:<class>,<conf>,<x1>,<y1>,<x2>,<y2>[,<digits>]`.
///
/// The trailing digits field is present only when a validated reading exists;
/// consumers treat a 6-field line as "no reading found". Everything else the
/// binary prints goes to stderr, so this stays parseable.
pub fn data_line(reading: &LabelReading) -> String {
    let detection = &reading.detection;
    let rect = &detection.rect;
    let mut line = format!(
        "DATA:{},{},{},{},{},{}",
        detection.class_id, detection.confidence, rect.x1, rect.y1, rect.x2, rect.y2
    );
    if let Some(digits) = &reading.digits {
        let _ = write!(line, ",{digits}");
    }
    line
}

/// Writes the annotated copy of the input image and the normalized
/// `class cx cy w h` labels file. Returns the annotated image path.
#[instrument(skip(image, readings))]
pub fn save_outputs(
    image: &DynamicImage,
    readings: &[LabelReading],
    source: &Path,
) -> Result<PathBuf> {
    let results = Path::new(RESULTS_DIR);
    let labels_dir = results.join("labels");
    fs::create_dir_all(&labels_dir)?;

    let mut canvas = image.to_rgb8();
    for reading in readings {
        draw_detection(&mut canvas, reading);
    }
    let file_name = source
        .file_name()
        .unwrap_or_else(|| OsStr::new("annotated.png"));
    let image_path = results.join(file_name);
    canvas.save(&image_path)?;

    let stem = source
        .file_stem()
        .and_then(OsStr::to_str)
        .unwrap_or("annotated");
    fs::write(
        labels_dir.join(format!("{stem}.txt")),
        labels_content(image.width(), image.height(), readings),
    )?;

    Ok(image_path)
}

/// One `class cx cy w h` line per detection, coordinates normalized to [0, 1].
fn labels_content(width: u32, height: u32, readings: &[LabelReading]) -> String {
    let (width, height) = (width as f32, height as f32);
    let mut content = String::new();
    for reading in readings {
        let rect = &reading.detection.rect;
        let cx = (rect.x1 + rect.x2) / 2.0 / width;
        let cy = (rect.y1 + rect.y2) / 2.0 / height;
        let w = rect.width() / width;
        let h = rect.height() / height;
        let _ = writeln!(
            content,
            "{} {cx:.6} {cy:.6} {w:.6} {h:.6}",
            reading.detection.class_id
        );
    }
    content
}

/// Hollow rectangle, no class or confidence text on the image.
fn draw_detection(canvas: &mut RgbImage, reading: &LabelReading) {
    let rect = &reading.detection.rect;
    let x = rect.x1.round() as i32;
    let y = rect.y1.round() as i32;
    let width = rect.width().round() as i32;
    let height = rect.height().round() as i32;
    for inset in 0..LINE_THICKNESS {
        let w = width - 2 * inset;
        let h = height - 2 * inset;
        if w < 1 || h < 1 {
            break;
        }
        draw_hollow_rect_mut(
            canvas,
            PixelRect::at(x + inset, y + inset).of_size(w as u32, h as u32),
            BOX_COLOR,
        );
    }
}
