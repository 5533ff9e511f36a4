use geo::{LineString, Polygon};
use weightocr::{matching, report, Detection, LabelReading, Rect, TextSpan};

fn span(text: &str, confidence: f32, x1: f32, y1: f32, x2: f32, y2: f32) -> TextSpan {
    TextSpan {
        quad: Polygon::new(
            LineString::from(vec![(x1, y1), (x2, y1), (x2, y2), (x1, y2)]),
            vec![],
        ),
        text: text.to_string(),
        confidence,
    }
}

#[test]
fn association_and_emission_end_to_end() {
    let detection = Detection {
        class_id: 0,
        confidence: 0.91,
        rect: Rect {
            x1: 10.0,
            y1: 10.0,
            x2: 100.0,
            y2: 100.0,
        },
    };
    let spans = vec![
        // qualifying reading in the middle of the box
        span("1500 KG", 0.9, 45.0, 45.0, 55.0, 55.0),
        // single digit inside the box, rejected despite higher confidence
        span("7", 0.95, 48.0, 48.0, 52.0, 52.0),
        // plausible digits but the center is outside the box
        span("2500", 0.99, 150.0, 150.0, 170.0, 160.0),
    ];

    let digits = matching::best_reading(&detection.rect, &spans);
    assert_eq!(digits.as_deref(), Some("1500"));

    let reading = LabelReading { detection, digits };
    let line = report::data_line(&reading);
    assert!(line.starts_with("DATA:0,0.91,10,10,100,100,1500"));

    // the consumer side: strip the marker, split on commas
    let fields: Vec<_> = line.trim_start_matches("DATA:").split(',').collect();
    assert_eq!(fields.len(), 7);
    assert_eq!(fields[6], "1500");
}

#[test]
fn detection_without_reading_emits_short_line() {
    let detection = Detection {
        class_id: 1,
        confidence: 0.4,
        rect: Rect {
            x1: 0.0,
            y1: 0.0,
            x2: 50.0,
            y2: 50.0,
        },
    };
    let digits = matching::best_reading(&detection.rect, &[span("scrap", 0.9, 10.0, 10.0, 30.0, 20.0)]);
    assert_eq!(digits, None);

    let line = report::data_line(&LabelReading { detection, digits });
    let fields: Vec<_> = line.trim_start_matches("DATA:").split(',').collect();
    assert_eq!(fields.len(), 6);
}

#[test]
fn net_weight_helper_reads_labeled_field() {
    assert_eq!(
        matching::extract_net_weight("NET AĞIRLIK: 1250,5 KG"),
        Some(1250.5)
    );
    assert_eq!(matching::extract_net_weight("TARA: 5000 KG"), None);
}

#[test]
#[ignore = "needs ONNX models under tests/data/models"]
fn full_engine_smoke() {
    use weightocr::{ScanOptions, WeightReaderBuilder};

    let _ = env_logger::builder().is_test(true).try_init();

    let image = image::open("tests/data/label_image.png").expect("Failed to load test image");
    let engine = WeightReaderBuilder::new()
        .label_model("tests/data/models/label_det.onnx")
        .text_det_model("tests/data/models/det.onnx")
        .rec_model(
            "tests/data/models/rec.onnx",
            "tests/data/models/latin_dict.txt",
        )
        .max_side_len(2048)
        .build()
        .expect("Failed to build engine");

    let readings = engine
        .read(&image, ScanOptions::default())
        .expect("Failed detection");
    assert!(!readings.is_empty());
    assert!(readings.iter().any(|reading| reading.digits.is_some()));
}
