//! Decides which recognized text belongs to which detected label box and
//! whether the digits inside it are a believable weight.

use std::cmp::Reverse;

use float_ord::FloatOrd;
use regex::Regex;

use crate::{Rect, TextSpan};

pub const MIN_DIGITS: usize = 2;
pub const MAX_DIGITS: usize = 6;
/// Accepted cargo-weight range in kilograms.
pub const MIN_WEIGHT_KG: u32 = 100;
pub const MAX_WEIGHT_KG: u32 = 50_000;

/// Keeps only the ASCII digit characters of `text`.
pub fn digits_of(text: &str) -> String {
    text.chars().filter(char::is_ascii_digit).collect()
}

/// Whether a digit string reads as a plausible tonnage value: 2 to 6 digits,
/// 100 to 50000 kg inclusive. Anything unparseable rejects rather than errors.
pub fn plausible_weight(digits: &str) -> bool {
    if digits.len() < MIN_DIGITS || digits.len() > MAX_DIGITS {
        return false;
    }
    match digits.parse::<u32>() {
        Ok(value) => (MIN_WEIGHT_KG..=MAX_WEIGHT_KG).contains(&value),
        Err(_) => false,
    }
}

/// Digit string of the best span for one detection rectangle.
///
/// A span qualifies when the center of its corner bounding box lies inside
/// `rect` (inclusive) and its digit content passes [`plausible_weight`]. The
/// highest-confidence qualifier wins; equal confidence breaks towards the
/// topmost, then leftmost center, so the result does not depend on the order
/// the recognizer emitted the spans in.
pub fn best_reading(rect: &Rect, spans: &[TextSpan]) -> Option<String> {
    spans
        .iter()
        .filter_map(|span| {
            let (cx, cy) = span.center()?;
            if !rect.contains(cx, cy) {
                log::debug!(
                    "span '{}' center ({cx:.1}, {cy:.1}) outside detection box",
                    span.text
                );
                return None;
            }
            let digits = digits_of(&span.text);
            log::debug!(
                "span '{}' inside box -> digits '{digits}' (confidence {:.2})",
                span.text,
                span.confidence
            );
            plausible_weight(&digits).then_some((span.confidence, cx, cy, digits))
        })
        .max_by_key(|(confidence, cx, cy, _)| {
            (FloatOrd(*confidence), Reverse((FloatOrd(*cy), FloatOrd(*cx))))
        })
        .map(|(_, _, _, digits)| digits)
}

/// Pulls the value out of a labeled `NET AĞIRLIK: <number> KG` field anywhere
/// in `text`, tolerating either a decimal point or a decimal comma. Standalone
/// helper; the detection pipeline does not call it.
pub fn extract_net_weight(text: &str) -> Option<f64> {
    let pattern = Regex::new(r"(?i)NET\s+AĞIRLIK\s*[:=]?\s*(\d+(?:[.,]\d+)?)\s*KG").unwrap();
    let captures = pattern.captures(text)?;
    captures[1].replace(',', ".").parse().ok()
}

#[cfg(test)]
mod tests {
    use geo::{LineString, Polygon};

    use super::*;

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

    const RECT: Rect = Rect {
        x1: 10.0,
        y1: 10.0,
        x2: 100.0,
        y2: 100.0,
    };

    #[test]
    fn digit_count_bounds() {
        assert!(!plausible_weight(""));
        assert!(!plausible_weight("7"));
        assert!(!plausible_weight("1234567"));
        assert!(plausible_weight("1500"));
        assert!(plausible_weight("50000"));
    }

    #[test]
    fn value_bounds() {
        assert!(!plausible_weight("99"));
        assert!(plausible_weight("100"));
        assert!(plausible_weight("50000"));
        assert!(!plausible_weight("50001"));
        assert!(!plausible_weight("999999"));
    }

    #[test]
    fn non_digits_reject() {
        assert_eq!(digits_of("1500 KG"), "1500");
        assert_eq!(digits_of("no digits"), "");
        assert!(!plausible_weight(&digits_of("no digits")));
        assert!(!plausible_weight("12a4"));
    }

    #[test]
    fn selects_span_with_center_inside() {
        let spans = vec![span("1500 KG", 0.9, 45.0, 45.0, 55.0, 55.0)];
        assert_eq!(best_reading(&RECT, &spans), Some("1500".to_string()));
    }

    #[test]
    fn ignores_span_with_center_outside_even_when_overlapping() {
        // overlaps the rectangle but its center (105, 55) is past the right edge
        let spans = vec![span("1500", 0.9, 90.0, 40.0, 120.0, 70.0)];
        assert_eq!(best_reading(&RECT, &spans), None);
    }

    #[test]
    fn higher_confidence_wins() {
        let spans = vec![
            span("1500", 0.6, 20.0, 20.0, 40.0, 30.0),
            span("2500", 0.9, 20.0, 60.0, 40.0, 70.0),
        ];
        assert_eq!(best_reading(&RECT, &spans), Some("2500".to_string()));
    }

    #[test]
    fn implausible_high_confidence_span_loses_to_plausible_one() {
        let spans = vec![
            span("7", 0.95, 45.0, 45.0, 55.0, 55.0),
            span("1500", 0.5, 20.0, 20.0, 40.0, 30.0),
        ];
        assert_eq!(best_reading(&RECT, &spans), Some("1500".to_string()));
    }

    #[test]
    fn single_digit_never_read() {
        let spans = vec![span("7", 0.95, 45.0, 45.0, 55.0, 55.0)];
        assert_eq!(best_reading(&RECT, &spans), None);
    }

    #[test]
    fn equal_confidence_breaks_topmost_then_leftmost() {
        let top = span("1111", 0.8, 40.0, 20.0, 60.0, 30.0);
        let bottom = span("2222", 0.8, 40.0, 60.0, 60.0, 70.0);
        assert_eq!(
            best_reading(&RECT, &[bottom.clone(), top.clone()]),
            Some("1111".to_string())
        );
        assert_eq!(
            best_reading(&RECT, &[top, bottom]),
            Some("1111".to_string())
        );

        let left = span("3333", 0.8, 15.0, 40.0, 35.0, 50.0);
        let right = span("4444", 0.8, 65.0, 40.0, 85.0, 50.0);
        assert_eq!(
            best_reading(&RECT, &[right, left]),
            Some("3333".to_string())
        );
    }

    #[test]
    fn net_weight_extraction() {
        assert_eq!(extract_net_weight("NET AĞIRLIK: 1250,5 KG"), Some(1250.5));
        assert_eq!(extract_net_weight("NET AĞIRLIK = 900.25 KG"), Some(900.25));
        assert_eq!(extract_net_weight("NET AĞIRLIK 1500 kg"), Some(1500.0));
        assert_eq!(extract_net_weight("BRÜT AĞIRLIK: 1250 KG"), None);
        assert_eq!(extract_net_weight("no weight here"), None);
    }
}
