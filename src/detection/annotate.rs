use crate::models::RawDetection;
use image::{DynamicImage, Rgb, RgbImage};
use imageproc::drawing::draw_hollow_rect_mut;
use imageproc::rect::Rect;

const PALETTE: [Rgb<u8>; 8] = [
    Rgb([230, 25, 75]),
    Rgb([60, 180, 75]),
    Rgb([0, 130, 200]),
    Rgb([245, 130, 48]),
    Rgb([145, 30, 180]),
    Rgb([70, 240, 240]),
    Rgb([240, 50, 230]),
    Rgb([255, 225, 25]),
];

/// Draw every box onto a copy of `image`.
///
/// Boxes above `threshold` are drawn three pixels thick, the rest one pixel.
pub fn render_overlay(image: &DynamicImage, raw: &[RawDetection], threshold: f32) -> RgbImage {
    let mut canvas = image.to_rgb8();
    let (width, height) = canvas.dimensions();

    for detection in raw {
        let Some(rect) = to_rect(detection, width, height) else {
            continue;
        };
        let color = class_color(&detection.class_name);
        let thickness = if detection.confidence > threshold { 3 } else { 1 };

        for t in 0..thickness {
            let w = rect.width().saturating_sub(2 * t as u32);
            let h = rect.height().saturating_sub(2 * t as u32);
            if w == 0 || h == 0 {
                break;
            }
            let inner = Rect::at(rect.left() + t, rect.top() + t).of_size(w, h);
            draw_hollow_rect_mut(&mut canvas, inner, color);
        }
    }

    canvas
}

fn to_rect(detection: &RawDetection, width: u32, height: u32) -> Option<Rect> {
    let b = detection.bbox;
    let left = b.x1.max(0.0).min(width as f32) as i32;
    let top = b.y1.max(0.0).min(height as f32) as i32;
    let right = b.x2.max(0.0).min(width as f32) as i32;
    let bottom = b.y2.max(0.0).min(height as f32) as i32;

    let w = (right - left).max(0) as u32;
    let h = (bottom - top).max(0) as u32;
    (w > 0 && h > 0).then(|| Rect::at(left, top).of_size(w, h))
}

/// Stable colour per class name.
fn class_color(class_name: &str) -> Rgb<u8> {
    let hash = class_name
        .bytes()
        .fold(0x811c_9dc5_u32, |h, b| (h ^ b as u32).wrapping_mul(0x0100_0193));
    PALETTE[(hash as usize) % PALETTE.len()]
}
