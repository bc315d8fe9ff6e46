//! Frame annotation: wall-clock timestamps and motion rectangles.
//!
//! Text is rendered with a built-in 5x7 bitmap font that covers the
//! characters of a `YYYY-MM-DD HH:MM:SS` stamp. The stamp sits at the bottom
//! left corner, white on a 1px black outline so it stays readable on any scene.

use crate::frame::Frame;

pub const BLACK: [u8; 3] = [0, 0, 0];
pub const WHITE: [u8; 3] = [255, 255, 255];
pub const GREEN: [u8; 3] = [0, 255, 0];

const GLYPH_WIDTH: i64 = 5;
const GLYPH_HEIGHT: i64 = 7;
const GLYPH_ADVANCE: i64 = GLYPH_WIDTH + 1;

/// Axis-aligned rectangle in pixel coordinates, `width`/`height` inclusive of
/// the first pixel (a single pixel has width 1).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Current local time formatted the way stamps appear on frames.
pub fn timestamp_text() -> String {
    chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Stamp the current local time onto `frame`.
pub fn stamp_timestamp(frame: &mut Frame) {
    draw_text(frame, &timestamp_text());
}

/// Draw `text` with its baseline 3px above the bottom edge, starting at x = 1.
pub fn draw_text(frame: &mut Frame, text: &str) {
    let origin_x = 1i64;
    let origin_y = frame.height() as i64 - 3 - GLYPH_HEIGHT;

    // Outline pass first, then the glyphs on top.
    for (color, grow) in [(BLACK, 1i64), (WHITE, 0i64)] {
        let mut pen_x = origin_x;
        for ch in text.chars() {
            let rows = glyph(ch);
            for (row, bits) in rows.iter().enumerate() {
                for col in 0..GLYPH_WIDTH {
                    if bits & (0x10 >> col) == 0 {
                        continue;
                    }
                    let px = pen_x + col;
                    let py = origin_y + row as i64;
                    for dy in -grow..=grow {
                        for dx in -grow..=grow {
                            frame.put_pixel(px + dx, py + dy, color);
                        }
                    }
                }
            }
            pen_x += GLYPH_ADVANCE;
        }
    }
}

/// Draw a 1px rectangle outline from `(x, y)` to `(x + width, y + height)`.
pub fn draw_rect(frame: &mut Frame, rect: Rect, color: [u8; 3]) {
    let x0 = rect.x as i64;
    let y0 = rect.y as i64;
    let x1 = x0 + rect.width as i64;
    let y1 = y0 + rect.height as i64;
    for x in x0..=x1 {
        frame.put_pixel(x, y0, color);
        frame.put_pixel(x, y1, color);
    }
    for y in y0..=y1 {
        frame.put_pixel(x0, y, color);
        frame.put_pixel(x1, y, color);
    }
}

fn glyph(ch: char) -> [u8; 7] {
    match ch {
        '0' => [0x0E, 0x11, 0x13, 0x15, 0x19, 0x11, 0x0E],
        '1' => [0x04, 0x0C, 0x04, 0x04, 0x04, 0x04, 0x0E],
        '2' => [0x0E, 0x11, 0x01, 0x02, 0x04, 0x08, 0x1F],
        '3' => [0x1F, 0x02, 0x04, 0x02, 0x01, 0x11, 0x0E],
        '4' => [0x02, 0x06, 0x0A, 0x12, 0x1F, 0x02, 0x02],
        '5' => [0x1F, 0x10, 0x1E, 0x01, 0x01, 0x11, 0x0E],
        '6' => [0x06, 0x08, 0x10, 0x1E, 0x11, 0x11, 0x0E],
        '7' => [0x1F, 0x01, 0x02, 0x04, 0x08, 0x08, 0x08],
        '8' => [0x0E, 0x11, 0x11, 0x0E, 0x11, 0x11, 0x0E],
        '9' => [0x0E, 0x11, 0x11, 0x0F, 0x01, 0x02, 0x0C],
        '-' => [0x00, 0x00, 0x00, 0x1F, 0x00, 0x00, 0x00],
        ':' => [0x00, 0x0C, 0x0C, 0x00, 0x0C, 0x0C, 0x00],
        '.' => [0x00, 0x00, 0x00, 0x00, 0x00, 0x0C, 0x0C],
        _ => [0x00; 7],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pixel(frame: &Frame, x: u32, y: u32) -> [u8; 3] {
        frame.image().get_pixel(x, y).0
    }

    #[test]
    fn timestamp_text_has_fixed_shape() {
        let text = timestamp_text();
        assert_eq!(text.len(), 19);
        assert_eq!(&text[4..5], "-");
        assert_eq!(&text[10..11], " ");
        assert_eq!(&text[13..14], ":");
    }

    #[test]
    fn stamp_touches_only_the_bottom_band() {
        let mut frame = Frame::filled(200, 60, [128, 128, 128]);
        stamp_timestamp(&mut frame);

        for y in 0..(60 - 3 - 7 - 1) {
            for x in 0..200 {
                assert_eq!(pixel(&frame, x, y), [128, 128, 128], "pixel {},{}", x, y);
            }
        }
        let band_has_white = (50..57).any(|y| (0..130).any(|x| pixel(&frame, x, y) == WHITE));
        assert!(band_has_white);
    }

    #[test]
    fn rect_outline_is_hollow() {
        let mut frame = Frame::filled(20, 20, BLACK);
        draw_rect(
            &mut frame,
            Rect {
                x: 2,
                y: 3,
                width: 10,
                height: 5,
            },
            GREEN,
        );
        assert_eq!(pixel(&frame, 2, 3), GREEN);
        assert_eq!(pixel(&frame, 12, 8), GREEN);
        assert_eq!(pixel(&frame, 7, 5), BLACK);
        assert_eq!(pixel(&frame, 13, 8), BLACK);
    }

    #[test]
    fn text_near_edges_is_clipped() {
        let mut frame = Frame::filled(8, 4, BLACK);
        draw_text(&mut frame, "88:88");
    }
}
