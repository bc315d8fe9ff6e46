//! External contours of a binary mask.
//!
//! Foreground pixels are 8-connected. Holes are filled before tracing, so a
//! blob nested inside another blob's hole is part of the outer contour and
//! only outermost borders are reported.

use image::GrayImage;

use crate::overlay::Rect;

/// Clockwise neighbor offsets (y grows downwards), starting east.
const DIRECTIONS: [(i64, i64); 8] = [
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
];
const WEST: usize = 4;

/// Outer border of one connected region, as pixel coordinates in tracing order.
#[derive(Clone, Debug)]
pub struct Contour {
    points: Vec<(i64, i64)>,
}

impl Contour {
    /// Polygon area enclosed by the border points (shoelace formula).
    ///
    /// Measured between pixel centers, so a filled `w` x `h` rectangle has
    /// area `(w - 1) * (h - 1)` and a single pixel has area 0.
    pub fn area(&self) -> f64 {
        let n = self.points.len();
        if n < 3 {
            return 0.0;
        }
        let mut twice = 0i64;
        for i in 0..n {
            let (x0, y0) = self.points[i];
            let (x1, y1) = self.points[(i + 1) % n];
            twice += x0 * y1 - x1 * y0;
        }
        (twice as f64 / 2.0).abs()
    }

    /// Smallest upright rectangle containing every border point.
    pub fn bounding_rect(&self) -> Rect {
        let min_x = self.points.iter().map(|p| p.0).min().unwrap_or(0);
        let max_x = self.points.iter().map(|p| p.0).max().unwrap_or(-1);
        let min_y = self.points.iter().map(|p| p.1).min().unwrap_or(0);
        let max_y = self.points.iter().map(|p| p.1).max().unwrap_or(-1);
        Rect {
            x: min_x as u32,
            y: min_y as u32,
            width: (max_x - min_x + 1) as u32,
            height: (max_y - min_y + 1) as u32,
        }
    }
}

/// Find the external contours of `mask` (non-zero = foreground).
pub fn find_external_contours(mask: &GrayImage) -> Vec<Contour> {
    let (width, height) = mask.dimensions();
    let (w, h) = (width as i64, height as i64);
    let mut filled: Vec<bool> = mask.iter().map(|&v| v != 0).collect();
    fill_holes(&mut filled, w, h);

    let mut visited = vec![false; filled.len()];
    let mut contours = Vec::new();
    for y in 0..h {
        for x in 0..w {
            let idx = (y * w + x) as usize;
            if !filled[idx] || visited[idx] {
                continue;
            }
            // First pixel of a region in raster order: topmost, then leftmost.
            mark_region(&filled, &mut visited, w, h, (x, y));
            contours.push(Contour {
                points: trace_border(&filled, w, h, (x, y)),
            });
        }
    }
    contours
}

fn is_set(set: &[bool], w: i64, h: i64, (x, y): (i64, i64)) -> bool {
    x >= 0 && y >= 0 && x < w && y < h && set[(y * w + x) as usize]
}

/// Set every background pixel that is not 4-connected to the image border.
fn fill_holes(set: &mut [bool], w: i64, h: i64) {
    let mut outside = vec![false; set.len()];
    let mut stack: Vec<(i64, i64)> = Vec::new();
    for x in 0..w {
        stack.push((x, 0));
        stack.push((x, h - 1));
    }
    for y in 0..h {
        stack.push((0, y));
        stack.push((w - 1, y));
    }
    while let Some((x, y)) = stack.pop() {
        if x < 0 || y < 0 || x >= w || y >= h {
            continue;
        }
        let idx = (y * w + x) as usize;
        if set[idx] || outside[idx] {
            continue;
        }
        outside[idx] = true;
        stack.extend([(x + 1, y), (x - 1, y), (x, y + 1), (x, y - 1)]);
    }
    for (pixel, out) in set.iter_mut().zip(outside) {
        if !out {
            *pixel = true;
        }
    }
}

fn mark_region(set: &[bool], visited: &mut [bool], w: i64, h: i64, start: (i64, i64)) {
    let mut stack = vec![start];
    while let Some((x, y)) = stack.pop() {
        if !is_set(set, w, h, (x, y)) {
            continue;
        }
        let idx = (y * w + x) as usize;
        if visited[idx] {
            continue;
        }
        visited[idx] = true;
        for (dx, dy) in DIRECTIONS {
            stack.push((x + dx, y + dy));
        }
    }
}

fn direction_of(dx: i64, dy: i64) -> usize {
    DIRECTIONS
        .iter()
        .position(|&d| d == (dx, dy))
        .unwrap_or(WEST)
}

/// Moore-neighbor tracing with Jacob's stopping criterion.
fn trace_border(set: &[bool], w: i64, h: i64, start: (i64, i64)) -> Vec<(i64, i64)> {
    let mut points = vec![start];
    let mut current = start;
    // The pixel west of a raster-order start is background.
    let mut backtrack = WEST;
    let mut first_move: Option<(i64, i64)> = None;
    let limit = (w * h * 4).max(8) as usize;

    for _ in 0..limit {
        let mut next = None;
        for step in 1..=8 {
            let dir = (backtrack + step) % 8;
            let (dx, dy) = DIRECTIONS[dir];
            let candidate = (current.0 + dx, current.1 + dy);
            if is_set(set, w, h, candidate) {
                // The neighbor examined just before `candidate` was background.
                let (bx, by) = DIRECTIONS[(dir + 7) % 8];
                let back = (current.0 + bx, current.1 + by);
                next = Some((candidate, direction_of(back.0 - candidate.0, back.1 - candidate.1)));
                break;
            }
        }
        let Some((candidate, new_backtrack)) = next else {
            // Isolated pixel.
            return points;
        };

        if current == start {
            match first_move {
                None => first_move = Some(candidate),
                Some(first) if first == candidate => break,
                Some(_) => {}
            }
        }
        current = candidate;
        backtrack = new_backtrack;
        if current != start || first_move.is_none() {
            points.push(current);
        }
    }

    if points.len() > 1 && points.last() == Some(&start) {
        points.pop();
    }
    points
}
