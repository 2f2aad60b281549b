//! Contour search on the edge map and the geometric filter that turns
//! contours into plate candidates.

use image::GrayImage;
use imageproc::contours::{ self, BorderType };
use imageproc::geometry;
use imageproc::point::Point;
use imageproc::rect::Rect;
use log::trace;

use crate::config::AreaRange;
use crate::utils;

/// A contour that looks like a plate: its outline simplifies to a convex quadrilateral.
#[derive(Debug, Clone)]
pub struct Candidate<'a> {
    pub contour: &'a [Point<i32>],
    pub polygon: Vec<Point<i32>>,
    pub rect: Rect,
    pub area: f64,
}

/// Why a contour did not make it to a candidate.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Rejection {
    Area(f64),
    Vertices(usize),
    NotConvex,
}

/// Outermost contours of the edge map, holes and anything nested inside are dropped.
pub fn find_external_contours(edges: &GrayImage) -> Vec<Vec<Point<i32>>> {
    contours::find_contours::<i32>(edges)
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .map(|c| c.points)
        .collect()
}

pub fn filter_candidates<'a>(contours: &'a [Vec<Point<i32>>], area: AreaRange, perimeter_constant: f64) -> Vec<Candidate<'a>> {
    contours.iter().enumerate().filter_map(|(i, contour)| {
        match classify(contour, area, perimeter_constant) {
            Ok(candidate) => Some(candidate),
            Err(rejection) => {
                trace!("contour {} rejected: {:?}", i, rejection);
                None
            }
        }
    }).collect()
}

pub fn classify(contour: &[Point<i32>], area: AreaRange, perimeter_constant: f64) -> Result<Candidate<'_>, Rejection> {
    let contour_area = contour_area(contour);
    if !area.contains(contour_area) {
        return Err(Rejection::Area(contour_area));
    }
    let epsilon = geometry::arc_length(contour, true) * perimeter_constant;
    if !(epsilon > 0.0) {
        return Err(Rejection::Vertices(contour.len()));
    }
    let polygon = approximate_closed(contour, epsilon);
    if polygon.len() != 4 {
        return Err(Rejection::Vertices(polygon.len()));
    }
    if !is_convex(&polygon) {
        return Err(Rejection::NotConvex);
    }
    let rect = utils::bounding_rect(contour).ok_or(Rejection::Vertices(0))?;
    Ok(Candidate { contour, polygon, rect, area: contour_area })
}

/// Absolute area enclosed by the contour, shoelace formula.
pub fn contour_area(points: &[Point<i32>]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let n = points.len();
    let twice: i64 = (0..n).map(|i| {
        let a = points[i];
        let b = points[(i + 1) % n];
        a.x as i64 * b.y as i64 - b.x as i64 * a.y as i64
    }).sum();
    (twice as f64 / 2.0).abs()
}

/// Douglas-Peucker on a closed curve.
///
/// The curve is cut at two mutually distant points, each half is simplified as
/// an open polyline and the halves are joined again. Both cut points end up as
/// vertices, so they are picked as extremes of the curve rather than wherever
/// the tracer started. The returned polygon is implicitly closed, the first
/// vertex is not repeated.
pub fn approximate_closed(contour: &[Point<i32>], epsilon: f64) -> Vec<Point<i32>> {
    let first = match contour.first() {
        Some(p) => *p,
        None => return Vec::new(),
    };
    let a = farthest_from(contour, first);
    let b = farthest_from(contour, contour[a]);
    if a == b {
        return vec![contour[a]];
    }
    let (lo, hi) = (a.min(b), a.max(b));

    let back: Vec<Point<i32>> = contour[hi..].iter().chain(contour[..=lo].iter()).copied().collect();
    let mut polygon = geometry::approximate_polygon_dp(&contour[lo..=hi], epsilon, false);
    let tail = geometry::approximate_polygon_dp(&back, epsilon, false);
    // each cut point ends one half and starts the other
    polygon.pop();
    polygon.extend(tail);
    polygon.pop();
    polygon
}

fn farthest_from(contour: &[Point<i32>], from: Point<i32>) -> usize {
    contour.iter()
        .enumerate()
        .max_by_key(|(_, p)| distance_squared(from, **p))
        .map(|(i, _)| i)
        .unwrap_or(0)
}

/// Every turn goes the same way. Collinear vertices are tolerated, a polygon
/// with no turn at all is not convex.
pub fn is_convex(polygon: &[Point<i32>]) -> bool {
    let n = polygon.len();
    if n < 3 {
        return false;
    }
    let mut sign = 0;
    for i in 0..n {
        let a = polygon[i];
        let b = polygon[(i + 1) % n];
        let c = polygon[(i + 2) % n];
        let cross = (b.x - a.x) as i64 * (c.y - b.y) as i64 - (b.y - a.y) as i64 * (c.x - b.x) as i64;
        if cross == 0 {
            continue;
        }
        if sign == 0 {
            sign = cross.signum();
        } else if cross.signum() != sign {
            return false;
        }
    }
    sign != 0
}

fn distance_squared(a: Point<i32>, b: Point<i32>) -> i64 {
    let dx = (a.x - b.x) as i64;
    let dy = (a.y - b.y) as i64;
    dx*dx + dy*dy
}


#[cfg(test)]
mod test {

    use image::{ GrayImage, Luma };
    use imageproc::drawing;
    use imageproc::point::Point;
    use imageproc::rect::Rect;

    use super::*;
    use crate::config::AreaRange;

    /// Boundary pixels of a w x h rectangle at (x, y), clockwise from the top left.
    fn rect_outline(x: i32, y: i32, w: i32, h: i32) -> Vec<Point<i32>> {
        let (r, b) = (x + w - 1, y + h - 1);
        let mut points = Vec::new();
        points.extend((x..r).map(|i| Point::new(i, y)));
        points.extend((y..b).map(|j| Point::new(r, j)));
        points.extend((x + 1..=r).rev().map(|i| Point::new(i, b)));
        points.extend((y + 1..=b).rev().map(|j| Point::new(x, j)));
        points
    }

    #[test]
    fn area_of_outline() {
        assert_eq!(contour_area(&rect_outline(0, 0, 60, 30)), 59.0 * 29.0);
        assert_eq!(contour_area(&[Point::new(1, 1), Point::new(2, 2)]), 0.0);
    }

    #[test]
    fn rectangle_outline_becomes_candidate() {
        let outline = rect_outline(100, 80, 60, 30);
        let candidate = classify(&outline, AreaRange::default(), 0.035).unwrap();
        assert_eq!(candidate.polygon.len(), 4);
        assert_eq!(candidate.rect, Rect::at(100, 80).of_size(60, 30));
        assert!(candidate.polygon.contains(&Point::new(159, 109)));
    }

    #[test]
    fn area_bounds_are_inclusive() {
        let outline = rect_outline(0, 0, 60, 30);
        let exact = AreaRange::new(1711, 1711);
        assert!(classify(&outline, exact, 0.035).is_ok());
        assert_eq!(classify(&outline, AreaRange::new(1712, 6000), 0.035).unwrap_err(), Rejection::Area(1711.0));
        assert_eq!(classify(&outline, AreaRange::new(600, 1710), 0.035).unwrap_err(), Rejection::Area(1711.0));
    }

    #[test]
    fn start_point_does_not_matter() {
        let mut outline = rect_outline(10, 10, 50, 40);
        outline.rotate_left(17);
        let polygon = approximate_closed(&outline, 5.0);
        assert_eq!(polygon.len(), 4);
    }

    #[test]
    fn triangle_is_rejected() {
        let mut img = GrayImage::new(120, 120);
        let triangle = [Point::new(10, 10), Point::new(100, 10), Point::new(55, 80)];
        drawing::draw_polygon_mut(&mut img, &triangle, Luma([255]));
        let contours = find_external_contours(&img);
        assert_eq!(contours.len(), 1);
        let err = classify(&contours[0], AreaRange::new(100, 10000), 0.035).unwrap_err();
        assert_eq!(err, Rejection::Vertices(3));
    }

    #[test]
    fn dart_is_rejected_as_not_convex() {
        let mut img = GrayImage::new(200, 170);
        let dart = [Point::new(20, 20), Point::new(100, 60), Point::new(180, 20), Point::new(100, 150)];
        drawing::draw_polygon_mut(&mut img, &dart, Luma([255]));
        let contours = find_external_contours(&img);
        assert_eq!(contours.len(), 1);
        let err = classify(&contours[0], AreaRange::new(100, 20000), 0.035).unwrap_err();
        assert_eq!(err, Rejection::NotConvex);
        assert!(filter_candidates(&contours, AreaRange::new(100, 20000), 0.035).is_empty());
    }

    #[test]
    fn nested_contours_are_dropped() {
        let mut img = GrayImage::new(100, 100);
        drawing::draw_filled_rect_mut(&mut img, Rect::at(10, 10).of_size(80, 80), Luma([255]));
        drawing::draw_filled_rect_mut(&mut img, Rect::at(30, 30).of_size(40, 40), Luma([0]));
        drawing::draw_filled_rect_mut(&mut img, Rect::at(40, 40).of_size(20, 20), Luma([255]));
        assert_eq!(find_external_contours(&img).len(), 1);
    }

    #[test]
    fn convexity() {
        let square = [Point::new(0, 0), Point::new(10, 0), Point::new(10, 10), Point::new(0, 10)];
        let dart = [Point::new(0, 0), Point::new(40, 20), Point::new(80, 0), Point::new(40, 60)];
        let bowtie = [Point::new(0, 0), Point::new(20, 20), Point::new(20, 0), Point::new(0, 20)];
        let flat = [Point::new(0, 0), Point::new(5, 0), Point::new(10, 0), Point::new(15, 0)];
        assert!(is_convex(&square));
        assert!(!is_convex(&dart));
        assert!(!is_convex(&bowtie));
        assert!(!is_convex(&flat));
    }

    #[test]
    fn filter_keeps_only_quadrilaterals() {
        let contours = vec![
            rect_outline(0, 0, 60, 30),
            rect_outline(0, 0, 10, 10),
            rect_outline(0, 0, 100, 80),
        ];
        let candidates = filter_candidates(&contours, AreaRange::default(), 0.035);
        assert_eq!(candidates.len(), 1);
        assert_eq!(candidates[0].area, 1711.0);
    }
}
