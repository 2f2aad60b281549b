use image::{ Rgb, RgbImage };
use imageproc::{ drawing, point::Point, rect::Rect };

/// Color of the box drawn around an accepted plate.
pub const MARKER_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
pub const MARKER_THICKNESS: u32 = 3;

/// Draws `rect` with a border `thickness` pixels wide, growing inwards so the
/// box never leaves the frame.
pub fn draw_thick_rect_mut(canvas: &mut RgbImage, rect: Rect, thickness: u32, color: Rgb<u8>) {
    for i in 0..thickness {
        let width = rect.width().saturating_sub(2*i);
        let height = rect.height().saturating_sub(2*i);
        if width == 0 || height == 0 {
            break;
        }
        let inner = Rect::at(rect.left() + i as i32, rect.top() + i as i32).of_size(width, height);
        drawing::draw_hollow_rect_mut(canvas, inner, color);
    }
}

/// Smallest rectangle holding every point, bounds inclusive.
pub fn bounding_rect(points: &[Point<i32>]) -> Option<Rect> {
    let first = points.first()?;
    let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
    for p in points {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }
    let width = (max_x - min_x + 1) as u32;
    let height = (max_y - min_y + 1) as u32;
    Some(Rect::at(min_x, min_y).of_size(width, height))
}

/// True when `rect` lies inside a `width` x `height` raster.
pub fn rect_within(rect: &Rect, width: u32, height: u32) -> bool {
    rect.left() >= 0 && rect.top() >= 0
        && rect.right() < width as i32 && rect.bottom() < height as i32
}

/// Normalized 1-D gaussian kernel with `size` taps.
pub fn gaussian_kernel(size: u32, sigma: f32) -> Vec<f32> {
    let half = (size / 2) as i32;
    let denom = 2.0 * sigma * sigma;
    let mut kernel: Vec<f32> = (-half..=half)
        .map(|i| (-((i * i) as f32) / denom).exp())
        .collect();
    let sum: f32 = kernel.iter().sum();
    kernel.iter_mut().for_each(|v| *v /= sum);
    kernel
}

/// Sigma a gaussian of `size` taps gets when none is given, same rule as OpenCV.
pub fn sigma_for_window(size: u32) -> f32 {
    0.3 * ((size as f32 - 1.0) * 0.5 - 1.0) + 0.8
}


#[cfg(test)]
mod test {

    use image::{ Rgb, RgbImage };
    use imageproc::{ point::Point, rect::Rect };

    use super::*;

    #[test]
    fn kernel_is_normalized_and_symmetric() {
        let kernel = gaussian_kernel(5, 5.0);
        assert_eq!(kernel.len(), 5);
        let sum: f32 = kernel.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert!((kernel[0] - kernel[4]).abs() < 1e-7);
        assert!(kernel[2] > kernel[1]);
    }

    #[test]
    fn bounding_rect_is_inclusive() {
        let points = [Point::new(10, 5), Point::new(69, 5), Point::new(69, 34), Point::new(10, 34)];
        let rect = bounding_rect(&points).unwrap();
        assert_eq!(rect, Rect::at(10, 5).of_size(60, 30));
        assert!(bounding_rect(&[]).is_none());
    }

    #[test]
    fn thick_rect_stays_inside() {
        let mut canvas = RgbImage::new(20, 20);
        let rect = Rect::at(0, 0).of_size(20, 20);
        draw_thick_rect_mut(&mut canvas, rect, 3, MARKER_COLOR);
        assert_eq!(canvas[(0, 0)], MARKER_COLOR);
        assert_eq!(canvas[(2, 10)], MARKER_COLOR);
        assert_eq!(canvas[(3, 10)], Rgb([0, 0, 0]));
        assert_eq!(canvas[(19, 19)], MARKER_COLOR);
        assert!(rect_within(&rect, 20, 20));
        assert!(!rect_within(&rect, 19, 20));
    }
}
