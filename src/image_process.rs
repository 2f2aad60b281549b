//! Raster stages of the pipeline: reducing a color frame to the optimized
//! single channel image, and binarizing it into an edge map.

use image::{ GrayImage, Luma, Rgb, RgbImage };
use imageproc::{ edges, filter, morphology };
use imageproc::morphology::Mask;

use crate::config::{ Bounds, EdgeMethod, FrameEdges, Optimization, PlateEdges, Smoothing };
use crate::utils;

/// Subtracted from the local mean in adaptive thresholding.
const ADAPTIVE_OFFSET: i16 = 5;

/// Reduces a color frame to a single channel image, the frame is left untouched.
pub fn optimize(frame: &RgbImage, optimization: Optimization, smoothing: Smoothing) -> GrayImage {
    if frame.width() == 0 || frame.height() == 0 {
        return GrayImage::new(frame.width(), frame.height());
    }
    match optimization {
        Optimization::GreyBasic => grayscale(frame),
        Optimization::HsvBasic => value_channel(frame),
        Optimization::GreyDeep => {
            let mut img = grayscale(frame);
            maximize_contrast(&mut img);
            smooth(&img, smoothing)
        },
        Optimization::HsvDeep => {
            let mut img = value_channel(frame);
            maximize_contrast(&mut img);
            smooth(&img, smoothing)
        },
    }
}

pub fn grayscale(frame: &RgbImage) -> GrayImage {
    image::imageops::grayscale(frame)
}

/// The V plane of the HSV representation, max(R, G, B).
pub fn value_channel(frame: &RgbImage) -> GrayImage {
    GrayImage::from_fn(frame.width(), frame.height(), |x, y| {
        let Rgb([r, g, b]) = *frame.get_pixel(x, y);
        Luma([r.max(g).max(b)])
    })
}

/// img + tophat(img) - blackhat(img), with a 3x3 cross as structuring element.
pub fn maximize_contrast(img: &mut GrayImage) {
    let mask = Mask::diamond(1);
    let opened = morphology::grayscale_open(img, &mask);
    let closed = morphology::grayscale_close(img, &mask);
    img.pixels_mut()
        .zip(opened.pixels().zip(closed.pixels()))
        .for_each(|(p, (o, c))| {
            let v = p[0];
            let top_hat = v.saturating_sub(o[0]);
            let black_hat = c[0].saturating_sub(v);
            p[0] = v.saturating_add(top_hat).saturating_sub(black_hat);
        });
}

pub fn smooth(img: &GrayImage, smoothing: Smoothing) -> GrayImage {
    let kernel = utils::gaussian_kernel(smoothing.kernel, smoothing.sigma);
    filter::separable_filter_equal(img, &kernel)
}

/// Edge map of the whole optimized frame.
pub fn frame_edges(optimized: &GrayImage, settings: &FrameEdges) -> GrayImage {
    // strokes darker than their surroundings become foreground
    binarize(optimized, settings.method, settings.threshold, settings.window, true)
}

/// Binarized plate crop handed to the OCR engine. With `AutoThreshold` the
/// foreground value is `settings.threshold.max`, see `adaptive_threshold`.
pub fn plate_edges(crop: &GrayImage, settings: &PlateEdges) -> GrayImage {
    binarize(crop, settings.method, settings.threshold, settings.window, false)
}

fn binarize(img: &GrayImage, method: EdgeMethod, bounds: Bounds, window: u32, invert: bool) -> GrayImage {
    if img.width() == 0 || img.height() == 0 {
        return img.clone();
    }
    match method {
        EdgeMethod::Threshold => threshold(img, bounds),
        EdgeMethod::AutoThreshold => adaptive_threshold(img, window, bounds.max, invert),
        EdgeMethod::Canny => edges::canny(img, bounds.min as f32, bounds.max as f32),
    }
}

/// `bounds.max` where the pixel is above `bounds.min`, 0 elsewhere.
pub fn threshold(img: &GrayImage, bounds: Bounds) -> GrayImage {
    let mut out = img.clone();
    out.pixels_mut().for_each(|p| {
        p[0] = if p[0] > bounds.min { bounds.max } else { 0 };
    });
    out
}

/// Compares every pixel with the gaussian weighted mean of its `window` x `window`
/// neighbourhood minus a small offset.
///
/// Foreground pixels get `max_value`, which callers pass as the upper bound of
/// their threshold pair, never the lower one: a 130/255 plate pair marks
/// foreground as 255, not 130.
pub fn adaptive_threshold(img: &GrayImage, window: u32, max_value: u8, invert: bool) -> GrayImage {
    let kernel = utils::gaussian_kernel(window, utils::sigma_for_window(window));
    let mean = filter::separable_filter_equal(img, &kernel);
    let mut out = img.clone();
    out.pixels_mut().zip(mean.pixels()).for_each(|(p, m)| {
        let above = p[0] as i16 > m[0] as i16 - ADAPTIVE_OFFSET;
        p[0] = if above != invert { max_value } else { 0 };
    });
    out
}


#[cfg(test)]
mod test {

    use image::{ GrayImage, Luma, Rgb, RgbImage };

    use super::*;
    use crate::config::{ Bounds, EdgeMethod, FrameEdges, Optimization, PlateEdges, Smoothing };

    fn split_frame() -> RgbImage {
        RgbImage::from_fn(40, 30, |x, _| if x < 20 { Rgb([10, 40, 200]) } else { Rgb([250, 240, 230]) })
    }

    #[test]
    fn value_channel_takes_channel_max() {
        let frame = split_frame();
        let v = value_channel(&frame);
        assert_eq!(v[(0, 0)], Luma([200]));
        assert_eq!(v[(39, 29)], Luma([250]));
    }

    #[test]
    fn every_optimization_keeps_dimensions() {
        let frame = split_frame();
        for optimization in [Optimization::GreyBasic, Optimization::HsvBasic,
                             Optimization::GreyDeep, Optimization::HsvDeep] {
            let out = optimize(&frame, optimization, Smoothing::default());
            assert_eq!(out.dimensions(), frame.dimensions());
        }
    }

    #[test]
    fn optimize_leaves_frame_alone() {
        let frame = split_frame();
        let copy = frame.clone();
        let _ = optimize(&frame, Optimization::HsvDeep, Smoothing::default());
        assert_eq!(frame, copy);
    }

    #[test]
    fn empty_frame_gives_empty_image() {
        let out = optimize(&RgbImage::new(0, 0), Optimization::GreyDeep, Smoothing::default());
        assert_eq!(out.dimensions(), (0, 0));
    }

    #[test]
    fn contrast_boost_on_flat_image_is_identity() {
        let mut img = GrayImage::from_pixel(10, 10, Luma([90]));
        maximize_contrast(&mut img);
        assert!(img.pixels().all(|p| p[0] == 90));
    }

    #[test]
    fn contrast_boost_darkens_thin_dark_line() {
        let mut img = GrayImage::from_fn(11, 11, |x, _| if x == 5 { Luma([100]) } else { Luma([160]) });
        maximize_contrast(&mut img);
        // black-hat is 60 on the line
        assert_eq!(img[(5, 5)], Luma([40]));
        assert_eq!(img[(0, 5)], Luma([160]));
    }

    #[test]
    fn threshold_is_strictly_above_min() {
        let img = GrayImage::from_fn(3, 1, |x, _| Luma([127 + x as u8]));
        let out = threshold(&img, Bounds::new(128, 200));
        assert_eq!(out.as_raw(), &vec![0, 0, 200]);
    }

    #[test]
    fn adaptive_threshold_on_flat_image() {
        let img = GrayImage::from_pixel(15, 15, Luma([120]));
        let plain = adaptive_threshold(&img, 11, 255, false);
        let inverted = adaptive_threshold(&img, 11, 255, true);
        assert!(plain.pixels().all(|p| p[0] == 255));
        assert!(inverted.pixels().all(|p| p[0] == 0));
    }

    #[test]
    fn plate_autothreshold_uses_upper_bound() {
        let img = GrayImage::from_pixel(15, 15, Luma([120]));
        let settings = PlateEdges { method: EdgeMethod::AutoThreshold, threshold: Bounds::new(130, 200), window: 11 };
        let out = plate_edges(&img, &settings);
        assert!(out.pixels().all(|p| p[0] == 200));
    }

    #[test]
    fn canny_finds_a_step() {
        let img = GrayImage::from_fn(40, 40, |x, _| if x < 20 { Luma([0]) } else { Luma([255]) });
        let settings = FrameEdges { method: EdgeMethod::Canny, ..FrameEdges::default() };
        let out = frame_edges(&img, &settings);
        assert!(out.pixels().any(|p| p[0] == 255));
        assert_eq!(out[(5, 20)], Luma([0]));
    }
}
