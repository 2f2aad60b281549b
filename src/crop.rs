//! Cuts a candidate out of the optimized image and prepares it for OCR.

use image::{ GrayImage, Luma };
use image::imageops::{ self, FilterType };
use imageproc::drawing;
use imageproc::point::Point;
use imageproc::rect::Rect;

use crate::config::PlateEdges;
use crate::contour::Candidate;
use crate::image_process;
use crate::observer::{ Stage, StageObserver };
use crate::utils;

const WHITE: Luma<u8> = Luma([255]);

/// A plate region ready for recognition.
#[derive(Debug, Clone)]
pub struct PlateCrop {
    pub rect: Rect,
    /// Binarized, possibly upscaled crop fed to the OCR engine.
    pub ocr_image: GrayImage,
    /// Integer factor the crop was enlarged by, 1 when it was tall enough.
    pub scale: u32,
}

/// Runs the crop stages for one candidate: mask, border removal, white
/// background, bounding box, upscaling and binarization.
///
/// Returns `None` if the candidate box does not fit in `optimized`.
pub fn crop_plate(optimized: &GrayImage, candidate: &Candidate<'_>, plate: &PlateEdges,
                  min_height: u32, observer: &mut dyn StageObserver) -> Option<PlateCrop> {
    let (width, height) = optimized.dimensions();
    let rect = candidate.rect;
    if !utils::rect_within(&rect, width, height) {
        return None;
    }

    let mask = contour_mask(width, height, candidate.contour);
    observer.raster(Stage::Mask, &mask);

    // the plate frame would otherwise be read as characters
    let mut blanked = optimized.clone();
    for p in candidate.contour {
        drawing::draw_filled_circle_mut(&mut blanked, (p.x, p.y), 1, WHITE);
    }
    observer.raster(Stage::Optimized, &blanked);

    let (left, top) = (rect.left() as u32, rect.top() as u32);
    let crop = GrayImage::from_fn(rect.width(), rect.height(), |x, y| {
        let (sx, sy) = (left + x, top + y);
        if mask[(sx, sy)][0] > 0 { blanked[(sx, sy)] } else { WHITE }
    });
    observer.raster(Stage::Crop, &crop);

    let scale = upscale_factor(crop.height(), min_height);
    let crop = if scale > 1 {
        imageops::resize(&crop, crop.width() * scale, crop.height() * scale, FilterType::CatmullRom)
    } else {
        crop
    };

    let ocr_image = image_process::plate_edges(&crop, plate);
    observer.raster(Stage::Ocr, &ocr_image);
    Some(PlateCrop { rect, ocr_image, scale })
}

/// Integer factor bringing a crop of `height` to at least `min_height`.
pub fn upscale_factor(height: u32, min_height: u32) -> u32 {
    if height == 0 || height >= min_height {
        1
    } else {
        min_height / height
    }
}

/// Same size mask with the filled contour set to 255.
pub fn contour_mask(width: u32, height: u32, contour: &[Point<i32>]) -> GrayImage {
    let mut mask = GrayImage::new(width, height);
    let mut polygon = contour.to_vec();
    while polygon.len() > 1 && polygon.first() == polygon.last() {
        polygon.pop();
    }
    if polygon.len() >= 3 {
        drawing::draw_polygon_mut(&mut mask, &polygon, WHITE);
    }
    for p in contour {
        if p.x >= 0 && p.y >= 0 && (p.x as u32) < width && (p.y as u32) < height {
            mask.put_pixel(p.x as u32, p.y as u32, WHITE);
        }
    }
    mask
}
