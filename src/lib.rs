use image::{ GrayImage, RgbImage };
use imageproc::rect::Rect;
use log::{ debug, info, warn };

use config::Bounds;
use observer::NoopObserver;

pub mod utils;
pub mod error;
pub mod config;
pub mod image_process;
pub mod contour;
pub mod crop;
pub mod ocr;
pub mod observer;
pub mod source;

pub use config::{ AreaRange, EdgeMethod, LprConfig, Optimization, PageSegMode };
pub use error::{ LprError, LprErrorKind };
pub use observer::{ DumpObserver, Stage, StageObserver };
pub use ocr::{ Recognition, Recognizer, TimedRecognizer };
pub use source::{ open_source, FrameSource, ImageFiles, SourceFrame };
#[cfg(feature = "video")]
pub use source::VideoFrames;


/// One recognized plate.
#[derive(Debug, Clone)]
pub struct Plate {
    /// Binarized crop the text was read from.
    pub ocr_image: GrayImage,
    /// Copy of the frame with only this plate boxed.
    pub annotated: RgbImage,
    pub rect: Rect,
    pub text: String,
    pub confidence: i32,
}

/// Everything one detection call produced. Always well formed, a frame
/// without plates just has an empty `plates`.
#[derive(Debug, Clone)]
pub struct PlatesImage {
    pub image: RgbImage,
    pub optimized: GrayImage,
    /// Copy of the frame with every accepted plate boxed.
    pub contours: RgbImage,
    pub plates: Vec<Plate>,
}

impl PlatesImage {

    fn new(frame: &RgbImage, optimized: &GrayImage) -> Self {
        Self {
            image: frame.clone(),
            optimized: optimized.clone(),
            contours: frame.clone(),
            plates: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.plates.is_empty()
    }
}

/// Plate detector owning its OCR engine.
///
/// Detection borrows the detector mutably, so one instance runs one frame at a
/// time and settings cannot change under a running call. Use one detector per
/// thread to process frames in parallel.
pub struct Lpr<R: Recognizer> {
    config: LprConfig,
    ocr: R,
    observer: Box<dyn StageObserver>,
}

#[cfg(feature = "tesseract")]
impl Lpr<Box<dyn Recognizer>> {

    /// Detector backed by Tesseract. Fails if the configuration is invalid or
    /// the engine cannot load its language data.
    pub fn new(config: LprConfig) -> Result<Self, LprError> {
        // before the engine loads its language data
        config.validate()?;
        let ocr = ocr::build_recognizer(&config.ocr)?;
        Ok(Self::assemble(config, ocr))
    }
}

impl<R: Recognizer> Lpr<R> {

    pub fn with_recognizer(config: LprConfig, ocr: R) -> Result<Self, LprError> {
        config.validate()?;
        Ok(Self::assemble(config, ocr))
    }

    fn assemble(config: LprConfig, ocr: R) -> Self {
        Self { config, ocr, observer: Box::new(NoopObserver) }
    }

    pub fn with_observer(mut self, observer: Box<dyn StageObserver>) -> Self {
        self.observer = observer;
        self
    }

    pub fn set_observer(&mut self, observer: Box<dyn StageObserver>) {
        self.observer = observer;
    }

    pub fn config(&self) -> &LprConfig {
        &self.config
    }

    pub fn recognizer(&self) -> &R {
        &self.ocr
    }

    pub fn recognizer_mut(&mut self) -> &mut R {
        &mut self.ocr
    }

    pub fn set_optimization(&mut self, optimization: Optimization) {
        self.config.optimization = optimization;
    }

    pub fn set_contour_method(&mut self, method: EdgeMethod) {
        self.config.frame.method = method;
    }

    pub fn set_plate_contour_method(&mut self, method: EdgeMethod) {
        self.config.plate.method = method;
    }

    pub fn set_threshold(&mut self, min: u8, max: u8) -> Result<(), LprError> {
        let bounds = Bounds::new(min, max);
        config::check_bounds("frame.threshold", bounds)?;
        self.config.frame.threshold = bounds;
        Ok(())
    }

    pub fn set_autothreshold(&mut self, window: u32) -> Result<(), LprError> {
        config::check_window("frame.window", window)?;
        self.config.frame.window = window;
        Ok(())
    }

    pub fn set_plate_threshold(&mut self, min: u8, max: u8) -> Result<(), LprError> {
        let bounds = Bounds::new(min, max);
        config::check_bounds("plate.threshold", bounds)?;
        self.config.plate.threshold = bounds;
        Ok(())
    }

    pub fn set_plate_autothreshold(&mut self, window: u32) -> Result<(), LprError> {
        config::check_window("plate.window", window)?;
        self.config.plate.window = window;
        Ok(())
    }

    /// Polygon approximation tolerance in thousandths of the perimeter.
    pub fn set_perimeter_constant(&mut self, per_mille: u32) -> Result<(), LprError> {
        if per_mille == 0 {
            return Err(LprError::invalid_config("perimeter_per_mille", "must be at least 1"));
        }
        self.config.perimeter_per_mille = per_mille;
        Ok(())
    }

    pub fn set_min_confidence(&mut self, min_confidence: i32) -> Result<(), LprError> {
        if !(0..=100).contains(&min_confidence) {
            return Err(LprError::invalid_config("ocr.min_confidence",
                format!("{} is outside 0..=100", min_confidence)));
        }
        self.config.ocr.min_confidence = min_confidence;
        Ok(())
    }

    pub fn set_min_plate_height(&mut self, height: u32) -> Result<(), LprError> {
        if height == 0 {
            return Err(LprError::invalid_config("min_plate_height", "must be at least 1"));
        }
        self.config.min_plate_height = height;
        Ok(())
    }

    pub fn set_area(&mut self, area: AreaRange) -> Result<(), LprError> {
        config::check_area(area)?;
        self.config.area = area;
        Ok(())
    }

    /// Single channel image detection runs on, per the configured optimization.
    pub fn optimize_image(&self, frame: &RgbImage) -> GrayImage {
        image_process::optimize(frame, self.config.optimization, self.config.smoothing)
    }

    /// Detects plates whose contour area falls in the configured range.
    pub fn detect_plates(&mut self, frame: &RgbImage) -> PlatesImage {
        let area = self.config.area;
        self.detect_plates_in(frame, area)
    }

    /// Detects plates whose contour area falls in `area`, bounds inclusive.
    pub fn detect_plates_in(&mut self, frame: &RgbImage, area: AreaRange) -> PlatesImage {
        let optimized = self.optimize_image(frame);
        self.detect_plates_optimized(frame, &optimized, area)
    }

    /// Detection on an optimized image the caller already has. `optimized`
    /// must have the frame's dimensions, otherwise nothing is detected.
    pub fn detect_plates_optimized(&mut self, frame: &RgbImage, optimized: &GrayImage, area: AreaRange) -> PlatesImage {
        let mut res = PlatesImage::new(frame, optimized);
        let (width, height) = frame.dimensions();
        if width == 0 || height == 0 {
            debug!("empty frame, nothing to detect");
            return res;
        }
        if optimized.dimensions() != frame.dimensions() {
            warn!("optimized image is {:?} but the frame is {:?}, skipping frame",
                  optimized.dimensions(), frame.dimensions());
            return res;
        }

        self.observer.frame(Stage::Original, frame);
        let edges = image_process::frame_edges(optimized, &self.config.frame);
        self.observer.raster(Stage::Edge, &edges);

        let contours = contour::find_external_contours(&edges);
        let candidates = contour::filter_candidates(&contours, area, self.config.perimeter_constant());
        debug!("{} contours, {} candidates", contours.len(), candidates.len());

        for candidate in &candidates {
            let plate = crop::crop_plate(optimized, candidate, &self.config.plate,
                                         self.config.min_plate_height, self.observer.as_mut());
            let plate = match plate {
                Some(plate) => plate,
                None => continue,
            };
            let recognition = match self.ocr.recognize(&plate.ocr_image) {
                Ok(recognition) => recognition,
                Err(e) => {
                    warn!("skipping candidate at {:?}: {}", plate.rect, e);
                    continue;
                }
            };
            let text = ocr::sanitize(&recognition.text);
            if text.is_empty() || recognition.confidence < self.config.ocr.min_confidence {
                debug!("candidate at {:?} read as {:?} with confidence {}, rejected",
                       plate.rect, recognition.text, recognition.confidence);
                continue;
            }

            info!("plate {} at {:?}, confidence {}", text, plate.rect, recognition.confidence);
            let mut annotated = frame.clone();
            utils::draw_thick_rect_mut(&mut annotated, plate.rect, utils::MARKER_THICKNESS, utils::MARKER_COLOR);
            utils::draw_thick_rect_mut(&mut res.contours, plate.rect, utils::MARKER_THICKNESS, utils::MARKER_COLOR);
            res.plates.push(Plate {
                ocr_image: plate.ocr_image,
                annotated,
                rect: plate.rect,
                text,
                confidence: recognition.confidence,
            });
        }
        res
    }
}
