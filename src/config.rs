//! Detector configuration.
//!
//! Every knob the pipeline reads lives here. The frame level edge settings and
//! the plate level binarization settings are kept in two separate structs,
//! they are tuned for different contrast ranges and are easy to mix up.

use serde::{ Deserialize, Serialize };

use std::fmt;
use std::fs;
use std::path::{ Path, PathBuf };
use std::str::FromStr;

use crate::error::LprError;

/// Characters the OCR engine is allowed to emit.
pub const WHITELIST: &str = "0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// How a color frame is reduced to a single channel before edge extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Optimization {
    #[default]
    GreyBasic,
    HsvBasic,
    GreyDeep,
    HsvDeep,
}

/// Binarization used both on the whole frame and on plate crops.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EdgeMethod {
    #[serde(rename = "threshold")]
    Threshold,
    #[serde(rename = "autothreshold")]
    AutoThreshold,
    #[serde(rename = "edge-gradient", alias = "canny")]
    Canny,
}

/// Tesseract page segmentation modes the detector supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PageSegMode {
    #[default]
    SingleBlock,
    SingleBlockVertText,
    SingleChar,
}

impl PageSegMode {

    /// Numeric value of `tessedit_pageseg_mode`.
    pub fn code(self) -> u32 {
        match self {
            PageSegMode::SingleBlockVertText => 5,
            PageSegMode::SingleBlock => 6,
            PageSegMode::SingleChar => 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds {
    pub min: u8,
    pub max: u8,
}

impl Bounds {

    pub fn new(min: u8, max: u8) -> Self {
        Self { min, max }
    }
}

/// Edge map settings for the whole optimized frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameEdges {
    pub method: EdgeMethod,
    pub threshold: Bounds,
    /// Adaptive threshold block size, odd.
    pub window: u32,
}

impl Default for FrameEdges {
    fn default() -> Self {
        Self { method: EdgeMethod::Canny, threshold: Bounds::new(128, 255), window: 21 }
    }
}

/// Binarization of an upscaled plate crop right before OCR.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlateEdges {
    pub method: EdgeMethod,
    pub threshold: Bounds,
    /// Adaptive threshold block size, odd.
    pub window: u32,
}

impl Default for PlateEdges {
    fn default() -> Self {
        Self { method: EdgeMethod::Threshold, threshold: Bounds::new(130, 255), window: 11 }
    }
}

/// Gaussian smoothing applied by the deep optimizations.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Smoothing {
    pub kernel: u32,
    pub sigma: f32,
}

impl Default for Smoothing {
    fn default() -> Self {
        Self { kernel: 5, sigma: 5.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrSettings {
    pub page_seg_mode: PageSegMode,
    pub min_confidence: i32,
    pub language: String,
    /// Directory holding the traineddata files, engine default when unset.
    pub datapath: Option<PathBuf>,
    /// Upper bound for one recognition, unbounded when unset.
    pub timeout_ms: Option<u64>,
}

impl Default for OcrSettings {
    fn default() -> Self {
        Self {
            page_seg_mode: PageSegMode::default(),
            min_confidence: 33,
            language: "eng".to_string(),
            datapath: None,
            timeout_ms: None,
        }
    }
}

/// Contour area range a plate candidate has to fall in, in square pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AreaRange {
    pub min: u32,
    pub max: u32,
}

impl AreaRange {

    pub fn new(min: u32, max: u32) -> Self {
        Self { min, max }
    }

    pub fn contains(&self, area: f64) -> bool {
        area >= self.min as f64 && area <= self.max as f64
    }
}

impl Default for AreaRange {
    fn default() -> Self {
        Self { min: 600, max: 6000 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LprConfig {
    pub optimization: Optimization,
    pub smoothing: Smoothing,
    pub frame: FrameEdges,
    pub plate: PlateEdges,
    pub ocr: OcrSettings,
    /// Polygon approximation tolerance, in thousandths of the contour perimeter.
    pub perimeter_per_mille: u32,
    /// Crops shorter than this are upscaled by an integer factor before OCR.
    pub min_plate_height: u32,
    /// Area range used by `Lpr::detect_plates`.
    pub area: AreaRange,
}

impl Default for LprConfig {
    fn default() -> Self {
        Self {
            optimization: Optimization::default(),
            smoothing: Smoothing::default(),
            frame: FrameEdges::default(),
            plate: PlateEdges::default(),
            ocr: OcrSettings::default(),
            perimeter_per_mille: 35,
            min_plate_height: 150,
            area: AreaRange::default(),
        }
    }
}

impl LprConfig {

    pub fn from_toml_str(s: &str) -> Result<Self, LprError> {
        let config: LprConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_toml_file(path: impl AsRef<Path>) -> Result<Self, LprError> {
        let s = fs::read_to_string(path)?;
        Self::from_toml_str(&s)
    }

    pub fn perimeter_constant(&self) -> f64 {
        self.perimeter_per_mille as f64 / 1000.0
    }

    pub fn validate(&self) -> Result<(), LprError> {
        check_bounds("frame.threshold", self.frame.threshold)?;
        check_bounds("plate.threshold", self.plate.threshold)?;
        check_window("frame.window", self.frame.window)?;
        check_window("plate.window", self.plate.window)?;
        check_window("smoothing.kernel", self.smoothing.kernel)?;
        if !(self.smoothing.sigma > 0.0) {
            return Err(LprError::invalid_config("smoothing.sigma", "must be positive"));
        }
        check_area(self.area)?;
        if self.perimeter_per_mille == 0 {
            return Err(LprError::invalid_config("perimeter_per_mille", "must be at least 1"));
        }
        if self.min_plate_height == 0 {
            return Err(LprError::invalid_config("min_plate_height", "must be at least 1"));
        }
        if !(0..=100).contains(&self.ocr.min_confidence) {
            return Err(LprError::invalid_config("ocr.min_confidence",
                format!("{} is outside 0..=100", self.ocr.min_confidence)));
        }
        Ok(())
    }
}

pub(crate) fn check_bounds(field: &'static str, bounds: Bounds) -> Result<(), LprError> {
    if bounds.min > bounds.max {
        return Err(LprError::invalid_config(field,
            format!("min {} is greater than max {}", bounds.min, bounds.max)));
    }
    Ok(())
}

pub(crate) fn check_window(field: &'static str, window: u32) -> Result<(), LprError> {
    if window < 3 || window % 2 == 0 {
        return Err(LprError::invalid_config(field,
            format!("{} must be odd and at least 3", window)));
    }
    Ok(())
}

pub(crate) fn check_area(area: AreaRange) -> Result<(), LprError> {
    if area.min > area.max {
        return Err(LprError::invalid_config("area",
            format!("min {} is greater than max {}", area.min, area.max)));
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownStrategy(String);

impl fmt::Display for UnknownStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown strategy `{}`", self.0)
    }
}

impl std::error::Error for UnknownStrategy {}

// Strategies are accepted by their historical integer codes or by name.

impl FromStr for Optimization {
    type Err = UnknownStrategy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1" | "grey-basic" => Ok(Optimization::GreyBasic),
            "2" | "hsv-basic" => Ok(Optimization::HsvBasic),
            "3" | "grey-deep" => Ok(Optimization::GreyDeep),
            "4" | "hsv-deep" => Ok(Optimization::HsvDeep),
            _ => Err(UnknownStrategy(s.to_string())),
        }
    }
}

impl FromStr for EdgeMethod {
    type Err = UnknownStrategy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1" | "threshold" => Ok(EdgeMethod::Threshold),
            "2" | "autothreshold" => Ok(EdgeMethod::AutoThreshold),
            "3" | "edge-gradient" | "canny" => Ok(EdgeMethod::Canny),
            _ => Err(UnknownStrategy(s.to_string())),
        }
    }
}

impl FromStr for PageSegMode {
    type Err = UnknownStrategy;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "6" | "single-block" => Ok(PageSegMode::SingleBlock),
            "5" | "single-block-vert-text" => Ok(PageSegMode::SingleBlockVertText),
            "10" | "single-char" => Ok(PageSegMode::SingleChar),
            _ => Err(UnknownStrategy(s.to_string())),
        }
    }
}


#[cfg(test)]
mod test {

    use super::*;
    use crate::error::LprErrorKind;

    use std::error::Error;

    #[test]
    fn defaults_are_valid() {
        let config = LprConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.frame.method, EdgeMethod::Canny);
        assert_eq!(config.plate.method, EdgeMethod::Threshold);
        assert_eq!(config.plate.threshold, Bounds::new(130, 255));
        assert_eq!(config.ocr.min_confidence, 33);
        assert!((config.perimeter_constant() - 0.035).abs() < 1e-12);
    }

    #[test]
    fn strategies_parse_from_codes_and_names() {
        assert_eq!("3".parse(), Ok(Optimization::GreyDeep));
        assert_eq!("hsv-basic".parse(), Ok(Optimization::HsvBasic));
        assert_eq!("2".parse(), Ok(EdgeMethod::AutoThreshold));
        assert_eq!("edge-gradient".parse(), Ok(EdgeMethod::Canny));
        assert_eq!("10".parse(), Ok(PageSegMode::SingleChar));
        assert!("5".parse::<Optimization>().is_err());
        assert!("0".parse::<EdgeMethod>().is_err());
    }

    #[test]
    fn partial_toml_keeps_defaults() -> Result<(), Box<dyn Error>> {
        let config = LprConfig::from_toml_str(r#"
            optimization = "hsv-deep"
            perimeter_per_mille = 20

            [plate]
            method = "autothreshold"
            window = 15

            [ocr]
            min_confidence = 50
            page_seg_mode = "single-char"
        "#)?;
        assert_eq!(config.optimization, Optimization::HsvDeep);
        assert_eq!(config.plate.method, EdgeMethod::AutoThreshold);
        assert_eq!(config.plate.window, 15);
        assert_eq!(config.plate.threshold, Bounds::new(130, 255));
        assert_eq!(config.frame, FrameEdges::default());
        assert_eq!(config.ocr.min_confidence, 50);
        assert_eq!(config.ocr.page_seg_mode.code(), 10);
        assert_eq!(config.ocr.language, "eng");
        assert_eq!(config.area, AreaRange::new(600, 6000));
        Ok(())
    }

    #[test]
    fn rejects_even_window() {
        let err = LprConfig::from_toml_str("[frame]\nwindow = 20\n").unwrap_err();
        assert!(matches!(err.kind(), LprErrorKind::InvalidConfig { field: "frame.window", .. }));
    }

    #[test]
    fn rejects_inverted_ranges() {
        let mut config = LprConfig::default();
        config.area = AreaRange::new(7000, 600);
        assert!(config.validate().is_err());

        let mut config = LprConfig::default();
        config.plate.threshold = Bounds::new(200, 100);
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_garbage_toml() {
        let err = LprConfig::from_toml_str("optimization = 7").unwrap_err();
        assert!(matches!(err.kind(), LprErrorKind::ConfigParse(_)));
    }
}
