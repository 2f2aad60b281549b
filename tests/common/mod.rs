#![allow(dead_code)]

use image::{ GrayImage, Rgb, RgbImage };
use imageproc::drawing;
use imageproc::rect::Rect;

use lpr_ocr::{ EdgeMethod, LprConfig, LprError, LprErrorKind, Recognition, Recognizer };

use std::collections::VecDeque;

pub const WHITE: Rgb<u8> = Rgb([255, 255, 255]);

/// Answers recognitions from a queue and remembers what it was shown.
#[derive(Debug, Default)]
pub struct ScriptedRecognizer {
    answers: VecDeque<Result<Recognition, LprError>>,
    pub seen: Vec<(u32, u32)>,
}

impl ScriptedRecognizer {

    pub fn new() -> Self {
        Self::default()
    }

    pub fn answer(mut self, text: &str, confidence: i32) -> Self {
        self.answers.push_back(Ok(Recognition::new(text, confidence)));
        self
    }

    pub fn fail(mut self, reason: &str) -> Self {
        self.answers.push_back(Err(LprErrorKind::Ocr(reason.to_string()).into()));
        self
    }
}

impl Recognizer for ScriptedRecognizer {
    fn recognize(&mut self, image: &GrayImage) -> Result<Recognition, LprError> {
        self.seen.push(image.dimensions());
        self.answers.pop_front()
            .unwrap_or_else(|| Err(LprErrorKind::Ocr("script exhausted".to_string()).into()))
    }
}

/// Detector settings for synthetic frames: white shapes on black are found by
/// a plain threshold.
pub fn config() -> LprConfig {
    let mut config = LprConfig::default();
    config.frame.method = EdgeMethod::Threshold;
    config
}

pub fn black_frame(width: u32, height: u32) -> RgbImage {
    RgbImage::new(width, height)
}

pub fn with_rect(mut frame: RgbImage, x: i32, y: i32, width: u32, height: u32) -> RgbImage {
    drawing::draw_filled_rect_mut(&mut frame, Rect::at(x, y).of_size(width, height), WHITE);
    frame
}
