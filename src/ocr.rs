//! Text recognition: the engine seam, the Tesseract engine behind it, a
//! deadline wrapper and the sanitizer applied to whatever comes back.

use image::GrayImage;
use log::debug;

use std::sync::mpsc::{ self, RecvTimeoutError, Sender };
use std::thread::{ self, JoinHandle };
use std::time::Duration;

use crate::error::{ LprError, LprErrorKind };

/// Raw engine output for one crop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recognition {
    pub text: String,
    /// Mean confidence, 0 to 100.
    pub confidence: i32,
}

impl Recognition {

    pub fn new(text: impl Into<String>, confidence: i32) -> Self {
        Self { text: text.into(), confidence }
    }
}

/// An OCR engine. Calls block until the engine answers, and an engine handles
/// a single crop at a time, hence `&mut self`.
pub trait Recognizer {
    fn recognize(&mut self, image: &GrayImage) -> Result<Recognition, LprError>;
}

impl<R: Recognizer + ?Sized> Recognizer for Box<R> {
    fn recognize(&mut self, image: &GrayImage) -> Result<Recognition, LprError> {
        (**self).recognize(image)
    }
}

/// Keeps ASCII digits and uppercase letters, in order. Lowercase is dropped,
/// not folded.
pub fn sanitize(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit() || c.is_ascii_uppercase()).collect()
}

type Job = (GrayImage, Sender<Result<Recognition, LprError>>);

/// Runs a recognizer on its own thread and gives up waiting on a crop after
/// `timeout`.
///
/// The wrapped engine is built on the worker thread and never leaves it. A
/// timed out recognition keeps running there, later crops queue behind it and
/// their deadline counts from submission.
pub struct TimedRecognizer {
    jobs: Option<Sender<Job>>,
    worker: Option<JoinHandle<()>>,
    timeout: Duration,
    stalled: bool,
}

impl TimedRecognizer {

    /// Starts the worker and waits for `make` to finish, so engine start up
    /// failures surface here like they would without the wrapper.
    pub fn spawn<R, F>(make: F, timeout: Duration) -> Result<Self, LprError>
    where R: Recognizer,
          F: FnOnce() -> Result<R, LprError> + Send + 'static
    {
        let (jobs, inbox) = mpsc::channel::<Job>();
        let (ready_tx, ready_rx) = mpsc::channel::<Result<(), LprError>>();
        let worker = thread::Builder::new()
            .name("lpr-ocr".to_string())
            .spawn(move || {
                let mut engine = match make() {
                    Ok(engine) => engine,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                let _ = ready_tx.send(Ok(()));
                for (image, reply) in inbox {
                    // nobody listens any more if the caller timed out
                    let _ = reply.send(engine.recognize(&image));
                }
                debug!("recognition worker stopped");
            })?;

        match ready_rx.recv() {
            Ok(Ok(())) => {},
            Ok(Err(e)) => return Err(e),
            Err(_) => return Err(LprErrorKind::OcrInit("recognition worker died during start up".to_string()).into()),
        }
        Ok(Self { jobs: Some(jobs), worker: Some(worker), timeout, stalled: false })
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }
}

impl Recognizer for TimedRecognizer {
    fn recognize(&mut self, image: &GrayImage) -> Result<Recognition, LprError> {
        let jobs = self.jobs.as_ref().ok_or(LprErrorKind::OcrUnavailable)?;
        let (reply, answer) = mpsc::channel();
        jobs.send((image.clone(), reply)).map_err(|_| LprErrorKind::OcrUnavailable)?;
        match answer.recv_timeout(self.timeout) {
            Ok(res) => res,
            Err(RecvTimeoutError::Timeout) => {
                self.stalled = true;
                Err(LprErrorKind::OcrTimeout(self.timeout).into())
            },
            Err(RecvTimeoutError::Disconnected) => Err(LprErrorKind::OcrUnavailable.into()),
        }
    }
}

impl Drop for TimedRecognizer {
    fn drop(&mut self) {
        // closing the queue ends the worker loop, which drops the engine
        self.jobs.take();
        if let Some(worker) = self.worker.take() {
            // a stuck engine call would block the join forever
            if !self.stalled {
                let _ = worker.join();
            }
        }
    }
}

#[cfg(feature = "tesseract")]
pub use self::engine::TesseractEngine;

#[cfg(feature = "tesseract")]
mod engine {

    use image::GrayImage;
    use log::{ debug, warn };
    use tesseract::Tesseract;

    use crate::config::{ OcrSettings, WHITELIST };
    use crate::error::{ LprError, LprErrorKind };

    use super::{ Recognition, Recognizer };

    /// Tesseract instance restricted to plate characters. The handle is
    /// acquired in `new` and released when the engine is dropped.
    pub struct TesseractEngine {
        tess: Option<Tesseract>,
        settings: OcrSettings,
    }

    impl TesseractEngine {

        pub fn new(settings: &OcrSettings) -> Result<Self, LprError> {
            let tess = Self::init(settings)?;
            debug!("tesseract ready, language {}, page mode {:?}", settings.language, settings.page_seg_mode);
            Ok(Self { tess: Some(tess), settings: settings.clone() })
        }

        fn init(settings: &OcrSettings) -> Result<Tesseract, LprError> {
            let datapath = match &settings.datapath {
                Some(path) => Some(path.to_str().ok_or_else(|| {
                    LprErrorKind::OcrInit(format!("data path {} is not valid UTF-8", path.display()))
                })?),
                None => None,
            };
            let psm = settings.page_seg_mode.code().to_string();
            let tess = Tesseract::new(datapath, Some(settings.language.as_str()))
                .map_err(|e| LprErrorKind::OcrInit(e.to_string()))?
                .set_variable("tessedit_char_whitelist", WHITELIST)
                .map_err(|e| LprErrorKind::OcrInit(e.to_string()))?
                .set_variable("tessedit_pageseg_mode", &psm)
                .map_err(|e| LprErrorKind::OcrInit(e.to_string()))?;
            Ok(tess)
        }

        fn run(tess: Tesseract, image: &GrayImage) -> Result<(Tesseract, Recognition), LprError> {
            let (width, height) = image.dimensions();
            let mut tess = tess
                .set_frame(image.as_raw(), width as i32, height as i32, 1, width as i32)
                .map_err(|e| LprErrorKind::Ocr(e.to_string()))?
                .recognize()
                .map_err(|e| LprErrorKind::Ocr(e.to_string()))?;
            let text = tess.get_text().map_err(|e| LprErrorKind::Ocr(e.to_string()))?;
            let confidence = tess.mean_text_conf();
            Ok((tess, Recognition { text, confidence }))
        }
    }

    impl Recognizer for TesseractEngine {
        fn recognize(&mut self, image: &GrayImage) -> Result<Recognition, LprError> {
            let tess = match self.tess.take() {
                Some(tess) => tess,
                None => Self::init(&self.settings)?,
            };
            match Self::run(tess, image) {
                Ok((tess, recognition)) => {
                    self.tess = Some(tess);
                    Ok(recognition)
                },
                Err(e) => {
                    // the failed call consumed the handle, bring up a fresh one
                    match Self::init(&self.settings) {
                        Ok(tess) => self.tess = Some(tess),
                        Err(init) => warn!("tesseract did not come back: {}", init),
                    }
                    Err(e)
                },
            }
        }
    }
}

/// Builds the recognizer described by `settings`, wrapped in a deadline when a
/// timeout is set.
#[cfg(feature = "tesseract")]
pub fn build_recognizer(settings: &crate::config::OcrSettings) -> Result<Box<dyn Recognizer>, LprError> {
    match settings.timeout_ms {
        Some(ms) => {
            let settings = settings.clone();
            let timed = TimedRecognizer::spawn(move || TesseractEngine::new(&settings), Duration::from_millis(ms))?;
            Ok(Box::new(timed))
        },
        None => Ok(Box::new(TesseractEngine::new(settings)?)),
    }
}
