//! Side channel for looking at intermediate rasters. Observers never influence
//! detection, the pipeline ignores anything they do.

use image::{ GrayImage, RgbImage };
use log::warn;

use std::fmt;
use std::path::{ Path, PathBuf };

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    Original,
    Edge,
    Optimized,
    Crop,
    Mask,
    Ocr,
}

impl Stage {

    pub fn name(self) -> &'static str {
        match self {
            Stage::Original => "original",
            Stage::Edge => "edge",
            Stage::Optimized => "optimized",
            Stage::Crop => "crop",
            Stage::Mask => "mask",
            Stage::Ocr => "ocr",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

pub trait StageObserver {
    fn frame(&mut self, _stage: Stage, _image: &RgbImage) {}
    fn raster(&mut self, _stage: Stage, _image: &GrayImage) {}
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoopObserver;

impl StageObserver for NoopObserver {}

/// Writes every raster it sees as a PNG under `dir`, named
/// `{frame}-{sequence}-{stage}.png`. A new frame starts with `Stage::Original`.
#[derive(Debug)]
pub struct DumpObserver {
    dir: PathBuf,
    frame: u64,
    seq: u32,
}

impl DumpObserver {

    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self { dir: dir.as_ref().to_path_buf(), frame: 0, seq: 0 }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn next_path(&mut self, stage: Stage) -> PathBuf {
        if stage == Stage::Original {
            self.frame += 1;
            self.seq = 0;
        }
        self.seq += 1;
        self.dir.join(format!("{:06}-{:03}-{}.png", self.frame, self.seq, stage))
    }
}

impl StageObserver for DumpObserver {

    fn frame(&mut self, stage: Stage, image: &RgbImage) {
        let path = self.next_path(stage);
        if let Err(e) = image.save(&path) {
            warn!("could not write {}: {}", path.display(), e);
        }
    }

    fn raster(&mut self, stage: Stage, image: &GrayImage) {
        let path = self.next_path(stage);
        if let Err(e) = image.save(&path) {
            warn!("could not write {}: {}", path.display(), e);
        }
    }
}


#[cfg(test)]
mod test {

    use image::{ GrayImage, RgbImage };

    use super::{ DumpObserver, Stage, StageObserver };

    use std::error::Error;

    #[test]
    fn dump_names_follow_frames() -> Result<(), Box<dyn Error>> {
        let dir = tempfile::tempdir()?;
        let mut dump = DumpObserver::new(dir.path());
        dump.frame(Stage::Original, &RgbImage::new(4, 4));
        dump.raster(Stage::Edge, &GrayImage::new(4, 4));
        dump.frame(Stage::Original, &RgbImage::new(4, 4));
        dump.raster(Stage::Ocr, &GrayImage::new(2, 2));

        assert!(dir.path().join("000001-001-original.png").exists());
        assert!(dir.path().join("000001-002-edge.png").exists());
        assert!(dir.path().join("000002-001-original.png").exists());
        let ocr = image::open(dir.path().join("000002-002-ocr.png"))?;
        assert_eq!((ocr.width(), ocr.height()), (2, 2));
        Ok(())
    }

    #[test]
    fn unwritable_dir_is_not_fatal() {
        let mut dump = DumpObserver::new("/nonexistent/lpr/dump");
        dump.raster(Stage::Mask, &GrayImage::new(2, 2));
    }
}
