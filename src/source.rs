//! Where frames come from. A source is an iterator of frames, `None` means the
//! stream is exhausted.
//!
//! Still images are read with `image`. Video files and stream URIs are decoded
//! with ffmpeg when the `video` feature is enabled.

use image::RgbImage;
use log::debug;

use std::fs;
use std::path::{ Path, PathBuf };
use std::vec::IntoIter;

use crate::error::LprError;

/// Extensions `ImageFiles` picks up from a directory, compared case insensitively.
pub const IMAGE_EXTENSIONS: [&str; 7] = ["jpg", "jpeg", "png", "bmp", "tif", "tiff", "webp"];

#[derive(Debug, Clone)]
pub struct SourceFrame {
    /// File name, or stream name and frame number, for log lines and output files.
    pub name: String,
    pub image: RgbImage,
}

pub trait FrameSource: Iterator<Item = Result<SourceFrame, LprError>> {}

impl<T> FrameSource for T where T: Iterator<Item = Result<SourceFrame, LprError>> {}

/// A single image file, or every image in a directory in file name order.
///
/// Files are decoded lazily, one per `next` call. A file that fails to decode
/// is yielded as an error and iteration goes on with the next one.
#[derive(Debug)]
pub struct ImageFiles {
    paths: IntoIter<PathBuf>,
}

impl ImageFiles {

    pub fn open(path: impl AsRef<Path>) -> Result<Self, LprError> {
        let path = path.as_ref();
        let paths = if fs::metadata(path)?.is_dir() {
            let mut paths = Vec::new();
            for entry in fs::read_dir(path)? {
                let p = entry?.path();
                if p.is_file() && is_image(&p) {
                    paths.push(p);
                }
            }
            paths.sort();
            debug!("{} images in {}", paths.len(), path.display());
            paths
        } else {
            vec![path.to_path_buf()]
        };
        Ok(Self { paths: paths.into_iter() })
    }

    /// Frames left in the source.
    pub fn remaining(&self) -> usize {
        self.paths.len()
    }
}

impl Iterator for ImageFiles {
    type Item = Result<SourceFrame, LprError>;

    fn next(&mut self) -> Option<Self::Item> {
        let path = self.paths.next()?;
        let name = path.file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        Some(image::open(&path)
            .map(|img| SourceFrame { name, image: img.to_rgb8() })
            .map_err(LprError::from))
    }
}

/// Picks the source for `input`: a directory or an image file is read as
/// still images, anything else is handed to the video decoder.
pub fn open_source(input: &str) -> Result<Box<dyn FrameSource>, LprError> {
    let path = Path::new(input);
    if path.is_dir() || is_image(path) {
        return Ok(Box::new(ImageFiles::open(path)?));
    }
    open_stream(input)
}

#[cfg(feature = "video")]
fn open_stream(input: &str) -> Result<Box<dyn FrameSource>, LprError> {
    Ok(Box::new(VideoFrames::open(input)?))
}

#[cfg(not(feature = "video"))]
fn open_stream(input: &str) -> Result<Box<dyn FrameSource>, LprError> {
    debug!("built without video support, reading {} as an image", input);
    Ok(Box::new(ImageFiles::open(input)?))
}

#[cfg(feature = "video")]
pub use self::video::VideoFrames;

#[cfg(feature = "video")]
mod video {

    use ffmpeg::util::error::{ EAGAIN, EWOULDBLOCK };
    use ffmpeg::format::Pixel;
    use ffmpeg::software::scaling;
    use ffmpeg::util::frame::Video;
    use ffmpeg_next as ffmpeg;
    use image::RgbImage;
    use log::debug;

    use std::path::Path;

    use crate::error::{ LprError, LprErrorKind };

    use super::SourceFrame;

    fn video_error(e: impl ToString) -> LprError {
        LprErrorKind::Video(e.to_string()).into()
    }

    /// Frames of a video file or stream URI, decoded one at a time and
    /// converted to RGB. The decoder is drained after the last packet, so
    /// every buffered frame comes out before `None`.
    pub struct VideoFrames {
        input: ffmpeg::format::context::Input,
        decoder: ffmpeg::decoder::Video,
        scaler: scaling::Context,
        stream_index: usize,
        label: String,
        count: u64,
        flushed: bool,
        done: bool,
    }

    impl VideoFrames {

        pub fn open(uri: &str) -> Result<Self, LprError> {
            ffmpeg::init().map_err(video_error)?;
            let path = Path::new(uri).to_path_buf();
            let input = ffmpeg::format::input(&path).map_err(video_error)?;
            let stream = input.streams()
                .best(ffmpeg::media::Type::Video)
                .ok_or_else(|| video_error(format!("no video stream in {}", uri)))?;
            let stream_index = stream.index();
            let context = ffmpeg::codec::context::Context::from_parameters(stream.parameters())
                .map_err(video_error)?;
            let decoder = context.decoder().video().map_err(video_error)?;
            let scaler = scaling::Context::get(
                decoder.format(), decoder.width(), decoder.height(),
                Pixel::RGB24, decoder.width(), decoder.height(),
                scaling::Flags::BILINEAR,
            ).map_err(video_error)?;
            debug!("{}: {}x{} video", uri, decoder.width(), decoder.height());

            let label = path.file_stem()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| uri.to_string());
            Ok(Self { input, decoder, scaler, stream_index, label, count: 0, flushed: false, done: false })
        }

        /// Frames decoded so far.
        pub fn count(&self) -> u64 {
            self.count
        }

        fn convert(&mut self, decoded: &Video) -> Result<SourceFrame, LprError> {
            let mut rgb = Video::empty();
            self.scaler.run(decoded, &mut rgb).map_err(video_error)?;
            let (width, height) = (rgb.width(), rgb.height());
            let stride = rgb.stride(0);
            let row = width as usize * 3;
            let plane = rgb.data(0);
            let mut buf = Vec::with_capacity(row * height as usize);
            for y in 0..height as usize {
                buf.extend_from_slice(&plane[y * stride..y * stride + row]);
            }
            let image = RgbImage::from_raw(width, height, buf)
                .ok_or_else(|| video_error("decoded frame is smaller than its size"))?;
            self.count += 1;
            Ok(SourceFrame { name: format!("{}-{:06}", self.label, self.count), image })
        }

        /// Hands the next packet of our stream to the decoder, or signals end
        /// of input once the container has none left.
        fn feed(&mut self) -> Result<(), LprError> {
            loop {
                let next = self.input.packets()
                    .next()
                    .map(|(stream, packet)| (stream.index(), packet));
                match next {
                    Some((index, packet)) => {
                        if index != self.stream_index {
                            continue;
                        }
                        if let Err(e) = self.decoder.send_packet(&packet) {
                            if !is_retryable(&e) {
                                return Err(video_error(e));
                            }
                        }
                        return Ok(());
                    },
                    None => {
                        self.flushed = true;
                        return self.decoder.send_eof().map_err(video_error);
                    },
                }
            }
        }
    }

    impl Iterator for VideoFrames {
        type Item = Result<SourceFrame, LprError>;

        fn next(&mut self) -> Option<Self::Item> {
            while !self.done {
                let mut decoded = Video::empty();
                match self.decoder.receive_frame(&mut decoded) {
                    Ok(()) => return Some(self.convert(&decoded)),
                    Err(ffmpeg::Error::Eof) => {
                        debug!("{}: video is over after {} frames", self.label, self.count);
                        self.done = true;
                    },
                    Err(e) if is_retryable(&e) && !self.flushed => {
                        if let Err(e) = self.feed() {
                            self.done = true;
                            return Some(Err(e));
                        }
                    },
                    Err(e) if is_retryable(&e) => self.done = true,
                    Err(e) => {
                        self.done = true;
                        return Some(Err(video_error(e)));
                    },
                }
            }
            None
        }
    }

    fn is_retryable(e: &ffmpeg::Error) -> bool {
        matches!(e, ffmpeg::Error::Other { errno } if *errno == EAGAIN || *errno == EWOULDBLOCK)
    }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)))
        .unwrap_or(false)
}
