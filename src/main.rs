use clap::{ value_parser, Arg, ArgAction, ArgMatches, Command };
use log::{ debug, info, warn, LevelFilter };

use std::error::Error;
use std::fs;
use std::io::{ self, BufRead, Write };
use std::path::{ Path, PathBuf };
use std::time::Duration;

use lpr_ocr::{ open_source, AreaRange, DumpObserver, EdgeMethod, Lpr, LprConfig, Optimization, PageSegMode, PlatesImage };


fn cli() -> Command {
    Command::new("lpr")
        .version(env!("CARGO_PKG_VERSION"))
        .author("kingrong")
        .about("Finds license plates in images and reads them with tesseract")
        .arg(Arg::new("INPUT")
            .help("image file, directory of images, or video file / stream URI")
            .required(true)
            .index(1))
        .arg(Arg::new("config")
            .short('c')
            .long("config")
            .help("TOML file with detector settings")
            .value_parser(value_parser!(PathBuf)))
        .arg(Arg::new("optimization")
            .short('o')
            .long("optimization")
            .help("1 grey-basic, 2 hsv-basic, 3 grey-deep, 4 hsv-deep")
            .value_parser(value_parser!(Optimization)))
        .arg(Arg::new("contour")
            .long("contour")
            .help("frame edges: 1 threshold, 2 autothreshold, 3 edge-gradient")
            .value_parser(value_parser!(EdgeMethod)))
        .arg(Arg::new("plate-contour")
            .long("plate-contour")
            .help("plate binarization: 1 threshold, 2 autothreshold, 3 edge-gradient")
            .value_parser(value_parser!(EdgeMethod)))
        .arg(Arg::new("psm")
            .long("psm")
            .help("page segmentation: 6 single-block, 5 single-block-vert-text, 10 single-char")
            .value_parser(value_parser!(PageSegMode)))
        .arg(Arg::new("min-confidence")
            .long("min-confidence")
            .help("lowest OCR confidence accepted, 0 to 100")
            .value_parser(value_parser!(i32)))
        .arg(Arg::new("min-area")
            .long("min-area")
            .help("smallest contour area of a plate candidate")
            .value_parser(value_parser!(u32)))
        .arg(Arg::new("max-area")
            .long("max-area")
            .help("largest contour area of a plate candidate")
            .value_parser(value_parser!(u32)))
        .arg(Arg::new("ocr-timeout")
            .long("ocr-timeout")
            .help("give up on a single recognition after this many milliseconds")
            .value_parser(value_parser!(u64)))
        .arg(Arg::new("debug")
            .short('d')
            .long("debug")
            .help("more log output, repeat for more")
            .action(ArgAction::Count))
        .arg(Arg::new("gui")
            .short('g')
            .long("gui")
            .help("show every annotated frame in a window")
            .action(ArgAction::SetTrue))
        .arg(Arg::new("pause")
            .short('p')
            .long("pause")
            .help("wait for Enter after a frame with plates")
            .action(ArgAction::SetTrue))
        .arg(Arg::new("dump-dir")
            .long("dump-dir")
            .help("write every intermediate raster to this directory")
            .value_parser(value_parser!(PathBuf)))
        .arg(Arg::new("save-dir")
            .long("save-dir")
            .help("write annotated frames and plate crops to this directory")
            .value_parser(value_parser!(PathBuf)))
}

fn init_logger(verbosity: u8) {
    let level = match verbosity {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

/// Config file if given, then command line overrides on top.
fn load_config(matches: &ArgMatches) -> Result<LprConfig, Box<dyn Error>> {
    let mut config = match matches.get_one::<PathBuf>("config") {
        Some(path) => LprConfig::from_toml_file(path)?,
        None => LprConfig::default(),
    };
    if let Some(optimization) = matches.get_one::<Optimization>("optimization") {
        config.optimization = *optimization;
    }
    if let Some(method) = matches.get_one::<EdgeMethod>("contour") {
        config.frame.method = *method;
    }
    if let Some(method) = matches.get_one::<EdgeMethod>("plate-contour") {
        config.plate.method = *method;
    }
    if let Some(psm) = matches.get_one::<PageSegMode>("psm") {
        config.ocr.page_seg_mode = *psm;
    }
    if let Some(min) = matches.get_one::<i32>("min-confidence") {
        config.ocr.min_confidence = *min;
    }
    if let Some(ms) = matches.get_one::<u64>("ocr-timeout") {
        config.ocr.timeout_ms = Some(*ms);
    }
    let min_area = matches.get_one::<u32>("min-area").copied().unwrap_or(config.area.min);
    let max_area = matches.get_one::<u32>("max-area").copied().unwrap_or(config.area.max);
    config.area = AreaRange::new(min_area, max_area);
    config.validate()?;
    Ok(config)
}

fn save_plates(dir: &Path, name: &str, res: &PlatesImage) -> Result<(), Box<dyn Error>> {
    let stem = Path::new(name).file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_else(|| name.to_string());
    res.contours.save(dir.join(format!("{}-plates.png", stem)))?;
    for (i, plate) in res.plates.iter().enumerate() {
        plate.ocr_image.save(dir.join(format!("{}-{}-{}.png", stem, i, plate.text)))?;
    }
    Ok(())
}

fn wait_for_enter() -> io::Result<()> {
    print!("press Enter to continue ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(())
}

#[cfg(feature = "display")]
fn show(res: &PlatesImage) {
    let img = image::DynamicImage::ImageRgb8(res.contours.clone()).to_rgba8();
    imageproc::window::display_image("lpr", &img, 700, 700);
}

#[cfg(not(feature = "display"))]
fn show(_res: &PlatesImage) {
    warn!("built without the display feature, --gui is ignored");
}

fn main() -> Result<(), Box<dyn Error>> {
    let matches = cli().get_matches();
    init_logger(matches.get_count("debug"));

    let config = load_config(&matches)?;
    let input = matches.get_one::<String>("INPUT").ok_or("input is required")?;
    let gui = matches.get_flag("gui");
    let pause = matches.get_flag("pause");

    let mut lpr = Lpr::new(config)?;
    if let Some(dir) = matches.get_one::<PathBuf>("dump-dir") {
        fs::create_dir_all(dir)?;
        lpr.set_observer(Box::new(DumpObserver::new(dir)));
    }
    let save_dir = matches.get_one::<PathBuf>("save-dir");
    if let Some(dir) = save_dir {
        fs::create_dir_all(dir)?;
    }
    if let Some(ms) = lpr.config().ocr.timeout_ms {
        debug!("recognition limited to {:?}", Duration::from_millis(ms));
    }

    let mut frames = 0u64;
    for frame in open_source(input)? {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                warn!("skipping unreadable frame: {}", e);
                continue;
            }
        };
        frames += 1;
        debug!("frame {}: {}", frames, frame.name);

        let res = lpr.detect_plates(&frame.image);
        for plate in &res.plates {
            println!("** Plates found: {}   (confidence:{})", plate.text, plate.confidence);
        }
        if let Some(dir) = save_dir {
            if let Err(e) = save_plates(dir, &frame.name, &res) {
                warn!("could not save results for {}: {}", frame.name, e);
            }
        }
        if gui {
            show(&res);
        }
        if pause && !res.is_empty() {
            wait_for_enter()?;
        }
    }
    info!("{} frames processed", frames);
    println!("source exhausted");

    Ok(())
}
