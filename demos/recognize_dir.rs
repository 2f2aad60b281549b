use std::error::Error;
use std::env::args;
use std::process;
use std::time::Instant;

use lpr_ocr::{ ImageFiles, Lpr, LprConfig };

fn main() -> Result<(), Box<dyn Error>> {
    let mut args = args();
    args.next();
    let path = match args.next() {
        Some(path) => path,
        None => {
            eprintln!("usage: recognize_dir <image dir> [config.toml]");
            process::exit(1);
        }
    };
    let config = match args.next() {
        Some(file) => LprConfig::from_toml_file(file)?,
        None => LprConfig::default(),
    };
    let mut lpr = Lpr::new(config)?;

    let mut speeds = Vec::new();
    let mut scores = Vec::new();
    let mut total_amount = 0;
    let mut success = 0;
    for frame in ImageFiles::open(&path)? {
        let frame = match frame {
            Ok(frame) => frame,
            Err(e) => {
                eprintln!("skipped: {}", e);
                continue;
            }
        };
        let before = Instant::now();
        let res = lpr.detect_plates(&frame.image);
        let speed = before.elapsed().as_millis();
        total_amount += 1;
        speeds.push(speed);
        if let Some(plate) = res.plates.iter().max_by_key(|p| p.confidence) {
            scores.push(plate.confidence);
            success += 1;
        }
        let texts: Vec<&str> = res.plates.iter().map(|p| p.text.as_str()).collect();
        println!("file: {}, res: {:?}, speed: {}", frame.name, texts, speed);
    }

    let average_score = if scores.is_empty() { 0.0 } else { scores.iter().sum::<i32>() as f32 / scores.len() as f32 };
    let average_speed = if speeds.is_empty() { 0 } else { speeds.iter().sum::<u128>() / speeds.len() as u128 };
    println!("total_amount: {}, success: {}, average_score: {}, average_speed: {}",
        total_amount, success, average_score, average_speed);
    Ok(())
}
