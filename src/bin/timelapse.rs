use std::io::Write;
use std::path::PathBuf;

use structopt::StructOpt;

use sd_morph::api::SdClient;
use sd_morph::config::AppConfig;
use sd_morph::frames::FrameStore;
use sd_morph::sequencer::run_sequence;
use sd_morph::video;

/// Generate an evolving image sequence and encode it into a video.
#[derive(StructOpt)]
#[structopt(name = "timelapse", rename_all = "kebab-case")]
struct Opt {
    /// Base URL of the Stable Diffusion WebUI API
    #[structopt(long)]
    api_url: Option<String>,
    /// Directory the numbered frames are written to
    #[structopt(long, parse(from_os_str))]
    out_dir: Option<PathBuf>,
    /// Frames per second of the finished video
    #[structopt(long)]
    fps: Option<u32>,
    /// Video length in seconds (asked interactively when omitted)
    #[structopt(long)]
    seconds: Option<u32>,
    /// Generate a fresh initial image even if frames already exist
    #[structopt(long)]
    regenerate: bool,
    /// Path of the finished video (defaults to a timestamped file in the frame directory)
    #[structopt(long, parse(from_os_str))]
    video: Option<PathBuf>,
}

fn main() {
    tracing_subscriber::fmt::init();
    let opt = Opt::from_args();

    let mut config = AppConfig::load();
    if let Some(url) = opt.api_url {
        config.api_base_url = url;
    }
    if let Some(dir) = opt.out_dir {
        config.output_dir = dir;
    }
    if let Some(fps) = opt.fps {
        config.fps = fps;
    }

    let mut store = match FrameStore::open(&config.output_dir) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("❌ Cannot use {}: {e}", config.output_dir.display());
            std::process::exit(1);
        }
    };

    let seconds = opt
        .seconds
        .unwrap_or_else(|| ask_number("Enter the length of the video in seconds: "));
    let evolve_steps = seconds * config.fps;

    // Offer to reuse the first frame of an earlier run as the seed
    let seed = if !opt.regenerate && store.next_index() > 0 {
        let first = store.frame_path(0);
        let question = format!("Use the existing initial image at {}? (yes/no): ", first.display());
        if ask_yes_no(&question) {
            match image::open(&first) {
                Ok(image) => Some(image),
                Err(e) => {
                    eprintln!("⚠️  Could not read {}: {e}. Generating a fresh one.", first.display());
                    None
                }
            }
        } else {
            None
        }
    } else {
        None
    };

    println!(
        "🎬 Generating {} frames into {} via {}...",
        evolve_steps,
        config.output_dir.display(),
        config.api_base_url
    );

    let client = SdClient::new(&config.api_base_url);
    let produced = run_sequence(&client, &mut store, &config, evolve_steps, seed);

    if store.next_index() == 0 {
        println!("❌ No frames were produced; nothing to encode.");
        std::process::exit(1);
    }
    println!(
        "🖼️  {} new frames saved ({} in the sequence).",
        produced.len(),
        store.next_index()
    );

    let video_path = opt.video.unwrap_or_else(|| config.timestamped_video_path());
    match video::encode_video(&store.frame_pattern(), config.fps, &video_path) {
        Ok(()) => println!("✅ Video written to {}", video_path.display()),
        Err(e) => {
            eprintln!("❌ Encoding failed: {e}");
            std::process::exit(1);
        }
    }
}

/// Yes/no console prompt; anything but yes/y counts as no.
fn ask_yes_no(question: &str) -> bool {
    let answer = read_answer(question).to_lowercase();
    matches!(answer.as_str(), "yes" | "y")
}

/// Numeric console prompt, re-asked until it parses.
fn ask_number(question: &str) -> u32 {
    loop {
        match read_answer(question).parse() {
            Ok(value) => return value,
            Err(_) => println!("Please enter a whole number."),
        }
    }
}

fn read_answer(question: &str) -> String {
    print!("{question}");
    let _ = std::io::stdout().flush();

    let mut line = String::new();
    if std::io::stdin().read_line(&mut line).is_err() {
        return String::new();
    }
    line.trim().to_string()
}
