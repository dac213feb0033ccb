use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};
use lily58_oled::{Bitmap, FrameEncoder, Reassembler, Rotation, Target};
use tracing::{info, level_filters::LevelFilter};

#[derive(Debug, Parser)]
#[clap(name = "oled_upload", about = "Draw text or an image on a Lily58 OLED")]
struct Args {
    #[clap(subcommand)]
    source: Source,

    /// Which half of the keyboard
    #[clap(long, value_enum, default_value = "left")]
    target: Side,

    /// Clockwise rotation in degrees, a multiple of 45
    #[clap(long, default_value_t = 0, allow_negative_numbers = true)]
    rotation: i32,

    /// Print the frame as text
    #[clap(long)]
    preview: bool,

    /// Print the reports instead of sending them
    #[clap(long)]
    dry_run: bool,
}

#[derive(Debug, Subcommand)]
enum Source {
    Text {
        text: String,
        #[clap(short, default_value_t = 0, allow_negative_numbers = true)]
        x: i32,
        #[clap(short, default_value_t = 0, allow_negative_numbers = true)]
        y: i32,
    },
    Image {
        path: PathBuf,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum Side {
    Left,
    Right,
}

impl From<Side> for Target {
    fn from(side: Side) -> Target {
        match side {
            Side::Left => Target::Left,
            Side::Right => Target::Right,
        }
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_max_level(LevelFilter::DEBUG).init();
    let args = Args::parse();

    let rotation = Rotation::try_from(args.rotation)?;
    let encoder = FrameEncoder::default();
    let frame = match &args.source {
        Source::Text { text, x, y } => encoder.encode_text(text, *x, *y, rotation),
        Source::Image { path } => encoder.encode_file(path, rotation)?,
    };
    info!(bytes = frame.len(), %rotation, "frame encoded");

    if args.preview {
        print!("{}", frame.unpack());
    }

    let target = Target::from(args.target);
    if args.dry_run {
        return dry_run(&encoder, &frame, target);
    }
    send(&frame, target)
}

fn dry_run(encoder: &FrameEncoder, frame: &Bitmap, target: Target) -> anyhow::Result<()> {
    let upload = encoder.upload(frame, target)?;
    let mut receiver = Reassembler::new(target, frame.len(), encoder.config().report)?;
    for chunk in upload.iter() {
        let report = chunk.to_report()?;
        println!("{:02x?}", report);
        if let Some(rebuilt) = receiver.feed(&report)? {
            anyhow::ensure!(rebuilt == frame.as_bytes(), "reassembled frame differs");
            info!(reports = upload.len(), "dry run reassembled the frame");
        }
    }
    Ok(())
}

#[cfg(feature = "hid")]
fn send(frame: &Bitmap, target: Target) -> anyhow::Result<()> {
    let mut link = lily58_oled::hid::open_link(Default::default())?;
    link.upload(frame.as_bytes(), target)?;
    info!(%target, "frame sent");
    Ok(())
}

#[cfg(not(feature = "hid"))]
fn send(_frame: &Bitmap, _target: Target) -> anyhow::Result<()> {
    anyhow::bail!("built without the `hid` feature, use --dry-run or rebuild with --features hid")
}
