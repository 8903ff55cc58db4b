use clap::{Parser, Subcommand};
use color_eyre::Result;
use color_eyre::eyre::bail;
use lookalike::present::{failure_notification, render_summary, success_notification};
use lookalike::{
    CameraSession, FfmpegCamera, ImagePayload, MatchRequestFlow, Session, Settings,
    SettingsOverrides, load_settings,
};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::info;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Match endpoint, overrides `endpoint.url` from the settings.
    #[clap(long, global = true)]
    endpoint: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Find the celebrity you look most like.
    Match {
        /// Photo to upload.
        #[clap(long, short, conflicts_with = "camera")]
        file: Option<PathBuf>,
        /// Take the photo with the camera instead.
        #[clap(long, short, action)]
        camera: bool,
        /// Camera device, overrides `camera.device` from the settings.
        #[clap(long)]
        device: Option<String>,
        /// Print the result as JSON.
        #[clap(long, action)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Args::parse();
    let Command::Match {
        file,
        camera,
        device,
        json,
    } = args.command;

    let settings = load_settings(SettingsOverrides {
        endpoint_url: args.endpoint,
        camera_device: device,
    })?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.logging.level));
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    let image = match (file, camera) {
        (Some(path), _) => Some(ImagePayload::from_file(&path).await?),
        (None, true) => capture_from_camera(&settings).await?,
        (None, false) => None,
    };

    let flow = MatchRequestFlow::from_settings(&settings.endpoint)?;
    let mut session = Session::new();
    if let Some(image) = image {
        session.acquire(image)?;
    }

    match session.run_submission(&flow).await? {
        Ok(result) => {
            info!("{}", success_notification(result));
            if json {
                println!("{}", serde_json::to_string_pretty(result)?);
            } else {
                println!("{}", render_summary(result));
            }
            Ok(())
        }
        Err(failure) => {
            eprintln!("{}", failure_notification(failure));
            bail!("{failure}");
        }
    }
}

/// Open the camera, wait for the user to confirm, and grab a single frame.
///
/// Returns `None` when the user cancels.
async fn capture_from_camera(settings: &Settings) -> Result<Option<ImagePayload>> {
    let camera = FfmpegCamera::new(settings.camera.clone());
    let session = CameraSession::open(&camera, settings.camera.jpeg_quality).await?;

    eprintln!("Camera started! Position yourself and press Enter to capture, or type q to cancel.");
    let mut line = String::new();
    BufReader::new(tokio::io::stdin())
        .read_line(&mut line)
        .await?;

    if line.trim().eq_ignore_ascii_case("q") {
        session.cancel().await?;
        return Ok(None);
    }

    let image = session.capture().await?;
    eprintln!("Photo captured successfully!");
    Ok(Some(image))
}
