use std::path::PathBuf;

use clap::Parser;
use color_eyre::Result;
use indoc::indoc;
use mediagen::{
    config::{self, Settings},
    preprocess::ImageToolKind,
    video::{self, JobClient, VideoConfig},
};

#[derive(clap::Parser)]
#[command(
    about = "Generate a video with a remote model and download it",
    after_help = indoc!("
        Models: veo-3.1 (veo-3.1-generate-preview), sora-2-pro.
        Other names are passed to the provider unchanged.
        Only sora-2-pro accepts an input image. With a WxH size the image is
        resized to match before upload.

        Requires AIHUBMIX_API_KEY. Endpoint, poll interval, timeout and image tool
        can be overridden in mediagen.ron in the local config directory.")
)]
struct Cli {
    #[arg(default_value = "veo-3.1")]
    model: String,
    #[arg(default_value = "A cat sitting on a windowsill")]
    prompt: String,
    /// e.g. 720P or 1280x720
    #[arg(default_value = "720P")]
    size: String,
    #[arg(default_value = "8")]
    seconds: String,
    #[arg(default_value = ".")]
    output_dir: PathBuf,
    input_image: Option<PathBuf>,
    /// Utility used to probe and resize the input image
    #[arg(long, value_enum)]
    image_tool: Option<ImageToolKind>,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    mediagen::init_logging();
    let cli = Cli::parse();

    let api_key = config::api_key(config::VIDEO_API_KEY_VAR)?;
    let settings = Settings::load()?;

    let config = VideoConfig {
        model_alias: cli.model,
        prompt: cli.prompt,
        size_spec: cli.size,
        duration_seconds: cli.seconds,
        output_dir: cli.output_dir,
        input_image: cli.input_image,
        image_tool: cli.image_tool.unwrap_or(settings.image_tool()),
        base_url: settings.video_base_url().to_string(),
        poll_interval: settings.poll_interval(),
        timeout: settings.timeout(),
    };

    println!("[VideoGen] Starting video generation...");
    println!("[Config] Model: {}", video::resolve_model(&config.model_alias));
    println!("[Config] Prompt: {}", config.prompt);
    println!("[Config] Size: {}", config.size_spec);
    println!("[Config] Duration: {}s", config.duration_seconds);
    if let Some(image) = &config.input_image {
        println!("[Config] Input image: {}", image.display());
    }
    println!();

    let outcome = JobClient::new(config, api_key)?.run().await?;

    let rule = "=".repeat(50);
    println!("{rule}");
    println!("Video saved: {}", outcome.path.display());
    println!("File size: {:.2} MB", outcome.size_mb());
    println!("Total time: {}s", outcome.elapsed.as_secs());
    println!("{rule}");

    Ok(())
}
