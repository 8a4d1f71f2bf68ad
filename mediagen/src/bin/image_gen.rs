use std::path::PathBuf;

use clap::Parser;
use color_eyre::Result;
use mediagen::{
    config::{self, Settings},
    image_gen::{self, ImageGenConfig},
};

#[derive(clap::Parser)]
#[command(about = "Generate or edit images through OpenRouter")]
struct Cli {
    /// gemini-pro, seedream, or any OpenRouter model id
    #[arg(default_value = "gemini-pro")]
    model: String,
    #[arg(default_value = "A beautiful sunset over mountains")]
    prompt: String,
    #[arg(default_value = "1:1")]
    aspect_ratio: String,
    #[arg(default_value_t = 1)]
    num_images: usize,
    #[arg(default_value = ".")]
    output_dir: PathBuf,
    /// Edit this image instead of generating from scratch
    input_image: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    mediagen::init_logging();
    let cli = Cli::parse();

    let api_key = config::api_key(config::OPENROUTER_API_KEY_VAR)?;
    let settings = Settings::load()?;

    let config = ImageGenConfig {
        model_alias: cli.model,
        prompt: cli.prompt,
        aspect_ratio: cli.aspect_ratio,
        num_images: cli.num_images,
        output_dir: cli.output_dir,
        input_image: cli.input_image,
        base_url: settings.openrouter_base_url().to_string(),
    };

    println!("[ImageGen] Generating images...");
    println!("[Config] Prompt: {}", config.prompt);
    println!("[Config] Model: {}", image_gen::resolve_model(&config.model_alias));
    println!("[Config] Aspect ratio: {}", config.aspect_ratio);
    println!("[Config] Count: {}", config.num_images);
    if let Some(image) = &config.input_image {
        println!("[Config] Input image: {}", image.display());
    }

    let outcome = image_gen::generate(&config, api_key).await?;

    for path in &outcome.saved {
        println!("Image saved: {}", path.display());
    }
    if outcome.saved.is_empty() {
        println!("No image found in the response. Content:");
        println!("{}", outcome.text.as_deref().unwrap_or("(empty)"));
    } else {
        println!("\nDone! Generated {} image(s)", outcome.saved.len());
    }

    Ok(())
}
