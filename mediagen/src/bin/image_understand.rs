use std::path::PathBuf;

use clap::Parser;
use color_eyre::Result;
use mediagen::{
    config::{self, Settings},
    vision::{self, Language, VisionConfig},
};

#[derive(clap::Parser)]
#[command(about = "Ask a vision model about an image")]
struct Cli {
    image: PathBuf,
    #[arg(default_value = vision::DEFAULT_QUESTION)]
    question: String,
    #[arg(value_enum, default_value = "chinese")]
    language: Language,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    mediagen::init_logging();
    let cli = Cli::parse();

    let api_key = config::api_key(config::OPENROUTER_API_KEY_VAR)?;
    let settings = Settings::load()?;

    let config = VisionConfig {
        image: cli.image,
        question: cli.question,
        language: cli.language,
        base_url: settings.openrouter_base_url().to_string(),
    };

    println!("[Vision] Analysing image...");
    println!("[Config] Image: {}", config.image.display());
    println!("[Config] Question: {}", config.question);
    println!("[Config] Model: {}", vision::VISION_MODEL);
    println!("[Config] Language: {}", config.language);
    println!();

    let answer = vision::describe(&config, api_key).await?;

    let rule = "━".repeat(50);
    println!("{rule}\n{}\n{rule}", answer.text);
    if let Some(usage) = answer.usage {
        println!(
            "Tokens: input {}, output {}",
            usage.prompt_tokens, usage.completion_tokens
        );
    }

    Ok(())
}
