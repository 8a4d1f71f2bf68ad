use std::path::{Path, PathBuf};

use clap::ValueEnum;
use color_eyre::{
    Result,
    eyre::{WrapErr as _, bail},
};
use serde::{Deserialize, Serialize};
use strum::Display;

use crate::{
    MediaGenError, config, media,
    openrouter::{
        ChatMessage, ChatRequest, ContentPart, ImageUrl, MAX_TOKENS, MessageContent, OpenRouter,
        Usage,
    },
};

pub const VISION_MODEL: &str = "google/gemini-3-pro-preview";
pub const DEFAULT_QUESTION: &str = "请描述这张图片的内容";

#[derive(Debug, Clone, Copy, Display, ValueEnum, Serialize, Deserialize, PartialEq, Eq, Default)]
pub enum Language {
    #[default]
    #[strum(to_string = "中文")]
    Chinese,
    #[strum(to_string = "English")]
    English,
}

impl Language {
    pub fn system_prompt(&self) -> &'static str {
        match self {
            Language::Chinese => {
                "你是一个专业的图片分析助手。请用中文回答用户关于图片的问题，回答要详细、准确、有条理。"
            }
            Language::English => {
                "You are a professional image analysis assistant. Please answer user questions \
                 about images in English with detailed, accurate, and well-organized responses."
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct VisionConfig {
    pub image: PathBuf,
    pub question: String,
    pub language: Language,
    pub base_url: String,
}

impl VisionConfig {
    pub fn new(image: PathBuf) -> Self {
        Self {
            image,
            question: DEFAULT_QUESTION.into(),
            language: Language::default(),
            base_url: config::DEFAULT_OPENROUTER_BASE_URL.into(),
        }
    }
}

pub fn build_request(question: &str, language: Language, mime: &str, image: &[u8]) -> ChatRequest {
    ChatRequest {
        model: VISION_MODEL.into(),
        messages: vec![
            ChatMessage::system(language.system_prompt()),
            ChatMessage::user(MessageContent::Parts(vec![
                ContentPart::Text {
                    text: question.to_string(),
                },
                ContentPart::ImageUrl {
                    image_url: ImageUrl {
                        url: media::data_url(mime, image),
                    },
                },
            ])),
        ],
        modalities: None,
        image_config: None,
        max_tokens: MAX_TOKENS,
    }
}

#[derive(Debug)]
pub struct VisionAnswer {
    pub text: String,
    pub usage: Option<Usage>,
}

pub async fn describe(config: &VisionConfig, api_key: String) -> Result<VisionAnswer> {
    let image = read_image(&config.image)?;
    let request = build_request(
        &config.question,
        config.language,
        &media::image_mime_type(&config.image),
        &image,
    );

    let completion = OpenRouter::new(api_key, config.base_url.as_str())
        .complete(&request)
        .await?;

    Ok(VisionAnswer {
        text: completion.message.text().unwrap_or_default(),
        usage: completion.usage,
    })
}

fn read_image(path: &Path) -> Result<Vec<u8>> {
    if !path.exists() {
        bail!(MediaGenError::MissingInputFile {
            path: path.to_path_buf()
        });
    }
    std::fs::read(path).wrap_err_with(|| format!("reading {}", path.display()))
}
