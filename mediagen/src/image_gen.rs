//! Text-to-image and image editing through OpenRouter's chat completions.

use std::path::{Path, PathBuf};

use color_eyre::{
    Result,
    eyre::{WrapErr as _, bail},
};
use log::{info, warn};

use crate::{
    MediaGenError, config,
    media::{self, DecodedImage},
    openrouter::{
        ChatMessage, ChatRequest, ContentPart, ImageConfig, ImageUrl, MAX_TOKENS, MessageContent,
        OpenRouter, ResponseMessage,
    },
};

pub const MODEL_ALIASES: &[(&str, &str)] = &[
    ("gemini-pro", "google/gemini-2.5-flash-image"),
    ("seedream", "bytedance-seed/seedream-4.5"),
];

#[derive(Debug, Clone)]
pub struct ImageGenConfig {
    pub model_alias: String,
    pub prompt: String,
    pub aspect_ratio: String,
    /// How many images the caller expects; decides whether file names are numbered.
    pub num_images: usize,
    pub output_dir: PathBuf,
    /// Switches to editing mode: the image is sent along with the prompt.
    pub input_image: Option<PathBuf>,
    pub base_url: String,
}

impl Default for ImageGenConfig {
    fn default() -> Self {
        Self {
            model_alias: "gemini-pro".into(),
            prompt: "A beautiful sunset over mountains".into(),
            aspect_ratio: "1:1".into(),
            num_images: 1,
            output_dir: PathBuf::from("."),
            input_image: None,
            base_url: config::DEFAULT_OPENROUTER_BASE_URL.into(),
        }
    }
}

pub fn resolve_model(alias: &str) -> String {
    config::resolve_alias(MODEL_ALIASES, alias)
}

/// An input image for editing: its MIME type and raw bytes.
pub struct EditSource<'a> {
    pub mime: String,
    pub data: &'a [u8],
}

pub fn build_request(
    model_id: &str,
    prompt: &str,
    aspect_ratio: &str,
    edit: Option<EditSource<'_>>,
) -> ChatRequest {
    let content = match edit {
        Some(source) => MessageContent::Parts(vec![
            ContentPart::Text {
                text: format!("Edit this image: {prompt}"),
            },
            ContentPart::ImageUrl {
                image_url: ImageUrl {
                    url: media::data_url(&source.mime, source.data),
                },
            },
        ]),
        None => MessageContent::Text(format!("Generate an image: {prompt}")),
    };

    ChatRequest {
        model: model_id.to_string(),
        messages: vec![ChatMessage::user(content)],
        modalities: Some(vec!["image", "text"]),
        image_config: Some(ImageConfig {
            aspect_ratio: aspect_ratio.to_string(),
        }),
        max_tokens: MAX_TOKENS,
    }
}

/// An image from the response with the file name it should be saved under.
#[derive(Debug, PartialEq, Eq)]
pub struct NamedImage {
    pub filename: String,
    pub image: DecodedImage,
}

/// Decodes the images in `message`.
///
/// The `images` list is preferred; list-shaped `content` is only looked at
/// when it yields nothing. Names are `generated_image_<ts>.<ext>` for a single
/// expected image, `generated_image_<ts>_<n>.<ext>` otherwise.
pub fn collect_images(
    message: &ResponseMessage,
    num_requested: usize,
    timestamp: i64,
) -> Vec<NamedImage> {
    let decode = |urls: Vec<(usize, &str)>| -> Vec<(usize, DecodedImage)> {
        urls.into_iter()
            .filter_map(|(i, url)| match media::decode_image_data_url(url) {
                Some(image) => Some((i, image)),
                None => {
                    warn!("Skipping image that is not a base64 data URL");
                    None
                }
            })
            .collect()
    };

    let from_images = decode(message.image_urls());
    if !from_images.is_empty() {
        let single = num_requested == 1 && from_images.len() == 1;
        return from_images
            .into_iter()
            .map(|(i, image)| NamedImage {
                filename: image_filename(timestamp, (!single).then_some(i + 1), &image.ext),
                image,
            })
            .collect();
    }

    decode(message.content_image_urls())
        .into_iter()
        .map(|(i, image)| NamedImage {
            filename: image_filename(timestamp, Some(i + 1), &image.ext),
            image,
        })
        .collect()
}

fn image_filename(timestamp: i64, number: Option<usize>, ext: &str) -> String {
    match number {
        Some(n) => format!("generated_image_{timestamp}_{n}.{ext}"),
        None => format!("generated_image_{timestamp}.{ext}"),
    }
}

#[derive(Debug, Default)]
pub struct ImageGenOutcome {
    pub saved: Vec<PathBuf>,
    /// Text the model sent instead of (or along with) images.
    pub text: Option<String>,
}

pub async fn generate(config: &ImageGenConfig, api_key: String) -> Result<ImageGenOutcome> {
    let model_id = resolve_model(&config.model_alias);

    let input = match &config.input_image {
        Some(path) => Some((image_mime(path)?, read_input(path)?)),
        None => None,
    };
    let request = build_request(
        &model_id,
        &config.prompt,
        &config.aspect_ratio,
        input.as_ref().map(|(mime, data)| EditSource {
            mime: mime.clone(),
            data,
        }),
    );

    let completion = OpenRouter::new(api_key, config.base_url.as_str())
        .complete(&request)
        .await?;

    let images = collect_images(
        &completion.message,
        config.num_images,
        media::timestamp_millis(),
    );

    let mut outcome = ImageGenOutcome {
        text: completion.message.text(),
        ..Default::default()
    };
    for NamedImage { filename, image } in images {
        let path = config.output_dir.join(filename);
        std::fs::write(&path, &image.data)
            .wrap_err_with(|| format!("writing {}", path.display()))?;
        info!("saved {} bytes to {}", image.data.len(), path.display());
        outcome.saved.push(path);
    }

    Ok(outcome)
}

fn image_mime(path: &Path) -> Result<String> {
    if !path.exists() {
        bail!(MediaGenError::MissingInputFile {
            path: path.to_path_buf()
        });
    }
    Ok(media::image_mime_type(path))
}

fn read_input(path: &Path) -> Result<Vec<u8>> {
    std::fs::read(path).wrap_err_with(|| format!("reading {}", path.display()))
}

#[cfg(test)]
mod test {
    use expect_test::expect;

    use crate::openrouter::parse_completion;

    use super::*;

    #[test]
    fn text_to_image_request() {
        let req = build_request("google/gemini-2.5-flash-image", "A red fox", "16:9", None);
        let expect = expect![[r#"{"model":"google/gemini-2.5-flash-image","messages":[{"role":"user","content":"Generate an image: A red fox"}],"modalities":["image","text"],"image_config":{"aspect_ratio":"16:9"},"max_tokens":4096}"#]];
        expect.assert_eq(&serde_json::to_string(&req).unwrap());
    }

    #[test]
    fn edit_request_embeds_the_image() {
        let req = build_request(
            "bytedance-seed/seedream-4.5",
            "make it snow",
            "1:1",
            Some(EditSource {
                mime: "image/jpeg".into(),
                data: &[0, 1, 2],
            }),
        );
        let expect = expect![[r#"{"model":"bytedance-seed/seedream-4.5","messages":[{"role":"user","content":[{"type":"text","text":"Edit this image: make it snow"},{"type":"image_url","image_url":{"url":"data:image/jpeg;base64,AAEC"}}]}],"modalities":["image","text"],"image_config":{"aspect_ratio":"1:1"},"max_tokens":4096}"#]];
        expect.assert_eq(&serde_json::to_string(&req).unwrap());
    }

    #[test]
    fn model_aliases() {
        assert_eq!(resolve_model("gemini-pro"), "google/gemini-2.5-flash-image");
        assert_eq!(resolve_model("seedream"), "bytedance-seed/seedream-4.5");
        assert_eq!(resolve_model("openai/gpt-image-1"), "openai/gpt-image-1");
    }

    fn message(json: &str) -> ResponseMessage {
        parse_completion(json).unwrap().message
    }

    #[test]
    fn single_image_is_not_numbered() {
        let msg = message(
            r#"{"choices":[{"message":{"images":[
                {"type":"image_url","image_url":{"url":"data:image/jpeg;base64,AAEC"}}
            ]}}]}"#,
        );
        let images = collect_images(&msg, 1, 42);
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].filename, "generated_image_42.jpg");
        assert_eq!(images[0].image.data, vec![0, 1, 2]);
    }

    #[test]
    fn several_images_are_numbered() {
        let msg = message(
            r#"{"choices":[{"message":{"images":[
                {"type":"image_url","image_url":{"url":"data:image/png;base64,AAEC"}},
                {"type":"image_url","image_url":{"url":"data:image/webp;base64,AAEC"}}
            ]}}]}"#,
        );
        let names: Vec<_> = collect_images(&msg, 2, 42)
            .into_iter()
            .map(|i| i.filename)
            .collect();
        assert_eq!(names, vec!["generated_image_42_1.png", "generated_image_42_2.webp"]);
    }

    #[test]
    fn content_parts_are_the_fallback() {
        let msg = message(
            r#"{"choices":[{"message":{"content":[
                {"type":"text","text":"Sure"},
                {"type":"image_url","image_url":{"url":"data:image/png;base64,AAEC"}}
            ]}}]}"#,
        );
        let images = collect_images(&msg, 1, 7);
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].filename, "generated_image_7_2.png");
    }

    #[test]
    fn text_only_reply_has_no_images() {
        let msg = message(r#"{"choices":[{"message":{"content":"I can't draw that."}}]}"#);
        assert!(collect_images(&msg, 1, 7).is_empty());
        assert_eq!(msg.text().as_deref(), Some("I can't draw that."));
    }

    #[tokio::test]
    async fn missing_input_image_is_fatal() {
        let config = ImageGenConfig {
            input_image: Some("/definitely/not/here.png".into()),
            base_url: "http://127.0.0.1:9".into(),
            ..Default::default()
        };
        let err = generate(&config, "key".into()).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<MediaGenError>(),
            Some(MediaGenError::MissingInputFile { .. })
        ));
    }
}
