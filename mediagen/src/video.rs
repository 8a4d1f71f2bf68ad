//! Remote video generation jobs: create, poll until done, download.

use std::{
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use color_eyre::{Result, eyre::bail};
use log::{error, warn};
use tokio::time::sleep;

use crate::{
    MediaGenError, config, media,
    preprocess::{self, ImageToolBox, ImageToolKind, PreparedImage},
};

pub mod api;
pub mod status;

use api::{PollReply, VideoApi};
use status::{JobState, Observation, StatusLog, next_state};

pub const MODEL_ALIASES: &[(&str, &str)] = &[
    ("veo-3.1", "veo-3.1-generate-preview"),
    ("sora-2-pro", "sora-2-pro"),
];

/// Models that accept an `input_reference` image.
pub const IMAGE_CAPABLE_MODELS: &[&str] = &["sora-2-pro"];

pub fn resolve_model(alias: &str) -> String {
    config::resolve_alias(MODEL_ALIASES, alias)
}

pub fn supports_input_image(model_id: &str) -> bool {
    IMAGE_CAPABLE_MODELS.contains(&model_id)
}

/// Everything one `video-gen` run needs.
#[derive(Debug, Clone)]
pub struct VideoConfig {
    /// Model name; aliases from [`MODEL_ALIASES`] are resolved, anything else is sent as is.
    pub model_alias: String,
    pub prompt: String,
    /// Provider size, e.g. `720P` or `1280x720`. Only `WxH` triggers resizing.
    pub size_spec: String,
    pub duration_seconds: String,
    pub output_dir: PathBuf,
    pub input_image: Option<PathBuf>,
    pub image_tool: ImageToolKind,
    pub base_url: String,
    pub poll_interval: Duration,
    /// Measured from job creation.
    pub timeout: Duration,
}

impl Default for VideoConfig {
    fn default() -> Self {
        Self {
            model_alias: "veo-3.1".into(),
            prompt: "A cat sitting on a windowsill".into(),
            size_spec: "720P".into(),
            duration_seconds: "8".into(),
            output_dir: PathBuf::from("."),
            input_image: None,
            image_tool: ImageToolKind::default(),
            base_url: config::DEFAULT_VIDEO_BASE_URL.into(),
            poll_interval: config::DEFAULT_POLL_INTERVAL,
            timeout: config::DEFAULT_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRequest {
    pub model_id: String,
    pub prompt: String,
    pub size_spec: String,
    pub duration_seconds: String,
    /// Only ever set for models in [`IMAGE_CAPABLE_MODELS`].
    pub input_image: Option<PathBuf>,
}

impl JobRequest {
    /// Drops `input_image` with a warning when the model can't take one.
    pub fn new(
        model_id: String,
        prompt: String,
        size_spec: String,
        duration_seconds: String,
        input_image: Option<PathBuf>,
    ) -> Self {
        let input_image = match input_image {
            Some(_) if !supports_input_image(&model_id) => {
                warn!(
                    "{}",
                    MediaGenError::UnsupportedImageForModel {
                        model: model_id.clone()
                    }
                );
                None
            }
            other => other,
        };

        Self {
            model_id,
            prompt,
            size_spec,
            duration_seconds,
            input_image,
        }
    }

    pub fn from_config(config: &VideoConfig) -> Self {
        Self::new(
            resolve_model(&config.model_alias),
            config.prompt.clone(),
            config.size_spec.clone(),
            config.duration_seconds.clone(),
            config.input_image.clone(),
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobHandle {
    pub id: String,
}

#[derive(Debug)]
pub struct VideoOutcome {
    pub job: JobHandle,
    pub path: PathBuf,
    pub size_bytes: u64,
    /// Since job creation.
    pub elapsed: Duration,
}

impl VideoOutcome {
    pub fn size_mb(&self) -> f64 {
        self.size_bytes as f64 / (1024.0 * 1024.0)
    }
}

pub struct JobClient {
    api: VideoApi,
    config: VideoConfig,
    image_tool: ImageToolBox,
    temp_dir: PathBuf,
}

impl JobClient {
    pub fn new(config: VideoConfig, api_key: String) -> Result<Self> {
        Ok(Self {
            api: VideoApi::new(config.base_url.clone(), api_key)?,
            image_tool: config.image_tool.make(),
            temp_dir: std::env::temp_dir(),
            config,
        })
    }

    pub fn with_image_tool(mut self, image_tool: ImageToolBox) -> Self {
        self.image_tool = image_tool;
        self
    }

    pub fn with_temp_dir(mut self, temp_dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = temp_dir.into();
        self
    }

    pub fn config(&self) -> &VideoConfig {
        &self.config
    }

    /// One full job lifecycle. A resized temporary image is removed before
    /// returning, whatever the outcome.
    pub async fn run(&self) -> Result<VideoOutcome> {
        let request = JobRequest::from_config(&self.config);
        let prepared = self.prepare_upload(&request)?;

        let outcome = self
            .run_job(&request, prepared.as_ref().map(PreparedImage::path))
            .await;

        if let Some(prepared) = prepared {
            prepared.cleanup();
        }
        outcome
    }

    fn prepare_upload(&self, request: &JobRequest) -> Result<Option<PreparedImage>> {
        let Some(path) = &request.input_image else {
            return Ok(None);
        };
        if !path.exists() {
            bail!(MediaGenError::MissingInputFile { path: path.clone() });
        }

        Ok(Some(preprocess::prepare_input_image(
            path,
            &request.size_spec,
            self.image_tool.as_ref(),
            &self.temp_dir,
        )))
    }

    async fn run_job(&self, request: &JobRequest, upload: Option<&Path>) -> Result<VideoOutcome> {
        println!("[Step 1] Creating video generation task...");
        let job = self.api.create_job(request, upload).await?;
        let started = Instant::now();
        println!("[Step 1] Task created: {}\n", job.id);

        println!("[Step 2] Waiting for video generation...");
        self.wait_for_completion(&job, started).await?;
        println!("[Step 2] Video generation completed!\n");

        println!("[Step 3] Downloading video...");
        let path = media::timestamped_path(
            &self.config.output_dir,
            "generated_video",
            media::timestamp_millis(),
            "mp4",
        );
        let size_bytes = self.api.download(&job, &path).await?;
        println!("[Step 3] Video downloaded: {}\n", path.display());

        Ok(VideoOutcome {
            job,
            path,
            size_bytes,
            elapsed: started.elapsed(),
        })
    }

    /// Polls until the job succeeds. Failure and timeout end the run.
    pub async fn wait_for_completion(&self, job: &JobHandle, started: Instant) -> Result<()> {
        let deadline = self.config.timeout;
        let mut state = JobState::Pending;
        let mut status_log = StatusLog::default();

        loop {
            state = next_state(state, Observation::Unavailable, started.elapsed(), deadline);
            if state == JobState::TimedOut {
                bail!(MediaGenError::JobTimedOut { after: deadline });
            }

            match self.api.fetch_status(job).await? {
                PollReply::Transient(err) => error!("{err}"),
                PollReply::Report(report) => {
                    let elapsed = started.elapsed();
                    if let Some(line) = status_log.observe(&report.status, elapsed) {
                        println!("{line}");
                    }

                    state = next_state(state, Observation::Report(&report), elapsed, deadline);
                    match &state {
                        JobState::Succeeded => return Ok(()),
                        JobState::Failed { detail } => {
                            bail!(MediaGenError::JobFailed {
                                detail: detail.clone()
                            })
                        }
                        JobState::TimedOut => {
                            bail!(MediaGenError::JobTimedOut { after: deadline })
                        }
                        JobState::Pending => {}
                    }
                }
            }

            sleep(self.config.poll_interval).await;
        }
    }
}
