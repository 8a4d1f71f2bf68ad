use std::path::{Path, PathBuf};

use color_eyre::{
    Result,
    eyre::{WrapErr as _, bail},
};
use log::debug;
use reqwest::{Client, Response, StatusCode, header, redirect};
use serde::{Deserialize, Serialize};
use tokio::{fs, io::AsyncWriteExt as _};
use tokio_stream::StreamExt;

use crate::{
    MediaGenError, media,
    multipart::{Multipart, MultipartBuilder},
};

use super::{
    JobHandle, JobRequest,
    status::StatusReport,
};

pub const INPUT_REFERENCE_FIELD: &str = "input_reference";

/// Client for the `/v1/videos` job API.
///
/// Redirects are never followed automatically; [`VideoApi::download`] follows
/// exactly one by hand.
#[derive(Debug, Clone)]
pub struct VideoApi {
    client: Client,
    base_url: String,
    api_key: String,
}

#[derive(Debug, Serialize)]
pub struct CreateJobBody<'a> {
    pub model: &'a str,
    pub prompt: &'a str,
    pub size: &'a str,
    pub seconds: &'a str,
}

impl<'a> From<&'a JobRequest> for CreateJobBody<'a> {
    fn from(req: &'a JobRequest) -> Self {
        Self {
            model: &req.model_id,
            prompt: &req.prompt,
            size: &req.size_spec,
            seconds: &req.duration_seconds,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CreateJobResponse {
    id: Option<String>,
}

/// Outcome of one status request.
#[derive(Debug)]
pub enum PollReply {
    Report(StatusReport),
    /// Non-200 answer. The caller retries on the next tick.
    Transient(MediaGenError),
}

/// Multipart upload body: the text fields of `req` plus the image file part.
pub fn multipart_body(req: &JobRequest, filename: &str, mime: &str, image: &[u8]) -> Multipart {
    let fields = CreateJobBody::from(req);
    MultipartBuilder::new()
        .add_field("model", fields.model)
        .add_field("prompt", fields.prompt)
        .add_field("size", fields.size)
        .add_field("seconds", fields.seconds)
        .add_file(INPUT_REFERENCE_FIELD, filename, mime, image)
        .build()
}

impl VideoApi {
    pub fn new(base_url: impl Into<String>, api_key: String) -> Result<Self> {
        let client = Client::builder()
            .redirect(redirect::Policy::none())
            .build()?;
        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// Creates the remote job. `upload`, when given, is sent as the reference image.
    pub async fn create_job(&self, req: &JobRequest, upload: Option<&Path>) -> Result<JobHandle> {
        let request = self
            .client
            .post(self.url("/v1/videos"))
            .bearer_auth(&self.api_key);

        let request = match upload {
            Some(path) => {
                let image = fs::read(path)
                    .await
                    .wrap_err_with(|| format!("reading {}", path.display()))?;
                let filename = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "image".into());
                let multipart =
                    multipart_body(req, &filename, &media::image_mime_type(path), &image);
                request
                    .header(header::CONTENT_TYPE, multipart.content_type)
                    .body(multipart.body)
            }
            None => request.json(&CreateJobBody::from(req)),
        };

        let resp = request.send().await?;
        let status = resp.status();
        let body = resp.text().await?;
        debug!("create response {status}: {body}");

        if status != StatusCode::OK && status != StatusCode::CREATED {
            bail!(MediaGenError::JobCreationFailed {
                status: status.as_u16(),
                body,
            });
        }

        let created: CreateJobResponse = serde_json::from_str(&body)
            .map_err(|e| MediaGenError::parse_failed(format!("{e}: {body}")))?;
        let id = created
            .id
            .filter(|id| !id.is_empty())
            .ok_or_else(|| MediaGenError::parse_failed(format!("missing job id: {body}")))?;

        Ok(JobHandle { id })
    }

    pub async fn fetch_status(&self, job: &JobHandle) -> Result<PollReply> {
        let resp = self
            .client
            .get(self.url(&format!("/v1/videos/{}", job.id)))
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        let status = resp.status();
        let body = resp.text().await?;
        if status != StatusCode::OK {
            return Ok(PollReply::Transient(
                MediaGenError::StatusPollTransientFailure {
                    status: status.as_u16(),
                    body,
                },
            ));
        }

        let value: serde_json::Value = serde_json::from_str(&body)
            .map_err(|e| MediaGenError::parse_failed(format!("{e}: {body}")))?;
        Ok(PollReply::Report(StatusReport::from_json(&value)))
    }

    /// Streams the job's content to `dest` and returns the number of bytes written.
    ///
    /// The body goes to `<dest>.part` first and is renamed once complete, so
    /// a failed download never leaves a file at `dest`.
    pub async fn download(&self, job: &JobHandle, dest: &Path) -> Result<u64> {
        let resp = self
            .client
            .get(self.url(&format!("/v1/videos/{}/content", job.id)))
            .bearer_auth(&self.api_key)
            .send()
            .await?;

        let resp = match resp.status() {
            StatusCode::OK => resp,
            StatusCode::MOVED_PERMANENTLY | StatusCode::FOUND => self.follow_redirect(resp).await?,
            other => bail!(MediaGenError::DownloadFailed {
                reason: format!("content request returned {other}"),
            }),
        };

        stream_to_file(resp, dest).await
    }

    async fn follow_redirect(&self, resp: Response) -> Result<Response> {
        let location = resp
            .headers()
            .get(header::LOCATION)
            .and_then(|l| l.to_str().ok())
            .ok_or_else(|| MediaGenError::DownloadFailed {
                reason: format!("{} without a Location header", resp.status()),
            })?;
        let target = resp.url().join(location).map_err(|e| MediaGenError::DownloadFailed {
            reason: format!("bad redirect location {location:?}: {e}"),
        })?;
        debug!("following redirect to {target}");

        // plain GET: the bearer token stays with the provider
        let followed = self.client.get(target).send().await?;
        if followed.status() != StatusCode::OK {
            bail!(MediaGenError::DownloadFailed {
                reason: format!("redirect target returned {}", followed.status()),
            });
        }
        Ok(followed)
    }
}

pub fn part_path(dest: &Path) -> PathBuf {
    let mut name = dest.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

async fn stream_to_file(resp: Response, dest: &Path) -> Result<u64> {
    let part = part_path(dest);
    match write_body(resp, &part).await {
        Ok(written) => {
            fs::rename(&part, dest).await?;
            Ok(written)
        }
        Err(e) => {
            let _ = fs::remove_file(&part).await;
            Err(e)
        }
    }
}

async fn write_body(resp: Response, path: &Path) -> Result<u64> {
    let mut file = fs::File::create(path)
        .await
        .wrap_err_with(|| format!("creating {}", path.display()))?;
    let mut stream = resp.bytes_stream();
    let mut written = 0u64;

    while let Some(chunk) = stream.next().await {
        let chunk = chunk.map_err(|e| MediaGenError::DownloadFailed {
            reason: format!("stream error: {e}"),
        })?;
        file.write_all(&chunk).await?;
        written += chunk.len() as u64;
    }
    file.flush().await?;

    Ok(written)
}
