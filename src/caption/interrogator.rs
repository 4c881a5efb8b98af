//! HTTP client for a CLIP interrogator service.
//!
//! The service is external and its protocol is defined here; no off-the-shelf
//! server speaks it. Anything that wraps an interrogator behind these two
//! endpoints will do:
//!
//! - `POST /load` with `{clip_model_name, device, cache_path, download_cache}`,
//!   sent once at startup.
//! - `POST /interrogate` with `{image, mode}` where `image` is a base64 PNG and
//!   `mode` is `"fast"` or `"best"`, answered with `{"prompt": "..."}`.

use super::{CaptionConfig, CaptionMode, CaptionSource};
use anyhow::{anyhow, Context, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use image::{DynamicImage, ImageFormat};
use serde::{Deserialize, Serialize};
use std::io::Cursor;
use std::path::Path;
use std::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Serialize)]
struct LoadRequest<'a> {
    clip_model_name: &'a str,
    device: &'a str,
    cache_path: &'a Path,
    download_cache: bool,
}

#[derive(Debug, Serialize)]
struct InterrogateRequest<'a> {
    image: &'a str,
    mode: &'a str,
}

#[derive(Debug, Deserialize)]
struct InterrogateResponse {
    prompt: String,
}

#[derive(Debug)]
pub struct InterrogatorClient {
    cfg: CaptionConfig,
    client: reqwest::Client,
    runtime: tokio::runtime::Handle,
}

impl InterrogatorClient {
    /// Connect to the service and load the configured model.
    ///
    /// Must be awaited inside a Tokio runtime; the runtime handle is kept so
    /// the synchronous `caption` can drive requests from blocking workers.
    pub async fn load(cfg: CaptionConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(cfg.timeout)
            .user_agent(format!("clip-prompt/{}", env!("CARGO_PKG_VERSION")))
            .build()
            .context("build HTTP client")?;

        info!(
            endpoint = %cfg.endpoint,
            model = %cfg.clip_model_name,
            device = cfg.device.as_str(),
            cache = %cfg.cache_dir.display(),
            "loading caption model"
        );

        let started = Instant::now();
        let url = format!("{}/load", cfg.endpoint.trim_end_matches('/'));
        let response = client
            .post(&url)
            .json(&LoadRequest {
                clip_model_name: &cfg.clip_model_name,
                device: cfg.device.as_str(),
                cache_path: &cfg.cache_dir,
                download_cache: true,
            })
            .send()
            .await
            .with_context(|| format!("connect to caption service at {}", cfg.endpoint))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(anyhow!(
                "caption service refused to load {}: {} {}",
                cfg.clip_model_name,
                status,
                body.trim()
            ));
        }
        info!(elapsed_s = started.elapsed().as_secs_f64(), "caption model ready");

        Ok(Self {
            cfg,
            client,
            runtime: tokio::runtime::Handle::current(),
        })
    }

    pub fn config(&self) -> &CaptionConfig {
        &self.cfg
    }

    async fn interrogate(&self, image_base64: &str, mode: CaptionMode) -> Result<String> {
        let url = format!("{}/interrogate", self.cfg.endpoint.trim_end_matches('/'));
        debug!(
            url = %url,
            mode = mode.as_str(),
            image_kb = image_base64.len() / 1024,
            "interrogate request"
        );

        let started = Instant::now();
        let response = self
            .client
            .post(&url)
            .json(&InterrogateRequest {
                image: image_base64,
                mode: mode.as_str(),
            })
            .send()
            .await
            .context("send interrogate request")?;

        let status = response.status();
        info!(
            status = %status,
            elapsed_s = started.elapsed().as_secs_f64(),
            "interrogate response"
        );
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = %status, body = %body, "interrogate failed");
            return Err(anyhow!("caption service error {}: {}", status, body.trim()));
        }

        let parsed: InterrogateResponse = response
            .json()
            .await
            .context("decode interrogate response")?;
        Ok(parsed.prompt)
    }
}

impl CaptionSource for InterrogatorClient {
    /// Blocks on the async request. Call from a blocking worker, never from an
    /// async task.
    fn caption(&self, image: &DynamicImage, mode: CaptionMode) -> Result<String> {
        let encoded = encode_png_base64(image)?;
        self.runtime.block_on(self.interrogate(&encoded, mode))
    }
}

fn encode_png_base64(image: &DynamicImage) -> Result<String> {
    let mut buf = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .context("encode image as PNG")?;
    Ok(BASE64.encode(&buf))
}
