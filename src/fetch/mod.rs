pub mod specials;

use futures::stream::{self, StreamExt};
use reqwest::Client;
use tracing::{debug, info, warn};

use specials::extract_special_urls;

const MAX_RESPONSE_BYTES: usize = 10_000_000;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("fetch failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("fetch failed: status {0}")]
    Status(u16),

    #[error("fetch failed: empty body")]
    EmptyBody,

    #[error("response too large (>{} bytes)", MAX_RESPONSE_BYTES)]
    TooLarge,
}

/// Downloads the specials page and then every linked specials image, at most
/// `concurrency` at a time. Failures are logged and the image is left out;
/// the result order follows completion, not page order.
pub async fn download_images(client: &Client, page_url: &str, concurrency: usize) -> Vec<Vec<u8>> {
    let urls = match special_image_urls(client, page_url).await {
        Ok(urls) => urls,
        Err(e) => {
            warn!(url = %page_url, error = %e, "could not read specials page");
            return Vec::new();
        }
    };

    if urls.is_empty() {
        warn!(url = %page_url, "no SPECIALS images found on page");
        return Vec::new();
    }
    info!(count = urls.len(), "found SPECIALS image links");

    let outcomes: Vec<_> = stream::iter(urls)
        .map(|url| async move {
            debug!(url = %url, "downloading image");
            let result = download(client, &url).await;
            (url, result)
        })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    let mut images = Vec::with_capacity(outcomes.len());
    for (url, outcome) in outcomes {
        match outcome {
            Ok(bytes) => images.push(bytes),
            Err(e) => warn!(url = %url, error = %e, "failed to download specials image"),
        }
    }

    info!(downloaded = images.len(), "image downloads complete");
    images
}

async fn special_image_urls(client: &Client, page_url: &str) -> Result<Vec<String>, FetchError> {
    let base = url::Url::parse(page_url)?;
    info!(url = %page_url, "fetching specials page");
    let body = download(client, page_url).await?;
    let html = String::from_utf8_lossy(&body);
    Ok(extract_special_urls(&html, &base))
}

async fn download(client: &Client, url: &str) -> Result<Vec<u8>, FetchError> {
    let response = client
        .get(url)
        .header("User-Agent", crate::USER_AGENT)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchError::Status(status.as_u16()));
    }

    if let Some(len) = response.content_length()
        && len as usize > MAX_RESPONSE_BYTES
    {
        return Err(FetchError::TooLarge);
    }

    let mut body = Vec::new();
    let mut stream = response;
    while let Some(chunk) = stream.chunk().await? {
        body.extend_from_slice(&chunk);
        if body.len() > MAX_RESPONSE_BYTES {
            return Err(FetchError::TooLarge);
        }
    }

    if body.is_empty() {
        return Err(FetchError::EmptyBody);
    }
    Ok(body)
}
