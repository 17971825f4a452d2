mod types;

pub use types::{Offer, ResponseData};

use chrono::Local;
use futures::stream::{self, StreamExt};
use reqwest::Client;
use tokio::sync::Mutex;
use tracing::{error, info, warn};

use crate::cache::ResponseCache;
use crate::fetch;
use crate::gemini::client::GeminiClient;
use crate::gemini::extract::OfferExtractor;

#[derive(Debug, Clone)]
pub struct DealsConfig {
    pub page_url: String,
    /// Upper bound on in-flight downloads and on in-flight extractions.
    pub concurrency: usize,
}

/// Cache-or-refresh pipeline behind every inbound transport.
pub struct DealsService {
    http: Client,
    gemini: Option<GeminiClient>,
    cache: ResponseCache,
    config: DealsConfig,
    refresh: Mutex<()>,
}

impl DealsService {
    pub fn new(
        http: Client,
        gemini: Option<GeminiClient>,
        cache: ResponseCache,
        config: DealsConfig,
    ) -> Self {
        Self {
            http,
            gemini,
            cache,
            config,
            refresh: Mutex::new(()),
        }
    }

    /// Serves today's cached result, or scrapes and extracts a new one.
    ///
    /// Never fails: every per-image problem is logged and that image's offers
    /// are left out. Runs are serialized so concurrent callers on a stale
    /// cache share one refresh.
    pub async fn todays_deals(&self) -> ResponseData {
        let _running = self.refresh.lock().await;
        let today = Local::now().date_naive();

        if let Some(cached) = self.cache.load_fresh(today).await {
            return cached;
        }

        let offers = match &self.gemini {
            Some(gemini) => self.refresh_offers(gemini).await,
            None => {
                error!("Gemini client unavailable (GEMINI_API_KEY unset); no offers extracted");
                Vec::new()
            }
        };

        let data = ResponseData::new(today, offers);
        if data.offers.is_empty() {
            warn!("no offers extracted; leaving cache untouched");
        } else if let Err(e) = self.cache.store(&data).await {
            error!(path = %self.cache.path().display(), error = %e, "failed to write cache file");
        }

        data
    }

    async fn refresh_offers(&self, oracle: &impl OfferExtractor) -> Vec<Offer> {
        oracle.purge_stale_files().await;
        let images =
            fetch::download_images(&self.http, &self.config.page_url, self.config.concurrency)
                .await;
        extract_all(oracle, images, self.config.concurrency).await
    }
}

/// Runs extraction for every image with bounded parallelism and flattens the
/// per-image offer lists. Failed images contribute nothing.
pub async fn extract_all(
    oracle: &impl OfferExtractor,
    images: Vec<Vec<u8>>,
    concurrency: usize,
) -> Vec<Offer> {
    info!(images = images.len(), "extracting offers from images");

    let outcomes: Vec<_> = stream::iter(images.into_iter().enumerate())
        .map(|(index, image)| async move { (index, oracle.extract_offers(index, image).await) })
        .buffer_unordered(concurrency.max(1))
        .collect()
        .await;

    let mut offers = Vec::new();
    for (index, outcome) in outcomes {
        match outcome {
            Ok(found) => offers.extend(found),
            Err(e) => warn!(index, error = %e, "offer extraction failed for image"),
        }
    }

    info!(offers = offers.len(), "offer extraction complete");
    offers
}
