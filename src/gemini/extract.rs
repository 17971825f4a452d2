use serde_json::Value;
use tracing::{debug, info, warn};

use super::client::{GeminiClient, GeminiError};
use super::types::GenerateContentResponse;
use crate::deals::Offer;

/// Every file this service uploads carries this prefix so stale uploads from
/// crashed runs can be found and purged.
pub const FILE_PREFIX: &str = "au-bigwatermelon-image-";
const IMAGE_MIME: &str = "image/jpeg";

const EXTRACTION_PROMPT: &str = "\
The image is an advertisement for fruits and vegetables that are on sale.
Offers are separated by thin vertical and horizontal black lines.
There are one or two offers per row.
The name and price of the fruits are in the right lower corner of each row.
Please extract the name and price of each offer from the image.
Split each item into product name, price, currency and optionally the packaging type (e.g. ea, pk, kg etc.).
Normalize the product names to start with upper case letters and the rest lower case letters.
For the result use this JSON schema:
Offer = {'productName': string, 'price': number, 'currency': string, 'size': string}
Return: Array<Offer>
";

/// Image to offers, as a black box.
/// Implemented by `GeminiClient` for production; mock implementations used in tests.
pub trait OfferExtractor {
    /// Deletes leftovers from earlier runs. Failures are logged, never returned.
    async fn purge_stale_files(&self);

    async fn extract_offers(&self, index: usize, image: Vec<u8>) -> Result<Vec<Offer>, GeminiError>;
}

impl OfferExtractor for GeminiClient {
    async fn purge_stale_files(&self) {
        let files = match self.list_files().await {
            Ok(files) => files,
            Err(e) => {
                warn!(error = %e, "could not list uploaded files");
                return;
            }
        };

        for file in files.iter().filter(|f| f.name.contains(FILE_PREFIX)) {
            info!(name = %file.name, "deleting stale upload");
            if let Err(e) = self.delete_file(&file.name).await {
                warn!(name = %file.name, error = %e, "failed to delete stale upload");
            }
        }
    }

    async fn extract_offers(&self, index: usize, image: Vec<u8>) -> Result<Vec<Offer>, GeminiError> {
        if image.is_empty() {
            return Err(GeminiError::EmptyImage);
        }

        let name = upload_name(index);
        info!(index, name = %name, bytes = image.len(), "uploading image");
        let file = self.upload_file(&name, image, IMAGE_MIME).await?;

        let outcome = match file.uri.as_deref() {
            Some(uri) => self
                .generate_json(uri, IMAGE_MIME, EXTRACTION_PROMPT)
                .await
                .and_then(|response| parse_offers(&response)),
            None => Err(GeminiError::MissingFileUri),
        };

        if let Err(e) = self.delete_file(&file.name).await {
            warn!(name = %file.name, error = %e, "failed to delete uploaded image");
        }

        let offers = outcome?;
        info!(index, offers = offers.len(), "offers extracted from image");
        Ok(offers)
    }
}

/// Resource ids must be lowercase alphanumerics and dashes, at most 40 chars.
fn upload_name(index: usize) -> String {
    let suffix: String = (0..6).map(|_| fastrand::lowercase()).collect();
    format!("{FILE_PREFIX}{index}-{suffix}")
}

/// Parses the first text part of the first candidate as an offer array.
/// Entries that do not form an offer are logged and skipped; the rest are kept.
pub fn parse_offers(response: &GenerateContentResponse) -> Result<Vec<Offer>, GeminiError> {
    let text = response
        .candidates
        .as_ref()
        .and_then(|c| c.first())
        .and_then(|c| c.content.as_ref())
        .and_then(|content| content.parts.iter().find_map(|p| p.text.as_deref()))
        .filter(|text| !text.trim().is_empty())
        .ok_or(GeminiError::EmptyResponse)?;

    let entries: Vec<Value> = serde_json::from_str(strip_code_fence(text))?;
    let total = entries.len();
    let offers: Vec<Offer> = entries
        .into_iter()
        .enumerate()
        .filter_map(|(position, entry)| match serde_json::from_value(entry) {
            Ok(offer) => Some(offer),
            Err(e) => {
                warn!(position, error = %e, "skipping malformed offer entry");
                None
            }
        })
        .collect();
    debug!(count = offers.len(), skipped = total - offers.len(), "parsed offers");
    Ok(offers)
}

/// JSON mode usually returns bare JSON, but some models still wrap it in a
/// markdown fence.
fn strip_code_fence(text: &str) -> &str {
    let trimmed = text.trim();
    trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .map_or(trimmed, str::trim)
}
