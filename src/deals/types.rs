use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One product price entry read off a specials image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Offer {
    pub product_name: String,
    /// Accepts a JSON number or numeric string; always written as a number
    /// with every digit kept.
    #[serde(with = "rust_decimal::serde::arbitrary_precision")]
    pub price: Decimal,
    #[serde(default)]
    pub currency: String,
    #[serde(default)]
    pub size: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    pub address: String,
    pub city: String,
    pub state: String,
    pub zip: String,
    pub country: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseData {
    /// Serialized as `YYYY-MM-DD`.
    pub last_updated: NaiveDate,
    pub business: String,
    pub location: Location,
    pub offers: Vec<Offer>,
}

pub const BUSINESS: &str = "Big Watermelon Bushy Park";

pub fn store_location() -> Location {
    Location {
        latitude: -37.8748714,
        longitude: 145.2053244,
        address: "1161 High St Rd".to_string(),
        city: "Wantirna South".to_string(),
        state: "VIC".to_string(),
        zip: "3152".to_string(),
        country: "AU".to_string(),
    }
}

impl ResponseData {
    pub fn new(last_updated: NaiveDate, offers: Vec<Offer>) -> Self {
        Self {
            last_updated,
            business: BUSINESS.to_string(),
            location: store_location(),
            offers,
        }
    }
}
