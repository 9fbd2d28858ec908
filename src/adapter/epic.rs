// src/adapter/epic.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::SourceAdapter;
use crate::deal::{Deal, DealCategory};
use crate::source::Source;

pub const PROMOTIONS_URL: &str =
    "https://store-site-backend-static.ak.epicgames.com/freeGamesPromotions";
const PRODUCT_BASE: &str = "https://store.epicgames.com/en-US/p/";
const FALLBACK_URL: &str = "https://store.epicgames.com/en-US/free-games";

#[derive(Debug, Deserialize)]
struct Response {
    data: Data,
}
#[derive(Debug, Deserialize)]
struct Data {
    #[serde(rename = "Catalog")]
    catalog: Catalog,
}
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Catalog {
    search_store: SearchStore,
}
#[derive(Debug, Deserialize)]
struct SearchStore {
    elements: Vec<Element>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Element {
    title: String,
    #[serde(default)]
    product_slug: Option<String>,
    #[serde(default)]
    offer_type: Option<String>,
    #[serde(default)]
    catalog_ns: Option<CatalogNs>,
    #[serde(default)]
    key_images: Vec<KeyImage>,
    #[serde(default)]
    price: Option<Price>,
    #[serde(default)]
    promotions: Option<Promotions>,
}

#[derive(Debug, Deserialize)]
struct CatalogNs {
    #[serde(default)]
    mappings: Option<Vec<Mapping>>,
}
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Mapping {
    page_slug: String,
}
#[derive(Debug, Deserialize)]
struct KeyImage {
    #[serde(rename = "type")]
    kind: String,
    url: String,
}
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Price {
    total_price: TotalPrice,
}
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TotalPrice {
    discount_price: i64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Promotions {
    #[serde(default)]
    promotional_offers: Vec<OfferGroup>,
    #[serde(default)]
    upcoming_promotional_offers: Vec<OfferGroup>,
}
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OfferGroup {
    promotional_offers: Vec<Offer>,
}
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Offer {
    start_date: DateTime<Utc>,
    end_date: DateTime<Utc>,
    #[serde(default)]
    discount_setting: Option<DiscountSetting>,
}
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DiscountSetting {
    discount_percentage: u32,
}

impl Element {
    fn product_url(&self) -> String {
        let mapped = self
            .catalog_ns
            .as_ref()
            .and_then(|ns| ns.mappings.as_ref())
            .and_then(|m| m.first())
            .map(|m| m.page_slug.as_str());
        // During seasonal mystery giveaways the slug comes through as "[]".
        let slug = mapped.or(self
            .product_slug
            .as_deref()
            .filter(|s| !s.is_empty() && *s != "[]"));
        match slug {
            Some(s) => format!("{PRODUCT_BASE}{s}"),
            None => FALLBACK_URL.to_string(),
        }
    }

    fn artwork(&self) -> (Option<String>, Option<String>) {
        let tall = self.key_images.iter().find(|k| k.kind.contains("Tall"));
        let wide = self.key_images.iter().find(|k| k.kind.contains("Wide"));
        let first = self.key_images.first();
        (
            tall.or(first).map(|k| k.url.clone()),
            wide.or(first).map(|k| k.url.clone()),
        )
    }

    fn category(&self) -> DealCategory {
        match self.offer_type.as_deref() {
            Some("ADD_ON") | Some("DLC") | Some("EDITION") => DealCategory::Addon,
            _ => DealCategory::Game,
        }
    }

    fn is_free_now(&self) -> bool {
        self.price
            .as_ref()
            .is_some_and(|p| p.total_price.discount_price == 0)
    }
}

/// Parse the promotions payload into deals: current free offers are active, upcoming
/// 100%-off offers inactive.
pub fn parse_promotions(raw: &str) -> Result<Vec<Deal>> {
    let rsp: Response = serde_json::from_str(raw).context("parsing epic promotions json")?;
    let mut out = Vec::new();

    for el in rsp.data.catalog.search_store.elements {
        let Some(promos) = &el.promotions else {
            continue;
        };
        let url = el.product_url();
        let (tall, wide) = el.artwork();
        let make = |active: bool, offer: &Offer| {
            let mut d = Deal::new(&el.title, url.clone(), active)
                .with_window(Some(offer.start_date), Some(offer.end_date))
                .with_category(el.category());
            d.image = tall.clone();
            d.wide_image = wide.clone();
            d
        };

        if el.is_free_now() {
            if let Some(offer) = promos
                .promotional_offers
                .first()
                .and_then(|g| g.promotional_offers.first())
            {
                out.push(make(true, offer));
            }
        }

        // Epic marks a fully free upcoming offer with a discount percentage of 0.
        if let Some(offer) = promos
            .upcoming_promotional_offers
            .first()
            .and_then(|g| {
                g.promotional_offers.iter().find(|o| {
                    o.discount_setting
                        .as_ref()
                        .is_some_and(|s| s.discount_percentage == 0)
                })
            })
        {
            out.push(make(false, offer));
        }
    }
    Ok(out)
}

pub struct EpicAdapter {
    mode: Mode,
}

enum Mode {
    Fixture(String),
    Http { url: String, client: reqwest::Client },
}

impl EpicAdapter {
    pub fn from_url(url: impl Into<String>) -> Self {
        Self {
            mode: Mode::Http {
                url: url.into(),
                client: reqwest::Client::new(),
            },
        }
    }

    pub fn from_fixture(s: &str) -> Self {
        Self {
            mode: Mode::Fixture(s.to_string()),
        }
    }
}

impl Default for EpicAdapter {
    fn default() -> Self {
        Self::from_url(PROMOTIONS_URL)
    }
}

#[async_trait]
impl SourceAdapter for EpicAdapter {
    async fn fetch(&self, source: &Source) -> Result<Vec<Deal>> {
        match &self.mode {
            Mode::Fixture(s) => parse_promotions(s),
            Mode::Http { url, client } => {
                let body = client
                    .get(url)
                    .header("User-Agent", "Mozilla/5.0")
                    .send()
                    .await
                    .with_context(|| format!("{}: epic http get()", source.id))?
                    .error_for_status()
                    .context("epic non-2xx")?
                    .text()
                    .await
                    .context("epic http .text()")?;
                parse_promotions(&body)
            }
        }
    }

    fn name(&self) -> &'static str {
        "epic"
    }
}

#[cfg(test)]
pub(crate) const FIXTURE: &str = r#"{
  "data": { "Catalog": { "searchStore": { "elements": [
    {
      "title": "Hades™",
      "productSlug": "hades",
      "offerType": "BASE_GAME",
      "catalogNs": { "mappings": [ { "pageSlug": "hades-abc" } ] },
      "keyImages": [
        { "type": "OfferImageWide", "url": "https://cdn/hades-wide.jpg" },
        { "type": "OfferImageTall", "url": "https://cdn/hades-tall.jpg" }
      ],
      "price": { "totalPrice": { "discountPrice": 0 } },
      "promotions": {
        "promotionalOffers": [ { "promotionalOffers": [
          { "startDate": "2025-06-19T15:00:00.000Z", "endDate": "2025-06-26T15:00:00.000Z",
            "discountSetting": { "discountPercentage": 0 } } ] } ],
        "upcomingPromotionalOffers": []
      }
    },
    {
      "title": "Mystery Game",
      "productSlug": "[]",
      "catalogNs": { "mappings": null },
      "keyImages": [ { "type": "VaultClosed", "url": "https://cdn/vault.png" } ],
      "price": { "totalPrice": { "discountPrice": 1999 } },
      "promotions": {
        "promotionalOffers": [],
        "upcomingPromotionalOffers": [ { "promotionalOffers": [
          { "startDate": "2025-06-26T15:00:00.000Z", "endDate": "2025-07-03T15:00:00.000Z",
            "discountSetting": { "discountPercentage": 0 } } ] } ]
      }
    },
    {
      "title": "Discounted Only",
      "productSlug": "disc",
      "keyImages": [],
      "price": { "totalPrice": { "discountPrice": 499 } },
      "promotions": {
        "promotionalOffers": [ { "promotionalOffers": [
          { "startDate": "2025-06-19T15:00:00.000Z", "endDate": "2025-06-26T15:00:00.000Z",
            "discountSetting": { "discountPercentage": 50 } } ] } ],
        "upcomingPromotionalOffers": []
      }
    },
    { "title": "No Promo", "keyImages": [], "promotions": null }
  ] } } }
}"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn fixture_yields_current_and_upcoming() {
        let adapter = EpicAdapter::from_fixture(FIXTURE);
        let src = Source::new("epic", "Epic Games", FALLBACK_URL);
        let deals = adapter.fetch(&src).await.unwrap();

        assert_eq!(deals.len(), 2);
        let hades = &deals[0];
        assert_eq!(hades.title, "Hades");
        assert!(hades.active);
        assert_eq!(hades.url, "https://store.epicgames.com/en-US/p/hades-abc");
        assert_eq!(hades.image.as_deref(), Some("https://cdn/hades-tall.jpg"));
        assert_eq!(hades.wide_image.as_deref(), Some("https://cdn/hades-wide.jpg"));
        assert!(hades.end_date.is_some());

        let mystery = &deals[1];
        assert!(!mystery.active);
        assert_eq!(mystery.url, FALLBACK_URL);
        assert_eq!(mystery.image.as_deref(), Some("https://cdn/vault.png"));
    }

    #[test]
    fn malformed_payload_is_a_scrape_failure() {
        assert!(parse_promotions("{\"data\":{}}").is_err());
    }
}
