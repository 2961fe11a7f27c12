//! 📤 Response mapping: search-engine JSON in, API models out.
//!
//! Two layers, kept apart on purpose:
//! - typed views of the parts of an Elasticsearch search response we read
//!   (`hits.hits[]._source`, and the `hotels` → `cheapest_offer` aggregation),
//! - the API models the frontend consumes, in camelCase.
//!
//! The indexed document (`NormalizedOfferDocument`) is never serialized to clients directly.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::common::{HotelId, NormalizedOfferDocument};

/// 💀 The store answered, but not in a shape we can read.
#[derive(Debug, Error)]
pub enum ResponseError {
    #[error("💀 The search response did not have the expected shape: {0}")]
    Malformed(#[from] serde_json::Error),
    #[error("💀 The search response has no '{0}' aggregation")]
    MissingAggregation(&'static str),
}

// ===== Search response views =====

#[derive(Debug, Default, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    hits: Hits,
    #[serde(default)]
    aggregations: Option<Aggregations>,
}

#[derive(Debug, Default, Deserialize)]
struct Hits {
    #[serde(default)]
    hits: Vec<Hit>,
}

#[derive(Debug, Deserialize)]
struct Hit {
    #[serde(rename = "_source")]
    source: NormalizedOfferDocument,
}

#[derive(Debug, Deserialize)]
struct Aggregations {
    hotels: Option<HotelBuckets>,
}

#[derive(Debug, Deserialize)]
struct HotelBuckets {
    #[serde(default)]
    buckets: Vec<HotelBucket>,
}

#[derive(Debug, Deserialize)]
struct HotelBucket {
    key: HotelId,
    doc_count: u64,
    cheapest_offer: TopHits,
}

#[derive(Debug, Deserialize)]
struct TopHits {
    #[serde(default)]
    hits: Hits,
}

// ===== API models =====

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hotel {
    pub id: HotelId,
    pub name: Option<String>,
    pub stars: Option<f64>,
}

/// 🏨 One row of `/bestOffersByHotel`: a hotel and its cheapest matching offer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BestHotelOffer {
    pub hotel: Hotel,
    pub min_price: f64,
    pub departure_date: String,
    pub return_date: Option<String>,
    pub count_adults: i64,
    pub count_children: i64,
    pub duration: i64,
    /// Matching offers of this hotel, not just the cheapest.
    pub count_available_offers: u64,
    pub room_type: Option<String>,
    pub meal_type: Option<String>,
}

/// 🧳 One offer of a hotel. The four timestamps keep the `...Datetime` spelling clients already read.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Offer {
    pub price: f64,
    pub count_adults: i64,
    pub count_children: i64,
    pub outbound_departure_airport: Option<String>,
    #[serde(rename = "outboundDepartureDatetime")]
    pub outbound_departure_date_time: String,
    pub outbound_arrival_airport: Option<String>,
    #[serde(rename = "outboundArrivalDatetime")]
    pub outbound_arrival_date_time: Option<String>,
    pub inbound_departure_airport: Option<String>,
    #[serde(rename = "inboundDepartureDatetime")]
    pub inbound_departure_date_time: Option<String>,
    pub inbound_arrival_airport: Option<String>,
    #[serde(rename = "inboundArrivalDatetime")]
    pub inbound_arrival_date_time: Option<String>,
    pub meal_type: Option<String>,
    pub ocean_view: Option<bool>,
    pub room_type: Option<String>,
}

impl From<NormalizedOfferDocument> for Offer {
    fn from(doc: NormalizedOfferDocument) -> Self {
        Self {
            price: doc.price,
            count_adults: doc.countadults,
            count_children: doc.countchildren,
            outbound_departure_airport: doc.outbounddepartureairport,
            outbound_departure_date_time: doc.outbounddeparturedatetime,
            outbound_arrival_airport: doc.outboundarrivalairport,
            outbound_arrival_date_time: doc.outboundarrivaldatetime,
            inbound_departure_airport: doc.inbounddepartureairport,
            inbound_departure_date_time: doc.inbounddeparturedatetime,
            inbound_arrival_airport: doc.inboundarrivalairport,
            inbound_arrival_date_time: doc.inboundarrivaldatetime,
            meal_type: doc.mealtype,
            ocean_view: doc.oceanview,
            room_type: doc.roomtype,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GetHotelOffersResponse {
    pub hotel: Hotel,
    pub items: Vec<Offer>,
}

// ===== Mapping =====

/// 🏨 Read the `hotels` buckets of a best-offers search, in bucket order.
pub fn best_offers_from_response(response: Value) -> Result<Vec<BestHotelOffer>, ResponseError> {
    let response: SearchResponse = serde_json::from_value(response)?;
    let buckets = response
        .aggregations
        .and_then(|aggregations| aggregations.hotels)
        .ok_or(ResponseError::MissingAggregation(crate::query::HOTELS_AGG))?
        .buckets;

    Ok(buckets
        .into_iter()
        .filter_map(|bucket| {
            // -- a bucket always has at least one hit; an empty one has nothing to show anyway
            let cheapest = bucket.cheapest_offer.hits.hits.into_iter().next()?.source;
            Some(BestHotelOffer {
                hotel: Hotel {
                    id: bucket.key,
                    name: cheapest.hotelname,
                    stars: cheapest.hotelstars,
                },
                min_price: cheapest.price,
                departure_date: cheapest.outbounddeparturedatetime,
                return_date: cheapest.inbounddeparturedatetime,
                count_adults: cheapest.countadults,
                count_children: cheapest.countchildren,
                duration: cheapest.duration,
                count_available_offers: bucket.doc_count,
                room_type: cheapest.roomtype,
                meal_type: cheapest.mealtype,
            })
        })
        .collect())
}

/// 📄 Read the hits of a hotel-offers search. Hotel details come from the first hit;
/// with no hits the hotel is just its id.
pub fn hotel_offers_from_response(
    hotel_id: HotelId,
    response: Value,
) -> Result<GetHotelOffersResponse, ResponseError> {
    let response: SearchResponse = serde_json::from_value(response)?;
    let documents: Vec<NormalizedOfferDocument> =
        response.hits.hits.into_iter().map(|hit| hit.source).collect();

    let hotel = match documents.first() {
        Some(first) => Hotel {
            id: hotel_id,
            name: first.hotelname.clone(),
            stars: first.hotelstars,
        },
        None => Hotel {
            id: hotel_id,
            name: None,
            stars: None,
        },
    };
    Ok(GetHotelOffersResponse {
        hotel,
        items: documents.into_iter().map(Offer::from).collect(),
    })
}
