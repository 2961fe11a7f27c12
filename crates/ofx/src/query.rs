//! 🔍 Query builder: HTTP query parameters in, Elasticsearch search bodies out.
//!
//! 🧠 Knowledge graph:
//! - [`OfferSearchParams::from_query_pairs`]: the raw `(name, value)` pairs, as the frontend
//!   sends them. Airports arrive as repeated `departureAirports[]` (the PHP-style array
//!   spelling); plain `departureAirports` works too.
//! - [`best_offers_query`]: cheapest offer per hotel, via a `terms` aggregation with a
//!   `top_hits` child sorted by price.
//! - [`hotel_offers_query`]: every matching offer of one hotel, cheapest first.
//!
//! Filter semantics, shared by both:
//!
//! | parameter               | filter                                              |
//! |-------------------------|-----------------------------------------------------|
//! | `departureAirports[]`   | `terms outbounddepartureairport` (none if empty)    |
//! | `duration` = d          | `duration` in `[d, d + 1]`                          |
//! | `countAdults` = n       | `countadults >= n`                                  |
//! | `countChildren` = n     | `countchildren >= n`                                |
//! | `earliestDepartureDate` | `outbounddeparturedatetime >= date` (none if unset) |
//! | `latestReturnDate`      | `inbounddeparturedatetime <= date` (none if unset)  |
//! | `mealType`, `roomType`  | exact `term` match, when given                      |
//! | `oceanView=true`        | `term oceanview: true`; `false` means "don't care"  |

use serde_json::{Value, json};
use thiserror::Error;

use crate::common::{HotelId, parse_lenient_bool};
use crate::normalizer::{parse_instant, render_timestamp};

/// 💀 A query parameter that is missing or doesn't parse. Always the caller's fault; always a 400.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum QueryParamError {
    #[error("Invalid query parameters: '{0}' is required")]
    Missing(&'static str),
    #[error("Invalid query parameters: '{name}' must be an integer, got '{value}'")]
    NotAnInteger { name: &'static str, value: String },
    #[error("Invalid query parameters: '{name}' must be a date or date-time, got '{value}'")]
    NotADate { name: &'static str, value: String },
    #[error("Invalid query parameters: '{name}' must be true or false, got '{value}'")]
    NotABoolean { name: &'static str, value: String },
}

/// 🎯 The search filters, parsed and validated.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OfferSearchParams {
    pub departure_airports: Vec<String>,
    /// Already rendered in the index's timestamp format.
    pub earliest_departure_date: Option<String>,
    /// Already rendered in the index's timestamp format.
    pub latest_return_date: Option<String>,
    pub count_adults: i64,
    pub count_children: i64,
    pub duration: i64,
    pub meal_type: Option<String>,
    pub room_type: Option<String>,
    /// Only ever `Some(true)`: asking for no sea view is the same as not asking.
    pub ocean_view: Option<bool>,
}

impl OfferSearchParams {
    pub fn from_query_pairs<K, V>(pairs: &[(K, V)]) -> Result<Self, QueryParamError>
    where
        K: AsRef<str>,
        V: AsRef<str>,
    {
        // -- 🔎 first non-empty value wins; an empty `?mealType=` means "no preference"
        let single = |name: &str| {
            pairs
                .iter()
                .find(|(key, value)| key.as_ref() == name && !value.as_ref().trim().is_empty())
                .map(|(_, value)| value.as_ref().trim())
        };

        let departure_airports = pairs
            .iter()
            .filter(|(key, _)| matches!(key.as_ref(), "departureAirports[]" | "departureAirports"))
            .map(|(_, value)| value.as_ref().trim())
            .filter(|value| !value.is_empty())
            .map(str::to_string)
            .collect();

        let integer = |name: &'static str| -> Result<i64, QueryParamError> {
            let raw = single(name).ok_or(QueryParamError::Missing(name))?;
            raw.parse().map_err(|_| QueryParamError::NotAnInteger {
                name,
                value: raw.to_string(),
            })
        };
        let date = |name: &'static str| -> Result<Option<String>, QueryParamError> {
            single(name)
                .map(|raw| {
                    render_timestamp(parse_instant(raw)).ok_or_else(|| QueryParamError::NotADate {
                        name,
                        value: raw.to_string(),
                    })
                })
                .transpose()
        };

        let ocean_view = single("oceanView")
            .map(|raw| {
                parse_lenient_bool(raw).ok_or_else(|| QueryParamError::NotABoolean {
                    name: "oceanView",
                    value: raw.to_string(),
                })
            })
            .transpose()?
            // -- 🌊 the frontend always sends `oceanView=false`; that is "any view", not "no view"
            .filter(|&wants_ocean_view| wants_ocean_view);

        Ok(Self {
            departure_airports,
            earliest_departure_date: date("earliestDepartureDate")?,
            latest_return_date: date("latestReturnDate")?,
            count_adults: integer("countAdults")?,
            count_children: integer("countChildren")?,
            duration: integer("duration")?,
            meal_type: single("mealType").map(str::to_string),
            room_type: single("roomType").map(str::to_string),
            ocean_view,
        })
    }

    /// 🧱 The `bool.filter` clauses for these parameters.
    pub fn filters(&self) -> Vec<Value> {
        let mut filters = Vec::with_capacity(9);
        if !self.departure_airports.is_empty() {
            filters.push(json!({ "terms": { "outbounddepartureairport": self.departure_airports } }));
        }
        filters.push(json!({ "range": { "duration": { "gte": self.duration, "lte": self.duration + 1 } } }));
        filters.push(json!({ "range": { "countadults": { "gte": self.count_adults } } }));
        filters.push(json!({ "range": { "countchildren": { "gte": self.count_children } } }));
        if let Some(ref earliest) = self.earliest_departure_date {
            filters.push(json!({ "range": { "outbounddeparturedatetime": { "gte": earliest } } }));
        }
        if let Some(ref latest) = self.latest_return_date {
            filters.push(json!({ "range": { "inbounddeparturedatetime": { "lte": latest } } }));
        }
        if let Some(ref meal_type) = self.meal_type {
            filters.push(json!({ "term": { "mealtype": meal_type } }));
        }
        if let Some(ref room_type) = self.room_type {
            filters.push(json!({ "term": { "roomtype": room_type } }));
        }
        if let Some(ocean_view) = self.ocean_view {
            filters.push(json!({ "term": { "oceanview": ocean_view } }));
        }
        filters
    }
}

/// 🏨 Aggregation names, shared with the response reader.
pub(crate) const HOTELS_AGG: &str = "hotels";
pub(crate) const CHEAPEST_OFFER_AGG: &str = "cheapest_offer";

/// 🏨 Cheapest matching offer per hotel, for up to `bucket_size` hotels. No top-level hits.
pub fn best_offers_query(params: &OfferSearchParams, bucket_size: usize) -> Value {
    json!({
        "size": 0,
        "query": { "bool": { "filter": params.filters() } },
        "aggs": {
            HOTELS_AGG: {
                "terms": { "field": "hotelid", "size": bucket_size },
                "aggs": {
                    CHEAPEST_OFFER_AGG: {
                        "top_hits": { "sort": [ { "price": { "order": "asc" } } ], "size": 1 }
                    }
                }
            }
        }
    })
}

/// 📄 Up to `page_size` matching offers of one hotel, cheapest first.
pub fn hotel_offers_query(hotel_id: HotelId, params: &OfferSearchParams, page_size: usize) -> Value {
    let mut filters = vec![json!({ "term": { "hotelid": hotel_id } })];
    filters.extend(params.filters());
    json!({
        "size": page_size,
        "sort": [ { "price": { "order": "asc" } } ],
        "query": { "bool": { "filter": filters } }
    })
}
