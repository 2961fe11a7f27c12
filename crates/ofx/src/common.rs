//! 📦 Common data structures: the building blocks of ofx
//!
//! 🎬 COLD OPEN: INT. TRAVEL AGENCY BACK OFFICE, 3:47 AM
//!
//! Ninety million rows of hotel offers sit in a CSV file that is larger than
//! the laptop it lives on. Some rows have prices. Some rows have "nan" where a
//! price should be. One row, somewhere in the middle, claims a child count of
//! "banana". Nobody knows who wrote it. Nobody will ever know.
//!
//! This module defines the shapes those rows pass through on their way into the
//! index: the raw row as it leaves the CSV, the hotel it joins against, and the
//! polished document the search engine finally gets to see.
//!
//! 🧠 Knowledge graph:
//! - [`RawOfferRow`] / [`HotelRow`]: CSV-facing, every field optional, every parse lenient.
//! - [`HotelRecord`]: one entry of the hotel lookup (see `normalizer::HotelLookup`).
//! - [`NormalizedOfferDocument`]: the indexed document. Field names ARE the index mapping.
//!
//! 🦆 The duck is here because every file must have one. This is law.

use serde::{Deserialize, Deserializer, Serialize};

/// 🏷️ Hotel identifiers are integers in the reference table and in the index mapping.
pub type HotelId = i64;

/// 🏨 One row of the hotel reference file, straight off the CSV reader.
///
/// `hotelid` is optional here because the file is allowed to be wrong. The lookup
/// builder is the one who gets to be upset about it.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct HotelRow {
    #[serde(deserialize_with = "lenient_i64")]
    pub hotelid: Option<HotelId>,
    pub hotelname: Option<String>,
    #[serde(deserialize_with = "lenient_f64")]
    pub hotelstars: Option<f64>,
}

/// 🏨 A hotel as the lookup knows it. Immutable for the whole run.
#[derive(Debug, Clone, PartialEq)]
pub struct HotelRecord {
    pub hotel_id: HotelId,
    pub name: Option<String>,
    pub stars: Option<f64>,
}

/// 📄 One offer row as read from the offer CSV.
///
/// Every field is an `Option` because the data has trust issues and so do we.
/// Unknown columns are ignored, missing columns become `None`, garbage becomes `None`.
/// Nothing in here is allowed to fail a whole chunk.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RawOfferRow {
    #[serde(deserialize_with = "lenient_i64")]
    pub hotelid: Option<HotelId>,
    #[serde(deserialize_with = "lenient_f64")]
    pub price: Option<f64>,
    #[serde(deserialize_with = "lenient_i64")]
    pub countadults: Option<i64>,
    #[serde(deserialize_with = "lenient_i64")]
    pub countchildren: Option<i64>,
    /// 📅 Trip start date. Absent in some exports, where the outbound flight timestamp stands in.
    pub departuredate: Option<String>,
    /// 📅 Trip end date. Same deal as `departuredate`, but for the inbound flight.
    pub returndate: Option<String>,
    pub mealtype: Option<String>,
    #[serde(deserialize_with = "lenient_bool")]
    pub oceanview: Option<bool>,
    pub roomtype: Option<String>,
    pub outbounddepartureairport: Option<String>,
    pub outboundarrivalairport: Option<String>,
    pub outbounddeparturedatetime: Option<String>,
    pub outboundarrivaldatetime: Option<String>,
    pub inbounddepartureairport: Option<String>,
    pub inboundarrivalairport: Option<String>,
    pub inbounddeparturedatetime: Option<String>,
    pub inboundarrivaldatetime: Option<String>,
}

/// 🎯 The canonical offer document, exactly as it lands in the index.
///
/// Numeric fields are already zero-coalesced. Text fields are `None` when the row had
/// nothing to say. `outbounddeparturedatetime` is a plain `String`: a document without
/// it is never built, so there is nothing to make optional.
///
/// `Deserialize` + `default` so the query side can read `_source` back without
/// exploding on documents written by an older loader.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizedOfferDocument {
    pub hotelid: Option<HotelId>,
    pub hotelname: Option<String>,
    pub hotelstars: Option<f64>,
    pub price: f64,
    pub countadults: i64,
    pub countchildren: i64,
    pub duration: i64,
    pub mealtype: Option<String>,
    pub oceanview: Option<bool>,
    pub roomtype: Option<String>,
    pub outbounddeparturedatetime: String,
    pub inbounddeparturedatetime: Option<String>,
    pub outbounddepartureairport: Option<String>,
    pub outboundarrivalairport: Option<String>,
    pub outboundarrivaldatetime: Option<String>,
    pub inbounddepartureairport: Option<String>,
    pub inboundarrivalairport: Option<String>,
    pub inboundarrivaldatetime: Option<String>,
}

// ===== Lenient field parsers =====
//
// 🔧 The CSV reader hands us text. These decide what that text means, and when the
// answer is "nothing useful", they say `None` instead of failing the row.

/// 🔢 Integers, plus the "42.0" that spreadsheet exports love to produce.
pub(crate) fn parse_lenient_i64(raw: &str) -> Option<i64> {
    let trimmed = raw.trim();
    if let Ok(value) = trimmed.parse::<i64>() {
        return Some(value);
    }
    // -- 🧮 "42.0" is an integer wearing a decimal costume. "42.5" is not.
    match trimmed.parse::<f64>() {
        Ok(value) if value.is_finite() && value.fract() == 0.0 => Some(value as i64),
        _ => None,
    }
}

/// 💸 Floats. "nan" and friends count as missing, not as a number.
pub(crate) fn parse_lenient_f64(raw: &str) -> Option<f64> {
    match raw.trim().parse::<f64>() {
        Ok(value) if value.is_finite() => Some(value),
        _ => None,
    }
}

/// 🌊 Booleans in every dialect the exports have been seen speaking.
pub(crate) fn parse_lenient_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "y" | "t" => Some(true),
        "false" | "0" | "no" | "n" | "f" => Some(false),
        _ => None,
    }
}

fn lenient_i64<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(parse_lenient_i64))
}

fn lenient_f64<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(parse_lenient_f64))
}

fn lenient_bool<'de, D>(deserializer: D) -> Result<Option<bool>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<String> = Option::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(parse_lenient_bool))
}
