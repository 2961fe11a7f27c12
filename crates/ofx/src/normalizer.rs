//! 🧼 The Offer Normalizer: raw rows in, index-ready documents out.
//!
//! 🎬 *[a row walks in with a price of "nan" and a departure date of "soon"]*
//! *[it leaves with a price of 0.0 and no departure date]*
//! *[it is not indexed. it was never going to be indexed. it knew.]*
//!
//! Pure functions only. No I/O, no logging, no retries, no feelings. The caller (the CSV
//! transform) counts and logs whatever this module quietly drops.
//!
//! 🧠 Knowledge graph:
//! - [`build_hotel_lookup`]: hotel rows → [`HotelLookup`], the only fallible operation here.
//! - [`normalize_batch`]: rows + lookup → lazy iterator of [`NormalizedOfferDocument`].
//! - [`parse_instant`] / [`render_timestamp`]: the timestamp canonicalization pair.
//! - [`duration_days`]: floor of whole days, negatives preserved.
//!
//! ⚠️ A row whose outbound departure timestamp does not survive parsing is dropped. Silently.
//! That is the contract, not an accident.

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use thiserror::Error;

use crate::common::{HotelId, HotelRecord, HotelRow, NormalizedOfferDocument, RawOfferRow};

/// 🕰️ The one timestamp format the index ever sees: `2024-03-01T10:00:00+0000`.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%z";

const SECONDS_PER_DAY: i64 = 86_400;

/// 💀 The only way normalization can actually fail.
#[derive(Debug, Error, PartialEq)]
pub enum NormalizeError {
    /// A reference row with no hotel id. We cannot key a lookup on nothing.
    #[error("💀 Malformed hotel reference data: row {row} has no usable hotel id")]
    MalformedReferenceData { row: usize },
}

/// 🏨 Hotel id → hotel, built once per run and never mutated afterwards.
///
/// Shared between sink workers behind an `Arc`. Reads only. Nobody gets to move the furniture.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HotelLookup {
    hotels: HashMap<HotelId, HotelRecord>,
}

impl HotelLookup {
    pub fn get(&self, hotel_id: HotelId) -> Option<&HotelRecord> {
        self.hotels.get(&hotel_id)
    }

    pub fn len(&self) -> usize {
        self.hotels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hotels.is_empty()
    }
}

/// 🏗️ Build the hotel lookup from reference rows.
///
/// One entry per distinct id; when an id shows up twice, the later row wins.
/// A row without an id is fatal, and the error carries its zero-based position.
pub fn build_hotel_lookup<I>(hotel_rows: I) -> Result<HotelLookup, NormalizeError>
where
    I: IntoIterator<Item = HotelRow>,
{
    let mut hotels = HashMap::new();
    for (row, hotel_row) in hotel_rows.into_iter().enumerate() {
        let hotel_id = hotel_row
            .hotelid
            .ok_or(NormalizeError::MalformedReferenceData { row })?;
        hotels.insert(
            hotel_id,
            HotelRecord {
                hotel_id,
                name: hotel_row.hotelname,
                stars: hotel_row.hotelstars,
            },
        );
    }
    Ok(HotelLookup { hotels })
}

/// 🔄 Normalize a batch of rows, lazily, in input order.
///
/// The iterator borrows both inputs and can be recreated at will: same rows, same lookup,
/// same documents. Rows without a renderable outbound departure timestamp are skipped.
pub fn normalize_batch<'a>(
    rows: &'a [RawOfferRow],
    hotel_lookup: &'a HotelLookup,
) -> impl Iterator<Item = NormalizedOfferDocument> + 'a {
    rows.iter()
        .filter_map(move |row| normalize_row(row, hotel_lookup))
}

/// 🎯 Normalize one row. `None` means "this row does not become a document".
pub fn normalize_row(row: &RawOfferRow, hotel_lookup: &HotelLookup) -> Option<NormalizedOfferDocument> {
    // 📅 Trip dates drive the duration. Exports without the date columns still carry the
    // flight departure timestamps, which describe the same two moments.
    let departure = parse_optional_instant(row.departuredate.as_deref())
        .or_else(|| parse_optional_instant(row.outbounddeparturedatetime.as_deref()));
    let return_date = parse_optional_instant(row.returndate.as_deref())
        .or_else(|| parse_optional_instant(row.inbounddeparturedatetime.as_deref()));

    let duration = match (departure, return_date) {
        (Some(departure), Some(return_date)) => duration_days(departure, return_date),
        _ => 0,
    };

    // 🕰️ The four flight timestamps, each rendered from its own column.
    let outbound_departure = render_timestamp(parse_optional_instant(
        row.outbounddeparturedatetime.as_deref(),
    ))?;
    let inbound_departure =
        render_timestamp(parse_optional_instant(row.inbounddeparturedatetime.as_deref()));
    let outbound_arrival =
        render_timestamp(parse_optional_instant(row.outboundarrivaldatetime.as_deref()));
    let inbound_arrival =
        render_timestamp(parse_optional_instant(row.inboundarrivaldatetime.as_deref()));

    // 🏨 Join. An unknown hotel is not an error, just an anonymous one.
    let hotel = row.hotelid.and_then(|hotel_id| hotel_lookup.get(hotel_id));
    let hotelname = hotel.and_then(|hotel| hotel.name.clone());
    let hotelstars = hotel.map(|hotel| hotel.stars.unwrap_or(0.0));

    Some(NormalizedOfferDocument {
        hotelid: row.hotelid,
        hotelname,
        hotelstars,
        price: row.price.unwrap_or(0.0),
        countadults: row.countadults.unwrap_or(0),
        countchildren: row.countchildren.unwrap_or(0),
        duration,
        mealtype: row.mealtype.clone(),
        oceanview: row.oceanview,
        roomtype: row.roomtype.clone(),
        outbounddeparturedatetime: outbound_departure,
        inbounddeparturedatetime: inbound_departure,
        outbounddepartureairport: row.outbounddepartureairport.clone(),
        outboundarrivalairport: row.outboundarrivalairport.clone(),
        outboundarrivaldatetime: outbound_arrival,
        inbounddepartureairport: row.inbounddepartureairport.clone(),
        inboundarrivalairport: row.inboundarrivalairport.clone(),
        inboundarrivaldatetime: inbound_arrival,
    })
}

/// 📏 Whole days from departure to return, rounded toward negative infinity.
///
/// A return before the departure yields a negative number and it stays negative.
pub fn duration_days(departure: DateTime<Utc>, return_date: DateTime<Utc>) -> i64 {
    let delta = return_date - departure;
    // -- num_seconds truncates toward zero; a negative sub-second remainder still owes a second
    let seconds = delta.num_seconds() - i64::from(delta.subsec_nanos() < 0);
    seconds.div_euclid(SECONDS_PER_DAY)
}

/// 🎨 Render an instant in [`TIMESTAMP_FORMAT`]. Absent stays absent.
pub fn render_timestamp(instant: Option<DateTime<Utc>>) -> Option<String> {
    instant.map(|instant| instant.format(TIMESTAMP_FORMAT).to_string())
}

fn parse_optional_instant(raw: Option<&str>) -> Option<DateTime<Utc>> {
    raw.and_then(parse_instant)
}

// 🔧 Offsets written out: "+0200", "+02:00". Tried after RFC 3339.
const OFFSET_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f%z",
    "%Y-%m-%d %H:%M:%S%.f%z",
    "%Y-%m-%dT%H:%M:%S%.f%:z",
    "%Y-%m-%d %H:%M:%S%.f%:z",
];

// 🔧 No offset at all. These are read as UTC.
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// 🕵️ Parse whatever the export called a timestamp into a UTC instant.
///
/// Accepts RFC 3339, explicit numeric offsets, a trailing `Z`, offset-less date-times
/// (taken as UTC) and bare dates (midnight UTC). Anything else is `None`. Never panics,
/// never errors: "unparseable" is an answer, not a failure.
pub fn parse_instant(raw: &str) -> Option<DateTime<Utc>> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }

    if let Ok(instant) = DateTime::parse_from_rfc3339(trimmed) {
        return Some(instant.with_timezone(&Utc));
    }

    for format in OFFSET_FORMATS {
        if let Ok(instant) = DateTime::parse_from_str(trimmed, format) {
            return Some(instant.with_timezone(&Utc));
        }
    }

    // -- 🌍 "Z" means UTC. Strip it and let the naive formats handle the rest.
    let without_zulu = trimmed
        .strip_suffix('Z')
        .or_else(|| trimmed.strip_suffix('z'))
        .unwrap_or(trimmed);

    for format in NAIVE_FORMATS {
        if let Ok(naive) = NaiveDateTime::parse_from_str(without_zulu, format) {
            return Some(Utc.from_utc_datetime(&naive));
        }
    }

    NaiveDate::parse_from_str(without_zulu, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|midnight| Utc.from_utc_datetime(&midnight))
}
