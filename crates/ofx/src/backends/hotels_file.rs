//! 🏨 The hotel reference table loader.
//!
//! Small file, read in one go, turned into a [`HotelLookup`] before the first offer is
//! touched. Unlike the offer file, nothing here is forgiven: a broken hotel table means
//! every join downstream would be quietly wrong, so the load fails loudly instead.

use anyhow::{Context, Result};
use csv::StringRecord;
use tracing::info;

use crate::backends::file_source::delimiter_byte;
use crate::common::HotelRow;
use crate::normalizer::{HotelLookup, build_hotel_lookup};

/// 🏨 Read `path` (default delimiter `;`) and build the hotel lookup.
pub(crate) async fn load_hotel_lookup(path: &str, delimiter: char) -> Result<HotelLookup> {
    let raw = tokio::fs::read(path)
        .await
        .context(format!("💀 Could not read the hotel reference file '{path}'"))?;
    let rows = parse_hotel_rows(&raw, delimiter)
        .context(format!("💀 The hotel reference file '{path}' is not the CSV we expected"))?;
    let row_count = rows.len();
    let lookup = build_hotel_lookup(rows)
        .context(format!("💀 The hotel reference file '{path}' contains a row we cannot trust"))?;
    info!(
        "🏨 Loaded {} hotels from '{}' ({} rows)",
        lookup.len(),
        path,
        row_count
    );
    Ok(lookup)
}

fn parse_hotel_rows(raw: &[u8], delimiter: char) -> Result<Vec<HotelRow>> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter_byte(delimiter)?)
        .trim(csv::Trim::Headers)
        .from_reader(raw);
    // -- 🏷️ "HotelId" and "hotelid" are the same column to us
    let headers: StringRecord = reader
        .headers()
        .context("💀 The hotel file has no readable header")?
        .iter()
        .map(|name| name.trim_start_matches('\u{feff}').to_ascii_lowercase())
        .collect();
    reader.set_headers(headers);

    reader
        .deserialize()
        .enumerate()
        .map(|(index, row)| row.context(format!("💀 Hotel row {} is not valid CSV", index + 1)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalizer::NormalizeError;
    use std::io::Write;

    #[tokio::test]
    async fn the_one_where_the_hotels_check_in() -> Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        write!(
            file,
            "HotelId;HotelName;HotelStars\n7;Seaside;4.5\n8;Mountain Lodge;\n7;Seaside Resort;5\n"
        )?;

        let lookup = load_hotel_lookup(&file.path().to_string_lossy(), ';').await?;

        assert_eq!(lookup.len(), 2);
        let seaside = lookup.get(7).expect("💀 hotel 7 should be in the lookup");
        assert_eq!(seaside.name.as_deref(), Some("Seaside Resort"), "last write wins");
        assert_eq!(seaside.stars, Some(5.0));
        let lodge = lookup.get(8).expect("💀 hotel 8 should be in the lookup");
        assert_eq!(lodge.stars, None);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_a_hotel_without_an_id_stops_the_show() -> Result<()> {
        let mut file = tempfile::NamedTempFile::new()?;
        write!(file, "hotelid;hotelname;hotelstars\n7;Seaside;4.5\n;Nameless;3\n")?;

        let err = load_hotel_lookup(&file.path().to_string_lossy(), ';')
            .await
            .expect_err("💀 a hotel row without an id must be fatal");

        assert_eq!(
            err.downcast_ref::<NormalizeError>(),
            Some(&NormalizeError::MalformedReferenceData { row: 1 })
        );
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_the_hotel_file_is_missing() {
        let result = load_hotel_lookup("/nowhere/hotels.csv", ';').await;
        assert!(result.is_err());
    }
}
