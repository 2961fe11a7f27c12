//! 🔄 Transforms: a page of CSV text goes in, offer documents come out.
//!
//! 🎬 COLD OPEN: INT. CUSTOMS HALL, TERMINAL 2, 2:47 AM
//!
//! Fifty thousand rows shuffle off the file source. Each one gets its passport checked
//! against the header, its bags searched by the CSV reader, and its paperwork stamped
//! by the normalizer. A few are turned away. The rest board the bulk request.
//!
//! 🧠 Knowledge graph:
//! - Input: one page from a `Source` (data lines only, the header was captured up front).
//! - Decoding: `csv` with the file's header and delimiter into [`RawOfferRow`]s.
//!   A record whose field count disagrees with the header is undecodable, full stop.
//! - Normalizing: `normalizer::normalize_batch` with the shared `Arc<HotelLookup>`.
//! - Output: [`TransformedPage`], documents plus the counts the supervisor reports.
//!
//! The normalizer never logs. This module does it on its behalf.

use std::sync::Arc;

use anyhow::Result;
use csv::StringRecord;
use tracing::{debug, warn};

use crate::backends::file_source::delimiter_byte;
use crate::common::{NormalizedOfferDocument, RawOfferRow};
use crate::normalizer::{HotelLookup, normalize_batch};

/// 📦 The result of transforming one page.
#[derive(Debug, Default, Clone, PartialEq)]
pub(crate) struct TransformedPage {
    pub(crate) documents: Vec<NormalizedOfferDocument>,
    /// Data records seen, decodable or not.
    pub(crate) rows_read: usize,
    /// Decoded rows the normalizer declined (no usable outbound departure timestamp).
    pub(crate) rows_skipped: usize,
    /// Records that never made it to a `RawOfferRow`.
    pub(crate) rows_undecodable: usize,
}

/// 🔄 Turns offer CSV pages into normalized documents. Cheap to clone, one per sink worker.
#[derive(Debug, Clone)]
pub(crate) struct OfferTransformer {
    headers: StringRecord,
    delimiter: u8,
    hotels: Arc<HotelLookup>,
}

impl OfferTransformer {
    pub(crate) fn new(headers: StringRecord, delimiter: char, hotels: Arc<HotelLookup>) -> Result<Self> {
        Ok(Self {
            headers,
            delimiter: delimiter_byte(delimiter)?,
            hotels,
        })
    }

    pub(crate) fn transform(&self, page: &str) -> TransformedPage {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .delimiter(self.delimiter)
            .from_reader(page.as_bytes());

        let mut rows = Vec::new();
        let mut rows_read = 0usize;
        let mut rows_undecodable = 0usize;
        for (index, record) in reader.records().enumerate() {
            rows_read += 1;
            match record {
                Ok(record) if record.len() != self.headers.len() => {
                    rows_undecodable += 1;
                    debug!(
                        "🐛 page row {} has {} fields, the header has {}; skipping",
                        index,
                        record.len(),
                        self.headers.len()
                    );
                }
                Ok(record) => match record.deserialize::<RawOfferRow>(Some(&self.headers)) {
                    Ok(row) => rows.push(row),
                    Err(err) => {
                        rows_undecodable += 1;
                        debug!("🐛 page row {} could not be decoded: {}", index, err);
                    }
                },
                Err(err) => {
                    rows_undecodable += 1;
                    debug!("🐛 page row {} is not valid CSV: {}", index, err);
                }
            }
        }

        let documents: Vec<NormalizedOfferDocument> = normalize_batch(&rows, &self.hotels).collect();
        let rows_skipped = rows.len() - documents.len();

        if rows_undecodable > 0 {
            warn!(
                "⚠️ {} of {} rows in this chunk could not be decoded and were skipped",
                rows_undecodable, rows_read
            );
        }
        if rows_skipped > 0 {
            debug!(
                "🧹 {} rows in this chunk had no usable outbound departure timestamp",
                rows_skipped
            );
        }

        TransformedPage {
            documents,
            rows_read,
            rows_skipped,
            rows_undecodable,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::HotelRow;
    use crate::normalizer::build_hotel_lookup;

    fn transformer(header: &str) -> Result<OfferTransformer> {
        let hotels = build_hotel_lookup(vec![HotelRow {
            hotelid: Some(7),
            hotelname: Some("Seaside".to_string()),
            hotelstars: Some(4.5),
        }])?;
        let headers = crate::backends::file_source::parse_header(header, ',')?;
        OfferTransformer::new(headers, ',', Arc::new(hotels))
    }

    #[test]
    fn the_one_where_a_page_becomes_documents() -> Result<()> {
        let transformer = transformer(
            "hotelid,outbounddeparturedatetime,inbounddeparturedatetime,countadults,countchildren,price,\
             inbounddepartureairport,inboundarrivalairport,inboundarrivaldatetime,outbounddepartureairport,\
             outboundarrivalairport,outboundarrivaldatetime,mealtype,oceanview,roomtype",
        )?;
        let page = "7,2024-03-01T08:00:00+02:00,2024-03-08T18:00:00+02:00,2,1,899.5,PMI,FRA,2024-03-08T20:30:00+02:00,FRA,PMI,2024-03-01T10:15:00+02:00,halfboard,true,double\n\
                    99,,2024-03-08T18:00:00+02:00,2,0,500,PMI,FRA,,FRA,PMI,,none,false,single";

        let result = transformer.transform(page);

        assert_eq!(result.rows_read, 2);
        assert_eq!(result.rows_skipped, 1, "the row without an outbound departure is dropped");
        assert_eq!(result.rows_undecodable, 0);
        assert_eq!(result.documents.len(), 1);

        let doc = &result.documents[0];
        assert_eq!(doc.hotelname.as_deref(), Some("Seaside"));
        assert_eq!(doc.hotelstars, Some(4.5));
        assert_eq!(doc.duration, 7);
        assert_eq!(doc.price, 899.5);
        assert_eq!(doc.outbounddeparturedatetime, "2024-03-01T06:00:00+0000");
        assert_eq!(doc.oceanview, Some(true));
        assert_eq!(doc.mealtype.as_deref(), Some("halfboard"));
        Ok(())
    }

    #[test]
    fn the_one_where_a_short_row_is_counted_not_trusted() -> Result<()> {
        let transformer = transformer("hotelid,price,outbounddeparturedatetime")?;
        let page = "7,100,2024-03-01\n7,100\n\"unterminated,5,2024-03-02";

        let result = transformer.transform(page);

        assert_eq!(result.rows_read, 3);
        assert_eq!(result.documents.len(), 1);
        assert_eq!(result.rows_undecodable, 2);
        assert_eq!(result.rows_skipped, 0);
        Ok(())
    }

    #[test]
    fn the_one_where_an_empty_page_is_a_quiet_page() -> Result<()> {
        let transformer = transformer("hotelid,price,outbounddeparturedatetime")?;
        assert_eq!(transformer.transform(""), TransformedPage::default());
        Ok(())
    }
}
