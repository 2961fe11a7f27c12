//! 🎬 *[the documents are normalized. the sink hungers. the composer picks up the baton.]*
//!
//! 🎼 The bulk composer: renders offer documents as an Elasticsearch `_bulk` body.
//!
//! ```text
//! {"index":{"_index":"offers"}}
//! {"hotelid":7,"hotelname":"Seaside",...}
//! {"index":{"_index":"offers"}}
//! {...}
//! ```
//!
//! 🧠 Knowledge graph:
//! - One action line plus one source line per document, trailing `\n` mandatory.
//! - No `_id`: the store assigns one. Re-running a load into the same index duplicates,
//!   which is why `recreate_index` defaults to true.
//! - A chunk is split into several bodies when it would cross `max_request_size_bytes`.
//!   A single document larger than the limit still goes out, alone, and the cluster decides.
//!
//! Ancient proverb: "He who omits the trailing newline, debugs at 3am." 🦆

use anyhow::{Context, Result};

use crate::common::NormalizedOfferDocument;

/// 🎼 Renders documents into one or more `_bulk` payloads.
#[derive(Debug, Clone)]
pub(crate) struct BulkComposer {
    action_line: String,
    max_request_size_bytes: usize,
}

impl BulkComposer {
    pub(crate) fn new(index: &str, max_request_size_bytes: usize) -> Result<Self> {
        let action_line = serde_json::to_string(&serde_json::json!({ "index": { "_index": index } }))
            .context("💀 Could not render the bulk action line")?;
        Ok(Self {
            action_line,
            max_request_size_bytes,
        })
    }

    /// 📦 Compose payloads for `documents`. Empty input, empty output.
    pub(crate) fn compose(&self, documents: &[NormalizedOfferDocument]) -> Result<Vec<String>> {
        let mut payloads = Vec::new();
        let mut current = String::new();

        for document in documents {
            let source = serde_json::to_string(document)
                .context("💀 An offer document refused to become JSON")?;
            let entry_len = self.action_line.len() + source.len() + 2;
            if !current.is_empty() && current.len() + entry_len > self.max_request_size_bytes {
                payloads.push(std::mem::take(&mut current));
            }
            current.push_str(&self.action_line);
            current.push('\n');
            current.push_str(&source);
            current.push('\n');
        }

        if !current.is_empty() {
            payloads.push(current);
        }
        Ok(payloads)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn offer(hotel_id: i64) -> NormalizedOfferDocument {
        NormalizedOfferDocument {
            hotelid: Some(hotel_id),
            price: 100.0,
            outbounddeparturedatetime: "2024-03-01T06:00:00+0000".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn the_one_where_every_document_gets_an_action_line() -> Result<()> {
        let composer = BulkComposer::new("offers", usize::MAX)?;
        let payloads = composer.compose(&[offer(1), offer(2)])?;

        assert_eq!(payloads.len(), 1);
        let lines: Vec<&str> = payloads[0].lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[0], r#"{"index":{"_index":"offers"}}"#);
        assert_eq!(lines[2], r#"{"index":{"_index":"offers"}}"#);
        let second: serde_json::Value = serde_json::from_str(lines[3])?;
        assert_eq!(second["hotelid"], 2);
        assert!(payloads[0].ends_with('\n'), "trailing newline or bust");
        Ok(())
    }

    #[test]
    fn the_one_where_a_fat_chunk_is_split_without_losing_anyone() -> Result<()> {
        let one_entry = BulkComposer::new("offers", usize::MAX)?.compose(&[offer(1)])?[0].len();
        let composer = BulkComposer::new("offers", one_entry * 2)?;

        let docs: Vec<_> = (0..5).map(offer).collect();
        let payloads = composer.compose(&docs)?;

        assert_eq!(payloads.len(), 3, "two, two, one");
        let total_docs: usize = payloads.iter().map(|p| p.lines().count() / 2).sum();
        assert_eq!(total_docs, 5);
        assert!(payloads.iter().all(|p| p.len() <= one_entry * 2));
        Ok(())
    }

    #[test]
    fn the_one_where_nothing_composes_to_nothing() -> Result<()> {
        let composer = BulkComposer::new("offers", 1024)?;
        assert!(composer.compose(&[])?.is_empty());
        Ok(())
    }
}
