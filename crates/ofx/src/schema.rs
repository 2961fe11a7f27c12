//! 🏗️ The offer index: its mapping, and the settings dance around a bulk load.
//!
//! Before a load the index trades durability for speed: no refreshes, no replicas.
//! After the load, success or not, it gets both back. An index left at
//! `refresh_interval: -1` looks empty to every search, which is a fun bug to explain.

use anyhow::{Context, Result};
use serde_json::{Value, json};
use tracing::info;

use crate::store::DocumentStore;

/// 🗺️ Field types of the offer index. Field names match `NormalizedOfferDocument`.
pub fn offer_index_mappings() -> Value {
    json!({
        "properties": {
            "hotelid": { "type": "integer" },
            "hotelname": { "type": "keyword" },
            "hotelstars": { "type": "float" },
            "price": { "type": "float" },
            "countadults": { "type": "integer" },
            "countchildren": { "type": "integer" },
            "duration": { "type": "integer" },
            "mealtype": { "type": "keyword" },
            "oceanview": { "type": "boolean" },
            "roomtype": { "type": "keyword" },
            "outbounddeparturedatetime": { "type": "date" },
            "inbounddeparturedatetime": { "type": "date" },
            "outboundarrivaldatetime": { "type": "date" },
            "inboundarrivaldatetime": { "type": "date" },
            "outbounddepartureairport": { "type": "keyword" },
            "outboundarrivalairport": { "type": "keyword" },
            "inbounddepartureairport": { "type": "keyword" },
            "inboundarrivalairport": { "type": "keyword" }
        }
    })
}

fn bulk_load_settings() -> Value {
    json!({ "index": { "refresh_interval": "-1", "number_of_replicas": 0 } })
}

fn serving_settings() -> Value {
    json!({ "index": { "refresh_interval": "1s", "number_of_replicas": 1 } })
}

/// 🏗️ Get `index` ready for a bulk load.
///
/// Steps:
/// 1. If it exists and `recreate` is set, delete it.
/// 2. If it does not exist (anymore), create it with the offer mapping.
/// 3. Switch off refreshes and replicas for the duration of the load.
pub async fn prepare_index(store: &dyn DocumentStore, index: &str, recreate: bool) -> Result<()> {
    let mut exists = store
        .index_exists(index)
        .await
        .context("💀 Could not find out whether the offer index exists")?;
    if exists && recreate {
        info!("🗑️ Index '{index}' exists and will be recreated");
        store.delete_index(index).await?;
        exists = false;
    }
    if !exists {
        store.create_index(index, &offer_index_mappings()).await?;
        info!("🏗️ Created index '{index}'");
    } else {
        info!("📦 Appending to existing index '{index}'");
    }
    store
        .put_settings(index, &bulk_load_settings())
        .await
        .context("💀 Could not switch the offer index into bulk-load mode")?;
    Ok(())
}

/// 🔧 Put refreshes and replicas back. Call it even when the load failed.
pub async fn restore_index(store: &dyn DocumentStore, index: &str) -> Result<()> {
    store
        .put_settings(index, &serving_settings())
        .await
        .context(format!(
            "💀 Could not restore serving settings on '{index}'. Searches will not see new documents until refresh_interval is set back by hand."
        ))?;
    info!("🔧 Index '{index}' is back to serving settings");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::BulkReport;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// 🧪 Remembers every call, in order, as a short string.
    #[derive(Debug, Default)]
    struct RecordingStore {
        exists: bool,
        calls: Mutex<Vec<String>>,
    }

    impl RecordingStore {
        fn log(&self, call: String) {
            self.calls.lock().expect("💀 poisoned test mutex").push(call);
        }

        fn calls(&self) -> Vec<String> {
            self.calls.lock().expect("💀 poisoned test mutex").clone()
        }
    }

    #[async_trait]
    impl DocumentStore for RecordingStore {
        async fn ping(&self) -> Result<()> {
            Ok(())
        }
        async fn index_exists(&self, index: &str) -> Result<bool> {
            self.log(format!("exists {index}"));
            Ok(self.exists)
        }
        async fn create_index(&self, index: &str, mappings: &Value) -> Result<()> {
            self.log(format!("create {index} {}", mappings["properties"]["hotelid"]["type"]));
            Ok(())
        }
        async fn delete_index(&self, index: &str) -> Result<()> {
            self.log(format!("delete {index}"));
            Ok(())
        }
        async fn put_settings(&self, index: &str, settings: &Value) -> Result<()> {
            self.log(format!("settings {index} {}", settings["index"]["refresh_interval"]));
            Ok(())
        }
        async fn bulk(&self, _payload: &str) -> Result<BulkReport> {
            Ok(BulkReport::default())
        }
        async fn search(&self, _index: &str, _body: &Value) -> Result<Value> {
            Ok(Value::Null)
        }
    }

    #[tokio::test]
    async fn the_one_where_an_old_index_is_torn_down_first() -> Result<()> {
        let store = RecordingStore { exists: true, ..Default::default() };
        prepare_index(&store, "offers", true).await?;
        assert_eq!(
            store.calls(),
            vec![
                "exists offers",
                "delete offers",
                "create offers \"integer\"",
                "settings offers \"-1\""
            ]
        );
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_appending_keeps_the_index() -> Result<()> {
        let store = RecordingStore { exists: true, ..Default::default() };
        prepare_index(&store, "offers", false).await?;
        assert_eq!(store.calls(), vec!["exists offers", "settings offers \"-1\""]);
        Ok(())
    }

    #[tokio::test]
    async fn the_one_where_the_lights_come_back_on() -> Result<()> {
        let store = RecordingStore::default();
        restore_index(&store, "offers").await?;
        assert_eq!(store.calls(), vec!["settings offers \"1s\""]);
        Ok(())
    }

    #[test]
    fn the_one_where_the_mapping_covers_every_document_field() -> Result<()> {
        let doc = serde_json::to_value(crate::common::NormalizedOfferDocument::default())?;
        let mappings = offer_index_mappings();
        let Some(fields) = doc.as_object() else {
            panic!("💀 documents serialize as objects");
        };
        for field in fields.keys() {
            assert!(
                mappings["properties"].get(field).is_some(),
                "{field} is missing from the mapping"
            );
        }
        Ok(())
    }
}
