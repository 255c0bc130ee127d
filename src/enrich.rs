use crate::config::EngineConfig;
use crate::data::{distinct_labels, field_label, Record};
use crate::detect::detect_identity_field;
use crate::error::{ChartError, Result};
use crate::source::{FetchQuery, RecordSource};
use anyhow::anyhow;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Left join of an auxiliary collection onto primary records.
#[derive(Debug, Clone, PartialEq)]
pub struct JoinSpec {
    pub collection: String,
    pub primary_key: String,
    pub auxiliary_key: String,
    pub fields_to_include: Vec<String>,
}

/// Relational enricher. Holds the shared read-only config and the backend
/// auxiliary rows are fetched from.
#[derive(Clone)]
pub struct Enricher {
    config: Arc<EngineConfig>,
    source: Arc<dyn RecordSource>,
}

impl Enricher {
    pub fn new(config: Arc<EngineConfig>, source: Arc<dyn RecordSource>) -> Self {
        Self { config, source }
    }

    /// Join that would bring `field` onto `records`: the records' identity
    /// field is matched against the identity field of the first collection
    /// (by name) that declares `field`.
    pub fn plan_for_field(&self, records: &[Record], field: &str) -> Option<JoinSpec> {
        let primary_key = detect_identity_field(records)?;
        self.config
            .collections_with_field(field)
            .into_iter()
            .find_map(|collection| {
                self.config
                    .identity_field_of(collection)
                    .map(|auxiliary_key| JoinSpec {
                        collection: collection.to_string(),
                        primary_key: primary_key.to_string(),
                        auxiliary_key: auxiliary_key.to_string(),
                        fields_to_include: vec![field.to_string()],
                    })
            })
    }

    /// Copy `join.fields_to_include` from matching auxiliary rows onto new
    /// records. Unmatched records pass through unchanged; when several
    /// auxiliary rows share a key the first one wins.
    pub fn enrich(&self, records: &[Record], join: &JoinSpec) -> Result<Vec<Record>> {
        let unavailable = |source: anyhow::Error| ChartError::EnrichmentUnavailable {
            collection: join.collection.clone(),
            source,
        };

        if records.is_empty() {
            return Ok(Vec::new());
        }
        if self.config.collection(&join.collection).is_none() {
            return Err(unavailable(anyhow!(
                "collection '{}' is not configured",
                join.collection
            )));
        }

        let keys = distinct_labels(records, &join.primary_key);
        let query = FetchQuery::table(&join.collection)
            .with_keys(&join.auxiliary_key, keys)
            .with_fields(join.fields_to_include.clone());
        let rows = self.source.fetch(&query).map_err(unavailable)?;

        let mut lookup: HashMap<String, &Record> = HashMap::new();
        for row in &rows {
            if let Some(key) = field_label(row, &join.auxiliary_key) {
                lookup.entry(key).or_insert(row);
            }
        }

        let mut matched = 0usize;
        let enriched: Vec<Record> = records
            .iter()
            .map(|record| {
                let aux = field_label(record, &join.primary_key).and_then(|k| lookup.get(&k));
                match aux {
                    Some(aux) => {
                        matched += 1;
                        let mut out = record.clone();
                        for field in &join.fields_to_include {
                            if let Some(v) = aux.get(field) {
                                out.insert(field.clone(), v.clone());
                            }
                        }
                        out
                    }
                    None => record.clone(),
                }
            })
            .collect();

        debug!(
            collection = %join.collection,
            fetched = rows.len(),
            matched,
            total = records.len(),
            "enriched records"
        );
        Ok(enriched)
    }
}
