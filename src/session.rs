use crate::models::{EnrichedRecord, StoredRow};
use crate::query;
use std::collections::HashMap;

/// What the presenter currently has on screen: the last enriched batch and
/// the last stored listing. Searches run against these in-memory copies.
#[derive(Debug, Clone, Default)]
pub struct Session {
    loaded: Vec<EnrichedRecord>,
    stored: Vec<StoredRow>,
    stored_ids: HashMap<u32, i64>,
}

impl Session {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the loaded batch. `stored` are the rows the batch was merged
    /// into, in the same order, so each sequence id maps to its stored id.
    pub fn remember_load(&mut self, batch: Vec<EnrichedRecord>, stored: &[StoredRow]) {
        self.stored_ids = batch
            .iter()
            .zip(stored.iter())
            .map(|(record, row)| (record.sequence_id, row.id))
            .collect();
        self.loaded = batch;
    }

    /// Replaces the loaded batch without persisting it.
    pub fn remember_preview(&mut self, batch: Vec<EnrichedRecord>) {
        self.stored_ids.clear();
        self.loaded = batch;
    }

    pub fn remember_listing(&mut self, rows: Vec<StoredRow>) {
        self.stored = rows;
    }

    /// Swaps the cached copy of a row after it changed in the store.
    pub fn refresh_row(&mut self, row: &StoredRow) {
        if let Some(cached) = self.stored.iter_mut().find(|cached| cached.id == row.id) {
            *cached = row.clone();
        }
    }

    pub fn loaded(&self) -> &[EnrichedRecord] {
        &self.loaded
    }

    pub fn stored(&self) -> &[StoredRow] {
        &self.stored
    }

    pub fn stored_id_for(&self, sequence_id: u32) -> Option<i64> {
        self.stored_ids.get(&sequence_id).copied()
    }

    pub fn search_loaded(&self, query: &str) -> Vec<EnrichedRecord> {
        query::search(&self.loaded, query)
    }

    pub fn search_stored(&self, query: &str) -> Vec<StoredRow> {
        query::search(&self.stored, query)
    }
}

#[cfg(test)]
mod tests {
    use super::Session;
    use crate::metrics::enrich;
    use crate::models::{RawRecord, StoredRow};
    use chrono::{NaiveDate, Utc};

    fn raw(name: &str) -> RawRecord {
        RawRecord {
            product_name: Some(name.to_string()),
            stock: Some(1.0),
            units_sold: Some(0.0),
            unit_cost: Some(1.0),
            ordering_cost: Some(1.0),
            lead_time_days: Some(1.0),
            intake_date: None,
            last_intake_date: None,
        }
    }

    fn stored(id: i64, name: &str) -> StoredRow {
        StoredRow {
            id,
            product_name: name.to_string(),
            stock: 1.0,
            units_sold: 0.0,
            intake_total: 1.0,
            monthly_turnover: Default::default(),
            stockout_days: Default::default(),
            purchase_strategy: None,
            holding_cost: Default::default(),
            reorder_quantity: Default::default(),
            notes: String::new(),
            imported_at: Utc::now(),
        }
    }

    #[test]
    fn maps_sequence_ids_to_stored_ids() {
        let as_of = NaiveDate::from_ymd_opt(2026, 10, 18)
            .and_then(|date| date.and_hms_opt(0, 0, 0))
            .expect("clock");
        let batch = enrich(&[raw("Bolt"), raw("Nut")], as_of).expect("enrich");
        let mut session = Session::new();
        session.remember_load(batch, &[stored(7, "Bolt"), stored(8, "Nut")]);

        assert_eq!(session.stored_id_for(1), Some(7));
        assert_eq!(session.stored_id_for(2), Some(8));
        assert_eq!(session.stored_id_for(3), None);
        assert_eq!(session.search_loaded("nu").len(), 1);

        session.remember_preview(session.loaded().to_vec());
        assert_eq!(session.stored_id_for(1), None);
    }

    #[test]
    fn searches_the_chosen_corpus() {
        let mut session = Session::new();
        session.remember_listing(vec![stored(1, "Hex Bolt"), stored(2, "Washer")]);
        assert!(session.search_loaded("bolt").is_empty());
        assert_eq!(session.search_stored("BOLT")[0].id, 1);
        assert_eq!(session.search_stored("").len(), 2);
    }

    #[test]
    fn refresh_row_replaces_cached_listing_entry() {
        let mut session = Session::new();
        session.remember_listing(vec![stored(1, "Hex Bolt"), stored(2, "Washer")]);
        let mut updated = stored(2, "Washer");
        updated.notes = "recount".to_string();
        session.refresh_row(&updated);
        assert_eq!(session.stored()[1].notes, "recount");

        session.refresh_row(&stored(9, "Ghost"));
        assert_eq!(session.stored().len(), 2);
    }
}
