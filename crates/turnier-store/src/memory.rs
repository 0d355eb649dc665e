//! In-memory store backend.
//!
//! Implements the same contract as Postgres over a mutexed vector. Used by
//! the pipeline and web tests, and usable for offline runs.

use std::collections::BTreeSet;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use turnier_core::{Candidate, Category, Month, Tournament};

use crate::{Page, StoreError, TournamentFilter, TournamentStore};

#[derive(Debug, Default)]
pub struct MemoryStore {
    rows: Mutex<Vec<Tournament>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn matches_filter(row: &Tournament, filter: &TournamentFilter) -> bool {
    filter.month.is_none_or(|m| row.month == m)
        && filter.year.is_none_or(|y| row.year == y)
        && filter.is_international.is_none_or(|i| row.is_international == i)
        && filter
            .tournament_type
            .is_none_or(|t| row.tournament_type == Some(t))
        && filter.category.is_none_or(|c| row.category == Some(c))
}

#[async_trait]
impl TournamentStore for MemoryStore {
    async fn load_all(&self) -> Result<Vec<Tournament>, StoreError> {
        Ok(self.rows.lock().await.clone())
    }

    async fn insert(
        &self,
        candidate: &Candidate,
        analysis: Option<String>,
    ) -> Result<Tournament, StoreError> {
        let mut rows = self.rows.lock().await;
        let key = candidate.identity_key();
        if rows.iter().any(|row| row.identity_key() == key) {
            return Err(StoreError::Conflict);
        }

        let now = Utc::now();
        let record = Tournament {
            id: Uuid::new_v4(),
            name: candidate.name.clone(),
            month: candidate.month,
            year: candidate.year,
            start_date: candidate.start_date,
            end_date: candidate.end_date,
            city: candidate.city.clone(),
            country: candidate.country.clone(),
            is_international: candidate.is_international,
            tournament_type: candidate.tournament_type,
            category: candidate.category,
            analysis,
            created_at: now,
            updated_at: now,
        };
        rows.push(record.clone());
        Ok(record)
    }

    async fn update(
        &self,
        id: Uuid,
        candidate: &Candidate,
        analysis: Option<String>,
    ) -> Result<Tournament, StoreError> {
        let mut rows = self.rows.lock().await;
        let row = rows
            .iter_mut()
            .find(|row| row.id == id)
            .ok_or(StoreError::NotFound(id))?;

        row.name = candidate.name.clone();
        row.month = candidate.month;
        row.year = candidate.year;
        row.start_date = candidate.start_date;
        row.end_date = candidate.end_date;
        row.city = candidate.city.clone();
        row.country = candidate.country.clone();
        row.is_international = candidate.is_international;
        row.tournament_type = candidate.tournament_type;
        row.category = candidate.category;
        row.analysis = analysis;
        row.updated_at = Utc::now();
        Ok(row.clone())
    }

    async fn search(
        &self,
        filter: &TournamentFilter,
        page: Page,
    ) -> Result<(Vec<Tournament>, u64), StoreError> {
        let rows = self.rows.lock().await;
        let mut matched: Vec<Tournament> = rows
            .iter()
            .filter(|row| matches_filter(row, filter))
            .cloned()
            .collect();
        matched.sort_by(|a, b| {
            a.year
                .cmp(&b.year)
                .then(a.month.cmp(&b.month))
                .then(a.name.cmp(&b.name))
        });
        let total = matched.len() as u64;
        let page_rows = matched
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.page_size as usize)
            .collect();
        Ok((page_rows, total))
    }

    async fn distinct_months(&self) -> Result<Vec<Month>, StoreError> {
        let rows = self.rows.lock().await;
        Ok(rows
            .iter()
            .map(|row| row.month)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect())
    }

    async fn distinct_years(&self) -> Result<Vec<i32>, StoreError> {
        let rows = self.rows.lock().await;
        Ok(rows
            .iter()
            .map(|row| row.year)
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect())
    }

    async fn distinct_categories(&self) -> Result<Vec<Category>, StoreError> {
        let rows = self.rows.lock().await;
        let mut categories: Vec<Category> = rows
            .iter()
            .filter_map(|row| row.category)
            .collect::<Vec<_>>();
        categories.sort_by_key(|c| c.as_str());
        categories.dedup();
        Ok(categories)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use turnier_core::TournamentType;

    fn candidate(name: &str, month: Month, year: i32) -> Candidate {
        Candidate {
            name: name.to_string(),
            month,
            year,
            start_date: None,
            end_date: None,
            city: None,
            country: None,
            is_international: false,
            tournament_type: None,
            category: None,
        }
    }

    #[tokio::test]
    async fn insert_sets_both_timestamps_and_update_preserves_created_at() {
        let store = MemoryStore::new();
        let inserted = store
            .insert(&candidate("Open A", Month::June, 2025), None)
            .await
            .unwrap();
        assert_eq!(inserted.created_at, inserted.updated_at);

        let mut changed = candidate("Open A", Month::June, 2025);
        changed.city = Some("Berlin".to_string());
        let updated = store
            .update(inserted.id, &changed, Some("analysis".to_string()))
            .await
            .unwrap();
        assert_eq!(updated.created_at, inserted.created_at);
        assert!(updated.updated_at >= updated.created_at);
        assert_eq!(updated.city.as_deref(), Some("Berlin"));
        assert_eq!(updated.analysis.as_deref(), Some("analysis"));
    }

    #[tokio::test]
    async fn duplicate_identity_key_surfaces_conflict() {
        let store = MemoryStore::new();
        store
            .insert(&candidate("Open A", Month::June, 2025), None)
            .await
            .unwrap();
        let err = store
            .insert(&candidate("  open a ", Month::June, 2025), None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict));
    }

    #[tokio::test]
    async fn update_of_unknown_id_is_not_found() {
        let store = MemoryStore::new();
        let err = store
            .update(Uuid::new_v4(), &candidate("Open A", Month::June, 2025), None)
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[tokio::test]
    async fn search_filters_and_paginates() {
        let store = MemoryStore::new();
        for (name, month, year) in [
            ("Open A", Month::June, 2025),
            ("Open B", Month::June, 2025),
            ("Open C", Month::July, 2025),
            ("Open D", Month::June, 2024),
        ] {
            store.insert(&candidate(name, month, year), None).await.unwrap();
        }
        let mut blitz = candidate("Blitz Night", Month::June, 2025);
        blitz.tournament_type = Some(TournamentType::Blitz);
        store.insert(&blitz, None).await.unwrap();

        let filter = TournamentFilter {
            month: Some(Month::June),
            year: Some(2025),
            ..Default::default()
        };
        let (rows, total) = store.search(&filter, Page::new(1, 2)).await.unwrap();
        assert_eq!(total, 3);
        assert_eq!(rows.len(), 2);

        let (rest, _) = store.search(&filter, Page::new(2, 2)).await.unwrap();
        assert_eq!(rest.len(), 1);

        let filter = TournamentFilter {
            tournament_type: Some(TournamentType::Blitz),
            ..Default::default()
        };
        let (rows, total) = store.search(&filter, Page::default()).await.unwrap();
        assert_eq!(total, 1);
        assert_eq!(rows[0].name, "Blitz Night");
    }

    #[tokio::test]
    async fn distinct_listings_are_sorted_and_deduplicated() {
        let store = MemoryStore::new();
        for (name, month, year) in [
            ("Open A", Month::July, 2025),
            ("Open B", Month::February, 2025),
            ("Open C", Month::February, 2024),
        ] {
            store.insert(&candidate(name, month, year), None).await.unwrap();
        }

        assert_eq!(
            store.distinct_months().await.unwrap(),
            vec![Month::February, Month::July]
        );
        assert_eq!(store.distinct_years().await.unwrap(), vec![2024, 2025]);
        assert!(store.distinct_categories().await.unwrap().is_empty());
    }
}
