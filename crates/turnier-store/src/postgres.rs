//! Postgres store backend.

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::{QueryBuilder, Row};
use uuid::Uuid;

use turnier_core::{Candidate, Category, Month, Tournament, TournamentType};

use crate::{Page, StoreError, TournamentFilter, TournamentStore};

const SELECT_COLUMNS: &str = "id, name, month, year, start_date, end_date, city, country, \
     is_international, tournament_type, category, analysis, created_at, updated_at";

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = PgPool::connect(database_url).await?;
        Ok(Self::new(pool))
    }

    pub async fn migrate(&self) -> Result<(), StoreError> {
        tracing::info!("applying database migrations");
        sqlx::migrate!().run(&self.pool).await?;
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn row_to_tournament(row: &PgRow) -> Result<Tournament, StoreError> {
    let month_text: String = row.try_get("month")?;
    let month = Month::parse(&month_text)
        .ok_or_else(|| StoreError::Corrupt(format!("unknown month {month_text:?}")))?;

    let type_text: Option<String> = row.try_get("tournament_type")?;
    let tournament_type = type_text
        .map(|t| {
            TournamentType::parse(&t)
                .ok_or_else(|| StoreError::Corrupt(format!("unknown tournament type {t:?}")))
        })
        .transpose()?;

    let category_text: Option<String> = row.try_get("category")?;
    let category = category_text
        .map(|c| {
            Category::parse(&c)
                .ok_or_else(|| StoreError::Corrupt(format!("unknown category {c:?}")))
        })
        .transpose()?;

    Ok(Tournament {
        id: row.try_get::<Uuid, _>("id")?,
        name: row.try_get("name")?,
        month,
        year: row.try_get("year")?,
        start_date: row.try_get::<Option<NaiveDate>, _>("start_date")?,
        end_date: row.try_get::<Option<NaiveDate>, _>("end_date")?,
        city: row.try_get("city")?,
        country: row.try_get("country")?,
        is_international: row.try_get("is_international")?,
        tournament_type,
        category,
        analysis: row.try_get("analysis")?,
        created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
        updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
    })
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.code().as_deref() == Some("23505"))
}

fn push_filters(builder: &mut QueryBuilder<'_, sqlx::Postgres>, filter: &TournamentFilter) {
    if let Some(month) = filter.month {
        builder.push(" AND month = ").push_bind(month.as_str());
    }
    if let Some(year) = filter.year {
        builder.push(" AND year = ").push_bind(year);
    }
    if let Some(is_international) = filter.is_international {
        builder
            .push(" AND is_international = ")
            .push_bind(is_international);
    }
    if let Some(tournament_type) = filter.tournament_type {
        builder
            .push(" AND tournament_type = ")
            .push_bind(tournament_type.as_str());
    }
    if let Some(category) = filter.category {
        builder.push(" AND category = ").push_bind(category.as_str());
    }
}

fn month_order_sql() -> String {
    let names = Month::ALL
        .iter()
        .map(|m| format!("'{}'", m.as_str()))
        .collect::<Vec<_>>()
        .join(",");
    format!("array_position(ARRAY[{names}]::text[], month)")
}

#[async_trait]
impl TournamentStore for PgStore {
    async fn load_all(&self) -> Result<Vec<Tournament>, StoreError> {
        let rows = sqlx::query(&format!("SELECT {SELECT_COLUMNS} FROM tournaments"))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(row_to_tournament).collect()
    }

    async fn insert(
        &self,
        candidate: &Candidate,
        analysis: Option<String>,
    ) -> Result<Tournament, StoreError> {
        let now = Utc::now();
        let row = sqlx::query(&format!(
            "INSERT INTO tournaments \
             (id, name, month, year, start_date, end_date, city, country, \
              is_international, tournament_type, category, analysis, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $13) \
             RETURNING {SELECT_COLUMNS}"
        ))
        .bind(Uuid::new_v4())
        .bind(candidate.name.trim())
        .bind(candidate.month.as_str())
        .bind(candidate.year)
        .bind(candidate.start_date)
        .bind(candidate.end_date)
        .bind(candidate.city.as_deref())
        .bind(candidate.country.as_deref())
        .bind(candidate.is_international)
        .bind(candidate.tournament_type.map(|t| t.as_str()))
        .bind(candidate.category.map(|c| c.as_str()))
        .bind(analysis)
        .bind(now)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| {
            if is_unique_violation(&err) {
                StoreError::Conflict
            } else {
                StoreError::Database(err)
            }
        })?;
        row_to_tournament(&row)
    }

    async fn update(
        &self,
        id: Uuid,
        candidate: &Candidate,
        analysis: Option<String>,
    ) -> Result<Tournament, StoreError> {
        let row = sqlx::query(&format!(
            "UPDATE tournaments SET \
             name = $2, month = $3, year = $4, start_date = $5, end_date = $6, \
             city = $7, country = $8, is_international = $9, tournament_type = $10, \
             category = $11, analysis = $12, updated_at = $13 \
             WHERE id = $1 \
             RETURNING {SELECT_COLUMNS}"
        ))
        .bind(id)
        .bind(candidate.name.trim())
        .bind(candidate.month.as_str())
        .bind(candidate.year)
        .bind(candidate.start_date)
        .bind(candidate.end_date)
        .bind(candidate.city.as_deref())
        .bind(candidate.country.as_deref())
        .bind(candidate.is_international)
        .bind(candidate.tournament_type.map(|t| t.as_str()))
        .bind(candidate.category.map(|c| c.as_str()))
        .bind(analysis)
        .bind(Utc::now())
        .fetch_optional(&self.pool)
        .await?
        .ok_or(StoreError::NotFound(id))?;
        row_to_tournament(&row)
    }

    async fn search(
        &self,
        filter: &TournamentFilter,
        page: Page,
    ) -> Result<(Vec<Tournament>, u64), StoreError> {
        let mut count_query: QueryBuilder<sqlx::Postgres> =
            QueryBuilder::new("SELECT COUNT(*) FROM tournaments WHERE TRUE");
        push_filters(&mut count_query, filter);
        let total: i64 = count_query
            .build_query_scalar()
            .fetch_one(&self.pool)
            .await?;

        let mut query: QueryBuilder<sqlx::Postgres> = QueryBuilder::new(format!(
            "SELECT {SELECT_COLUMNS} FROM tournaments WHERE TRUE"
        ));
        push_filters(&mut query, filter);
        query.push(format!(" ORDER BY year, {}, name", month_order_sql()));
        query
            .push(" LIMIT ")
            .push_bind(i64::from(page.page_size))
            .push(" OFFSET ")
            .push_bind(i64::from(page.offset()));

        let rows = query.build().fetch_all(&self.pool).await?;
        let tournaments = rows
            .iter()
            .map(row_to_tournament)
            .collect::<Result<Vec<_>, _>>()?;
        Ok((tournaments, total as u64))
    }

    async fn distinct_months(&self) -> Result<Vec<Month>, StoreError> {
        let rows = sqlx::query("SELECT DISTINCT month FROM tournaments")
            .fetch_all(&self.pool)
            .await?;
        let mut months = rows
            .iter()
            .map(|row| {
                let text: String = row.try_get("month")?;
                Month::parse(&text)
                    .ok_or_else(|| StoreError::Corrupt(format!("unknown month {text:?}")))
            })
            .collect::<Result<Vec<_>, _>>()?;
        months.sort();
        Ok(months)
    }

    async fn distinct_years(&self) -> Result<Vec<i32>, StoreError> {
        let rows = sqlx::query("SELECT DISTINCT year FROM tournaments ORDER BY year")
            .fetch_all(&self.pool)
            .await?;
        rows.iter()
            .map(|row| row.try_get("year").map_err(StoreError::from))
            .collect()
    }

    async fn distinct_categories(&self) -> Result<Vec<Category>, StoreError> {
        let rows = sqlx::query(
            "SELECT DISTINCT category FROM tournaments \
             WHERE category IS NOT NULL ORDER BY category",
        )
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|row| {
                let text: String = row.try_get("category")?;
                Category::parse(&text)
                    .ok_or_else(|| StoreError::Corrupt(format!("unknown category {text:?}")))
            })
            .collect()
    }
}
