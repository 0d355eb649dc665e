//! Core domain model for the Schachinter tournament tracker.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const CRATE_NAME: &str = "turnier-core";

/// Calendar month, serialized as its canonical English name.
///
/// The source site mixes German full names, English full names, and
/// three-letter abbreviations; `parse` accepts all of them.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub enum Month {
    January,
    February,
    March,
    April,
    May,
    June,
    July,
    August,
    September,
    October,
    November,
    December,
}

impl Month {
    pub const ALL: [Month; 12] = [
        Month::January,
        Month::February,
        Month::March,
        Month::April,
        Month::May,
        Month::June,
        Month::July,
        Month::August,
        Month::September,
        Month::October,
        Month::November,
        Month::December,
    ];

    pub fn parse(token: &str) -> Option<Month> {
        let token = token.trim().to_lowercase();
        let month = match token.as_str() {
            "january" | "januar" | "jan" => Month::January,
            "february" | "februar" | "feb" => Month::February,
            "march" | "märz" | "maerz" | "mar" => Month::March,
            "april" | "apr" => Month::April,
            "may" | "mai" => Month::May,
            "june" | "juni" | "jun" => Month::June,
            "july" | "juli" | "jul" => Month::July,
            "august" | "aug" => Month::August,
            "september" | "sep" => Month::September,
            "october" | "oktober" | "oct" | "okt" => Month::October,
            "november" | "nov" => Month::November,
            "december" | "dezember" | "dec" | "dez" => Month::December,
            _ => return None,
        };
        Some(month)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Month::January => "January",
            Month::February => "February",
            Month::March => "March",
            Month::April => "April",
            Month::May => "May",
            Month::June => "June",
            Month::July => "July",
            Month::August => "August",
            Month::September => "September",
            Month::October => "October",
            Month::November => "November",
            Month::December => "December",
        }
    }

    pub fn number(&self) -> u32 {
        *self as u32 + 1
    }

    pub fn from_number(n: u32) -> Option<Month> {
        Month::ALL.get(n.checked_sub(1)? as usize).copied()
    }
}

impl std::fmt::Display for Month {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Time control class, matched against a fixed vocabulary during extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TournamentType {
    Standard,
    Rapid,
    Blitz,
    Online,
}

impl TournamentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TournamentType::Standard => "Standard",
            TournamentType::Rapid => "Rapid",
            TournamentType::Blitz => "Blitz",
            TournamentType::Online => "Online",
        }
    }

    pub fn parse(token: &str) -> Option<TournamentType> {
        match token.trim().to_lowercase().as_str() {
            "standard" => Some(TournamentType::Standard),
            "rapid" => Some(TournamentType::Rapid),
            "blitz" => Some(TournamentType::Blitz),
            "online" => Some(TournamentType::Online),
            _ => None,
        }
    }
}

impl std::fmt::Display for TournamentType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Player-group category, matched against a fixed vocabulary during extraction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Category {
    Open,
    Women,
    Senior,
    Youth,
    Team,
}

impl Category {
    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Open => "Open",
            Category::Women => "Women",
            Category::Senior => "Senior",
            Category::Youth => "Youth",
            Category::Team => "Team",
        }
    }

    pub fn parse(token: &str) -> Option<Category> {
        match token.trim().to_lowercase().as_str() {
            "open" => Some(Category::Open),
            "women" => Some(Category::Women),
            "senior" => Some(Category::Senior),
            "youth" => Some(Category::Youth),
            "team" => Some(Category::Team),
            _ => None,
        }
    }
}

impl std::fmt::Display for Category {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lowercase a text field and collapse interior whitespace.
///
/// Used both for identity keys and for descriptive-field comparison, so
/// "Berlin  Open " and "berlin open" reconcile as equal.
pub fn normalize_text(s: &str) -> String {
    s.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn opt_text_eq(a: Option<&str>, b: Option<&str>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => normalize_text(a) == normalize_text(b),
        _ => false,
    }
}

/// Dedup key for a tournament: normalized name + month + year.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct IdentityKey {
    pub name: String,
    pub month: Month,
    pub year: i32,
}

impl IdentityKey {
    pub fn new(name: &str, month: Month, year: i32) -> Self {
        Self {
            name: normalize_text(name),
            month,
            year,
        }
    }
}

/// A tournament freshly parsed from a page, not yet reconciled against
/// storage. Carries no analysis and no bookkeeping fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub name: String,
    pub month: Month,
    pub year: i32,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub is_international: bool,
    pub tournament_type: Option<TournamentType>,
    pub category: Option<Category>,
}

impl Candidate {
    pub fn identity_key(&self) -> IdentityKey {
        IdentityKey::new(&self.name, self.month, self.year)
    }

    /// True when every descriptive field equals the stored record's, after
    /// normalization. Identity, analysis, and bookkeeping fields do not
    /// participate.
    pub fn descriptive_matches(&self, stored: &Tournament) -> bool {
        self.start_date == stored.start_date
            && self.end_date == stored.end_date
            && opt_text_eq(self.city.as_deref(), stored.city.as_deref())
            && opt_text_eq(self.country.as_deref(), stored.country.as_deref())
            && self.is_international == stored.is_international
            && self.tournament_type == stored.tournament_type
            && self.category == stored.category
    }
}

/// Persisted tournament record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tournament {
    pub id: Uuid,
    pub name: String,
    pub month: Month,
    pub year: i32,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub city: Option<String>,
    pub country: Option<String>,
    pub is_international: bool,
    pub tournament_type: Option<TournamentType>,
    pub category: Option<Category>,
    pub analysis: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Tournament {
    pub fn identity_key(&self) -> IdentityKey {
        IdentityKey::new(&self.name, self.month, self.year)
    }
}
