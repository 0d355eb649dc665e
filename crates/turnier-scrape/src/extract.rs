//! Tournament extraction from the listing page.
//!
//! The page is flattened into text lines, segmented into month sections, and
//! each remaining line is treated as one tournament block. Extraction is
//! best effort per block: a malformed block becomes a counted skip, never an
//! error for the run.

use std::sync::LazyLock;

use chrono::NaiveDate;
use regex::Regex;
use scraper::{Html, Node};

use turnier_core::{Candidate, Category, Month, TournamentType};

static YEAR_TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(19|20)\d\d\b").expect("valid year regex"));

static DATE_RANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(\d{1,2})\.(?:\s*(\d{1,2})\.)?\s*[-–—]\s*(\d{1,2})\.\s*(\d{1,2})\.(?:\s*(\d{4}))?")
        .expect("valid date range regex")
});

static DATE_SINGLE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(\d{1,2})\.\s*(\d{1,2})\.(?:\s*(\d{4}))?").expect("valid date regex"));

static IN_CITY: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\bin\s+([A-ZÄÖÜ][A-Za-zäöüß-]+)").expect("valid city regex")
});

/// Tokens that mark a tournament as international, from the source site's
/// own labeling conventions.
const INTERNATIONAL_MARKERS: &[&str] = &[
    "international",
    "world",
    "european",
    "europe",
    "fide",
    "weltmeisterschaft",
    "europameisterschaft",
];

/// Gazetteer of cities the source site regularly lists.
const CITIES: &[&str] = &[
    "Berlin",
    "Hamburg",
    "München",
    "Köln",
    "Frankfurt",
    "Stuttgart",
    "Düsseldorf",
    "Leipzig",
    "Dortmund",
    "Essen",
    "Dresden",
    "Bremen",
    "Hannover",
    "Nürnberg",
    "Duisburg",
    "Bochum",
    "Wuppertal",
    "Bonn",
    "Mannheim",
    "Karlsruhe",
    "Münster",
    "Wiesbaden",
    "Augsburg",
];

const COUNTRIES: &[&str] = &[
    "Germany",
    "France",
    "Spain",
    "Italy",
    "Netherlands",
    "Belgium",
    "Austria",
    "Switzerland",
    "Denmark",
    "Sweden",
    "Norway",
    "Finland",
    "Poland",
    "Czech Republic",
    "Hungary",
    "Romania",
    "Bulgaria",
    "Greece",
    "Portugal",
    "Ireland",
    "United Kingdom",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    NoName,
    NoMonth,
}

impl std::fmt::Display for SkipReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SkipReason::NoName => f.write_str("no usable tournament name"),
            SkipReason::NoMonth => f.write_str("no month context"),
        }
    }
}

/// Per-block extraction outcome; malformed blocks are data, not errors.
#[derive(Debug, Clone, PartialEq)]
pub enum ExtractionOutcome {
    Candidate(Candidate),
    Skipped { line: String, reason: SkipReason },
}

#[derive(Debug, Clone)]
struct Block {
    month: Option<Month>,
    year: i32,
    text: String,
}

/// Segmented page content; `outcomes()` is restartable.
#[derive(Debug)]
pub struct Extraction {
    blocks: Vec<Block>,
}

impl Extraction {
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    pub fn outcomes(&self) -> impl Iterator<Item = ExtractionOutcome> + '_ {
        self.blocks.iter().map(parse_block)
    }
}

pub struct Extractor {
    reference_year: i32,
}

impl Extractor {
    /// `reference_year` is used when the page itself carries no year token.
    pub fn new(reference_year: i32) -> Self {
        Self { reference_year }
    }

    pub fn extract(&self, content: &str) -> Extraction {
        let lines = page_lines(content);
        let page_year = lines
            .iter()
            .find_map(|line| find_year(line))
            .unwrap_or(self.reference_year);

        let mut blocks = Vec::new();
        let mut section: Option<(Month, i32)> = None;
        for line in lines {
            if let Some((month, header_year)) = month_header(&line) {
                section = Some((month, header_year.unwrap_or(page_year)));
                continue;
            }
            let (month, year) = match section {
                Some((month, year)) => (Some(month), year),
                None => (None, page_year),
            };
            blocks.push(Block { month, year, text: line });
        }

        tracing::debug!(blocks = blocks.len(), page_year, "segmented listing page");
        Extraction { blocks }
    }
}

/// Flatten markup to text lines. Block-level elements break lines, table
/// cells join with a space, so one listing row comes out as one line. Plain
/// text and markdown pass through on their own line breaks.
fn page_lines(content: &str) -> Vec<String> {
    const LINE_BREAKERS: &[&str] = &[
        "p", "div", "br", "li", "tr", "h1", "h2", "h3", "h4", "h5", "h6", "table", "ul", "ol",
        "section", "article",
    ];

    let document = Html::parse_document(content);
    let mut flat = String::new();
    for node in document.root_element().descendants() {
        match node.value() {
            Node::Element(element) => {
                if LINE_BREAKERS.contains(&element.name()) {
                    flat.push('\n');
                } else if element.name() == "td" || element.name() == "th" {
                    flat.push(' ');
                }
            }
            Node::Text(text) => flat.push_str(text),
            _ => {}
        }
    }

    flat.lines()
        .map(collapse_whitespace)
        .filter(|line| !line.is_empty())
        .collect()
}

fn collapse_whitespace(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn trim_token(token: &str) -> &str {
    token.trim_matches(|c: char| !c.is_alphanumeric())
}

fn parse_year_token(token: &str) -> Option<i32> {
    if token.len() != 4 || !token.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let year: i32 = token.parse().ok()?;
    (1990..=2099).contains(&year).then_some(year)
}

fn find_year(text: &str) -> Option<i32> {
    YEAR_TOKEN
        .find(text)
        .and_then(|m| parse_year_token(m.as_str()))
}

/// A header line opens a month section: its first token is a month name and
/// any remaining tokens are only years or further month names ("März 2025",
/// "March / April"). Lines with extra prose are tournament blocks instead.
fn month_header(line: &str) -> Option<(Month, Option<i32>)> {
    let mut tokens = line.split_whitespace();
    let month = Month::parse(trim_token(tokens.next()?))?;
    let mut year = None;
    for token in tokens {
        let token = trim_token(token);
        if token.is_empty() {
            continue;
        }
        if let Some(y) = parse_year_token(token) {
            year = Some(y);
            continue;
        }
        if Month::parse(token).is_some() {
            continue;
        }
        return None;
    }
    Some((month, year))
}

fn parse_block(block: &Block) -> ExtractionOutcome {
    let skipped = |reason| ExtractionOutcome::Skipped {
        line: block.text.clone(),
        reason,
    };

    let inline_month = block
        .text
        .split_whitespace()
        .find_map(|token| Month::parse(trim_token(token)));
    let month = match block.month.or(inline_month) {
        Some(month) => month,
        None => return skipped(SkipReason::NoMonth),
    };
    let year = find_year(&block.text).unwrap_or(block.year);

    let (start_date, end_date, remainder) = parse_dates(&block.text, year);
    let name = clean_name(&remainder);
    if name.chars().filter(|c| c.is_alphabetic()).count() < 4 || Month::parse(&name).is_some() {
        return skipped(SkipReason::NoName);
    }

    let lower = name.to_lowercase();
    let is_international = INTERNATIONAL_MARKERS
        .iter()
        .any(|marker| lower.contains(marker));
    let city = detect_city(&name);
    let country = detect_country(&name, city.is_some());
    let tournament_type = detect_type(&lower);
    let category = detect_category(&lower);

    ExtractionOutcome::Candidate(Candidate {
        name,
        month,
        year,
        start_date,
        end_date,
        city,
        country,
        is_international,
        tournament_type,
        category,
    })
}

/// Recognize `DD.MM.-DD.MM.[YYYY]`, `DD.-DD.MM.`, and single `DD.MM.`
/// substrings. Returns the dates plus the block text with the matched
/// substring removed, so it does not pollute the name.
fn parse_dates(text: &str, year: i32) -> (Option<NaiveDate>, Option<NaiveDate>, String) {
    if let Some(caps) = DATE_RANGE.captures(text) {
        let start_day: u32 = caps[1].parse().unwrap_or(0);
        let end_day: u32 = caps[3].parse().unwrap_or(0);
        let end_month: u32 = caps[4].parse().unwrap_or(0);
        let start_month: u32 = caps
            .get(2)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(end_month);
        let year = caps
            .get(5)
            .and_then(|m| parse_year_token(m.as_str()))
            .unwrap_or(year);
        // A range like 28.12.-03.01. rolls over into the next year.
        let end_year = if end_month < start_month { year + 1 } else { year };

        let start = NaiveDate::from_ymd_opt(year, start_month, start_day);
        let end = NaiveDate::from_ymd_opt(end_year, end_month, end_day);
        if let Some(start) = start {
            let remainder = text.replacen(caps.get(0).map_or("", |m| m.as_str()), " ", 1);
            return (Some(start), end, remainder);
        }
    }

    if let Some(caps) = DATE_SINGLE.captures(text) {
        let day: u32 = caps[1].parse().unwrap_or(0);
        let month: u32 = caps[2].parse().unwrap_or(0);
        let year = caps
            .get(3)
            .and_then(|m| parse_year_token(m.as_str()))
            .unwrap_or(year);
        if let Some(start) = NaiveDate::from_ymd_opt(year, month, day) {
            let remainder = text.replacen(caps.get(0).map_or("", |m| m.as_str()), " ", 1);
            return (Some(start), None, remainder);
        }
    }

    (None, None, text.to_string())
}

fn clean_name(text: &str) -> String {
    collapse_whitespace(text.trim_matches(|c: char| {
        c.is_whitespace() || matches!(c, ',' | ';' | ':' | '-' | '–' | '—' | '.' | '|' | '*')
    }))
}

fn detect_city(name: &str) -> Option<String> {
    for city in CITIES {
        if name.contains(city) {
            return Some((*city).to_string());
        }
    }
    IN_CITY
        .captures(name)
        .map(|caps| caps[1].to_string())
}

fn detect_country(name: &str, has_city: bool) -> Option<String> {
    for country in COUNTRIES {
        if name.contains(country) {
            return Some((*country).to_string());
        }
    }
    // The source is a German listing site: a gazetteer city implies Germany.
    has_city.then(|| "Germany".to_string())
}

fn detect_type(lower: &str) -> Option<TournamentType> {
    if lower.contains("rapid") || lower.contains("schnell") {
        Some(TournamentType::Rapid)
    } else if lower.contains("blitz") {
        Some(TournamentType::Blitz)
    } else if lower.contains("online") || lower.contains("internet") {
        Some(TournamentType::Online)
    } else if lower.contains("standard") {
        Some(TournamentType::Standard)
    } else {
        None
    }
}

fn detect_category(lower: &str) -> Option<Category> {
    let youth_age_group = lower
        .split_whitespace()
        .map(trim_token)
        .any(|token| {
            let mut chars = token.chars();
            chars.next() == Some('u')
                && token.len() > 1
                && chars.all(|c| c.is_ascii_digit())
        });

    if youth_age_group
        || lower.contains("junior")
        || lower.contains("jugend")
        || lower.contains("youth")
    {
        Some(Category::Youth)
    } else if lower.contains("women") || lower.contains("frauen") || lower.contains("damen") {
        Some(Category::Women)
    } else if lower.contains("senior") {
        Some(Category::Senior)
    } else if lower.contains("team") || lower.contains("mannschaft") || lower.contains("verein") {
        Some(Category::Team)
    } else if lower.contains("open") {
        Some(Category::Open)
    } else {
        None
    }
}
