//! Pattern-only entity extraction.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::LazyLock;

use chrono::Datelike;
use regex::Regex;
use rollcall_core::patterns;
use rollcall_core::ExtractedEntities;
use serde::Serialize;

/// Earliest graduation year considered plausible.
pub const MIN_YEAR: i32 = 1950;

/// Longest year range that is expanded into individual years.
pub const MAX_RANGE_YEARS: i32 = 15;

static YEAR_RANGE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b((?:19|20)\d{2})\s*(?:-|–|to|till|until|through)\s*((?:19|20)\d{2})\b")
        .expect("static pattern compiles")
});

static YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(?:19|20)\d{2}\b").expect("static pattern compiles"));

static LOCATION_FALLBACK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b(?:based in|in|at|from|near)\s+([a-z][a-z]+)").expect("static pattern compiles")
});

static BARE_IT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\bIT\b").expect("static pattern compiles"));

/// Words after a two-digit number that make it a quantity, not a year.
const QUANTITY_UNITS: &[&str] = &[
    "cr", "crore", "crores", "lakh", "lakhs", "lac", "lacs", "years", "yrs", "year", "%",
    "percent", "members", "people",
];

/// Words that follow "in"/"at"/"from" without being places.
const NOT_PLACES: &[&str] = &[
    "touch", "general", "particular", "total", "house", "office", "charge", "future", "past",
    "present", "time", "need", "least", "most", "order", "case", "person", "town",
    "india", "abroad", "city",
];

/// One recognizer family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityFamily {
    Year,
    Location,
    Degree,
    Branch,
    Skills,
    Services,
    Turnover,
}

impl fmt::Display for EntityFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityFamily::Year => "year",
            EntityFamily::Location => "location",
            EntityFamily::Degree => "degree",
            EntityFamily::Branch => "branch",
            EntityFamily::Skills => "skills",
            EntityFamily::Services => "services",
            EntityFamily::Turnover => "turnover",
        };
        f.write_str(name)
    }
}

/// Entities found by pattern matching, with a confidence and the families
/// that fired.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RegexExtraction {
    pub entities: ExtractedEntities,
    pub confidence: f64,
    pub families: Vec<EntityFamily>,
}

/// Pattern-only extractor.
///
/// # Examples
///
/// ```
/// use rollcall_extract::RegexExtractor;
///
/// let extractor = RegexExtractor::with_current_year(2025);
/// let result = extractor.extract("1995 mechanical batch in Chennai");
/// assert_eq!(result.entities.graduation_year, vec![1995]);
/// assert_eq!(result.entities.location.as_deref(), Some("Chennai"));
/// assert_eq!(result.entities.branch, vec!["Mechanical"]);
/// assert!(result.confidence >= 0.75);
/// ```
#[derive(Debug, Clone)]
pub struct RegexExtractor {
    current_year: i32,
}

impl Default for RegexExtractor {
    fn default() -> Self {
        Self::new()
    }
}

impl RegexExtractor {
    /// Extractor that treats the local calendar year as "now".
    pub fn new() -> Self {
        Self::with_current_year(chrono::Local::now().year())
    }

    pub fn with_current_year(current_year: i32) -> Self {
        Self { current_year }
    }

    pub fn current_year(&self) -> i32 {
        self.current_year
    }

    /// Run every recognizer over the query.
    pub fn extract(&self, query: &str) -> RegexExtraction {
        let raw = query.trim();
        let lower = raw.to_lowercase();
        let mut entities = ExtractedEntities::default();
        let mut families = Vec::new();

        entities.graduation_year = self.years(&lower);
        if !entities.graduation_year.is_empty() {
            families.push(EntityFamily::Year);
        }

        entities.location = location(&lower);
        if entities.location.is_some() {
            families.push(EntityFamily::Location);
        }

        entities.degree = patterns::find_degrees(&lower, raw);
        if !entities.degree.is_empty() {
            families.push(EntityFamily::Degree);
        }

        entities.branch = patterns::find_branches(&lower);
        if !entities.branch.is_empty() {
            families.push(EntityFamily::Branch);
        }

        entities.skills = patterns::find_skills(&lower);
        if BARE_IT.is_match(raw) && !entities.skills.iter().any(|s| s == "IT") {
            entities.skills.push("IT".into());
        }
        if !entities.skills.is_empty() {
            families.push(EntityFamily::Skills);
        }

        entities.services = patterns::find_services(&lower);
        if !entities.services.is_empty() {
            families.push(EntityFamily::Services);
        }

        entities.turnover_requirement = patterns::find_turnover_tier(&lower);
        if entities.turnover_requirement.is_some() {
            families.push(EntityFamily::Turnover);
        }

        entities.enforce_disjoint();

        RegexExtraction {
            confidence: confidence(&families),
            entities,
            families,
        }
    }

    fn plausible(&self, year: i32) -> bool {
        (MIN_YEAR..=self.current_year).contains(&year)
    }

    fn years(&self, lower: &str) -> Vec<i32> {
        let mut years = BTreeSet::new();

        for caps in YEAR_RANGE.captures_iter(lower) {
            let (Some(a), Some(b)) = (caps.get(1), caps.get(2)) else {
                continue;
            };
            let (Ok(a), Ok(b)) = (a.as_str().parse::<i32>(), b.as_str().parse::<i32>()) else {
                continue;
            };
            let (start, end) = (a.min(b), a.max(b));
            if !self.plausible(start) || !self.plausible(end) {
                continue;
            }
            if end - start < MAX_RANGE_YEARS {
                years.extend(start..=end);
            } else {
                years.insert(start);
                years.insert(end);
            }
        }

        for m in YEAR.find_iter(lower) {
            if let Ok(year) = m.as_str().parse::<i32>() {
                if self.plausible(year) {
                    years.insert(year);
                }
            }
        }

        if patterns::has_graduation_context(lower) {
            let tokens: Vec<&str> = lower.split_whitespace().collect();
            for (i, token) in tokens.iter().enumerate() {
                let digits = token
                    .trim_start_matches(['\'', '’'])
                    .trim_end_matches(|c: char| matches!(c, ',' | '.' | ';' | '!' | '?' | '\''));
                if digits.len() != 2 || !digits.chars().all(|c| c.is_ascii_digit()) {
                    continue;
                }
                if tokens
                    .get(i + 1)
                    .is_some_and(|next| QUANTITY_UNITS.contains(next))
                {
                    continue;
                }
                let Ok(yy) = digits.parse::<i32>() else {
                    continue;
                };
                let year = if yy <= self.current_year % 100 {
                    2000 + yy
                } else {
                    1900 + yy
                };
                if self.plausible(year) {
                    years.insert(year);
                }
            }
        }

        years.into_iter().collect()
    }
}

fn location(lower: &str) -> Option<String> {
    if let Some(city) = patterns::find_city(lower) {
        return Some(city.to_string());
    }
    LOCATION_FALLBACK
        .captures_iter(lower)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str())
        .find(|token| {
            token.len() >= 3
                && !patterns::is_filler(token)
                && !NOT_PLACES.contains(token)
                && !patterns::contains_domain_vocabulary(token)
                && patterns::find_turnover_tier(token).is_none()
        })
        .map(patterns::title_case)
}

/// Confidence from the families that fired.
///
/// # Examples
///
/// ```
/// use rollcall_extract::regex_extract::{confidence, EntityFamily};
///
/// assert_eq!(confidence(&[]), 0.0);
/// assert!((confidence(&[EntityFamily::Skills]) - 0.55).abs() < 1e-9);
/// assert!((confidence(&[EntityFamily::Year, EntityFamily::Location]) - 0.8).abs() < 1e-9);
/// ```
pub fn confidence(families: &[EntityFamily]) -> f64 {
    let count = families.len();
    let mut score = match count {
        0 => return 0.0,
        1 => 0.6,
        2 => 0.75,
        n => (0.75 + 0.1 * (n - 2) as f64).min(0.95),
    };
    if families.contains(&EntityFamily::Year) {
        score += 0.05;
    }
    if count == 1 && matches!(families[0], EntityFamily::Skills | EntityFamily::Services) {
        score -= 0.05;
    }
    score.clamp(0.0, 1.0)
}
