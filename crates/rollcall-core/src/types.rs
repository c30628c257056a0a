use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::names;

/// Coarse purpose of a directory query.
///
/// # Examples
///
/// ```
/// use rollcall_core::Intent;
///
/// let intent: Intent = "find_peers".parse().unwrap();
/// assert_eq!(intent, Intent::FindPeers);
/// assert_eq!(intent.to_string(), "find_peers");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// Looking for a business, vendor or service provider.
    FindBusiness,
    /// Looking for batchmates, classmates or alumni by cohort.
    FindPeers,
    /// Looking up one named person.
    FindSpecificPerson,
    /// Looking for alumni who run businesses.
    FindAlumniBusiness,
}

impl Intent {
    /// All intents in tie-break order.
    pub const ALL: [Intent; 4] = [
        Intent::FindBusiness,
        Intent::FindPeers,
        Intent::FindSpecificPerson,
        Intent::FindAlumniBusiness,
    ];

    /// `true` for intents whose results are businesses rather than people.
    pub fn is_business(self) -> bool {
        matches!(self, Intent::FindBusiness | Intent::FindAlumniBusiness)
    }
}

impl fmt::Display for Intent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Intent::FindBusiness => write!(f, "find_business"),
            Intent::FindPeers => write!(f, "find_peers"),
            Intent::FindSpecificPerson => write!(f, "find_specific_person"),
            Intent::FindAlumniBusiness => write!(f, "find_alumni_business"),
        }
    }
}

impl FromStr for Intent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "find_business" => Ok(Intent::FindBusiness),
            "find_peers" => Ok(Intent::FindPeers),
            "find_specific_person" => Ok(Intent::FindSpecificPerson),
            "find_alumni_business" => Ok(Intent::FindAlumniBusiness),
            other => Err(format!("unknown intent: {other}")),
        }
    }
}

/// Output of the intent classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentResult {
    /// Highest-scoring intent.
    pub primary: Intent,
    /// Runner-up scoring at least half of the primary.
    pub secondary: Option<Intent>,
    /// Normalized confidence in `[0, 1]`.
    pub confidence: f64,
    /// Identifiers of the rules that fired, e.g. `find_peers:batch`.
    #[serde(default)]
    pub matched_patterns: Vec<String>,
}

/// Required business size bucket.
///
/// # Examples
///
/// ```
/// use rollcall_core::TurnoverTier;
///
/// let tier: TurnoverTier = serde_json::from_str("\"high\"").unwrap();
/// assert_eq!(tier, TurnoverTier::High);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TurnoverTier {
    Low,
    Medium,
    High,
}

impl fmt::Display for TurnoverTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TurnoverTier::Low => write!(f, "low"),
            TurnoverTier::Medium => write!(f, "medium"),
            TurnoverTier::High => write!(f, "high"),
        }
    }
}

impl FromStr for TurnoverTier {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "low" => Ok(TurnoverTier::Low),
            "medium" | "mid" => Ok(TurnoverTier::Medium),
            "high" => Ok(TurnoverTier::High),
            other => Err(format!("unknown turnover tier: {other}")),
        }
    }
}

/// Sparse set of structured values pulled out of a query.
///
/// An absent field (or an empty set) means "unconstrained".
///
/// # Examples
///
/// ```
/// use rollcall_core::ExtractedEntities;
///
/// let entities = ExtractedEntities {
///     graduation_year: vec![1995],
///     location: Some("Chennai".into()),
///     ..ExtractedEntities::default()
/// };
/// assert!(!entities.is_empty());
/// let json = serde_json::to_value(&entities).unwrap();
/// assert_eq!(json["graduationYear"][0], 1995);
/// assert!(json.get("skills").is_none());
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractedEntities {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub graduation_year: Vec<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub degree: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub branch: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub skills: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub services: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turnover_requirement: Option<TurnoverTier>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub organization_name: Option<String>,
}

impl ExtractedEntities {
    /// `true` when no field constrains the search.
    pub fn is_empty(&self) -> bool {
        self == &Self::default()
    }

    /// Drop services whose surface form also appears in skills.
    ///
    /// Keeps the skills/services split disjoint after merging sources.
    pub fn enforce_disjoint(&mut self) {
        let skills: Vec<String> = self.skills.iter().map(|s| s.to_lowercase()).collect();
        self.services
            .retain(|service| !skills.contains(&service.to_lowercase()));
    }
}

/// Which extraction path produced a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMethod {
    Regex,
    Llm,
    Hybrid,
    Cached,
}

impl fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExtractionMethod::Regex => write!(f, "regex"),
            ExtractionMethod::Llm => write!(f, "llm"),
            ExtractionMethod::Hybrid => write!(f, "hybrid"),
            ExtractionMethod::Cached => write!(f, "cached"),
        }
    }
}

/// Sub-extractor that produced a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldSource {
    Regex,
    Llm,
    Both,
}

/// Entities plus the bookkeeping of how they were obtained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionResult {
    pub entities: ExtractedEntities,
    /// Combined confidence in `[0, 1]`.
    pub confidence: f64,
    pub method: ExtractionMethod,
    pub elapsed_ms: u64,
    /// Field name (camelCase) to the extractor that supplied it.
    #[serde(default)]
    pub provenance: BTreeMap<String, FieldSource>,
    /// Search phrase proposed by the generative path, if it ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub search_query: Option<String>,
}

/// Inclusive graduation year range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct YearRange {
    pub min: i32,
    pub max: i32,
}

impl YearRange {
    pub fn contains(&self, year: i32) -> bool {
        (self.min..=self.max).contains(&year)
    }
}

/// Annual turnover bounds in rupees; `max` is exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TurnoverBounds {
    pub min: Option<f64>,
    pub max: Option<f64>,
}

impl TurnoverBounds {
    pub fn contains(&self, value: f64) -> bool {
        self.min.map_or(true, |min| value >= min) && self.max.map_or(true, |max| value < max)
    }
}

/// Retrieval constraints derived from [`ExtractedEntities`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchFilters {
    pub location: Option<String>,
    pub skills: Vec<String>,
    pub services: Vec<String>,
    /// Explicit graduation years; takes precedence over `year_range`.
    pub graduation_years: Vec<i32>,
    pub year_range: Option<YearRange>,
    pub degrees: Vec<String>,
    pub branches: Vec<String>,
    pub turnover: Option<TurnoverBounds>,
    pub organization: Option<String>,
}

impl SearchFilters {
    /// `true` when every member passes.
    pub fn is_unconstrained(&self) -> bool {
        self == &Self::default()
    }

    /// Check `member` against every constraint.
    ///
    /// Returns the names of the constrained dimensions it satisfied, or
    /// `None` if any constraint fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use rollcall_core::{Member, SearchFilters};
    ///
    /// let member = Member {
    ///     city: Some("Chennai".into()),
    ///     graduation_year: Some(1995),
    ///     ..Member::new("m1", "Anand Kumar")
    /// };
    /// let filters = SearchFilters {
    ///     location: Some("chennai".into()),
    ///     graduation_years: vec![1995],
    ///     ..SearchFilters::default()
    /// };
    /// assert_eq!(
    ///     filters.evaluate(&member),
    ///     Some(vec!["location".to_string(), "graduationYear".to_string()])
    /// );
    /// ```
    pub fn evaluate(&self, member: &Member) -> Option<Vec<String>> {
        let mut matched = Vec::new();

        if let Some(location) = &self.location {
            let city = member.city.as_deref()?;
            if !city.eq_ignore_ascii_case(location) {
                return None;
            }
            matched.push("location".to_string());
        }

        if !self.graduation_years.is_empty() {
            let year = member.graduation_year?;
            if !self.graduation_years.contains(&year) {
                return None;
            }
            matched.push("graduationYear".to_string());
        } else if let Some(range) = self.year_range {
            let year = member.graduation_year?;
            if !range.contains(year) {
                return None;
            }
            matched.push("graduationYear".to_string());
        }

        if !self.degrees.is_empty() {
            let degree = squash(member.degree.as_deref()?);
            if !self.degrees.iter().any(|d| squash(d) == degree) {
                return None;
            }
            matched.push("degree".to_string());
        }

        if !self.branches.is_empty() {
            let branch = member.branch.as_deref()?.to_lowercase();
            if !self
                .branches
                .iter()
                .map(|b| b.to_lowercase())
                .any(|b| branch.contains(&b) || b.contains(&branch))
            {
                return None;
            }
            matched.push("branch".to_string());
        }

        if !self.skills.is_empty() {
            if !overlaps(&self.skills, &member.skills) {
                return None;
            }
            matched.push("skills".to_string());
        }

        if !self.services.is_empty() {
            if !overlaps(&self.services, &member.services) {
                return None;
            }
            matched.push("services".to_string());
        }

        if let Some(bounds) = self.turnover {
            let turnover = member.annual_turnover?;
            if !bounds.contains(turnover) {
                return None;
            }
            matched.push("turnover".to_string());
        }

        if let Some(org) = &self.organization {
            let member_org = member.organization.as_deref()?.to_lowercase();
            if !member_org.contains(&org.to_lowercase()) {
                return None;
            }
            matched.push("organization".to_string());
        }

        Some(matched)
    }
}

fn squash(s: &str) -> String {
    s.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

fn overlaps(wanted: &[String], have: &[String]) -> bool {
    wanted
        .iter()
        .any(|w| have.iter().any(|h| h.eq_ignore_ascii_case(w)))
}

/// A directory profile.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Member {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub graduation_year: Option<i32>,
    #[serde(default)]
    pub degree: Option<String>,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub organization: Option<String>,
    #[serde(default)]
    pub designation: Option<String>,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub services: Vec<String>,
    /// Annual turnover in rupees.
    #[serde(default)]
    pub annual_turnover: Option<f64>,
    #[serde(default)]
    pub bio: Option<String>,
}

impl Member {
    /// Minimal member with only identity fields set.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    /// Name tokens with honorifics and initials removed.
    pub fn name_tokens(&self) -> Vec<String> {
        names::name_tokens(&self.name)
    }
}

/// A ranked candidate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScoredMember {
    pub member: Member,
    pub semantic_score: f64,
    pub keyword_score: f64,
    pub relevance_score: f64,
    pub is_exact_match: bool,
    #[serde(default)]
    pub matched_fields: Vec<String>,
}

/// Field to order results by within each exact/non-exact partition.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortField {
    #[default]
    Relevance,
    Name,
    Year,
    Turnover,
}

impl FromStr for SortField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "relevance" => Ok(SortField::Relevance),
            "name" => Ok(SortField::Name),
            "year" => Ok(SortField::Year),
            "turnover" => Ok(SortField::Turnover),
            other => Err(format!("unknown sort field: {other}")),
        }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "asc" | "ascending" => Ok(SortOrder::Asc),
            "desc" | "descending" => Ok(SortOrder::Desc),
            other => Err(format!("unknown sort order: {other}")),
        }
    }
}

/// Page bookkeeping for a ranked result list.
///
/// # Examples
///
/// ```
/// use rollcall_core::Pagination;
///
/// let page = Pagination::new(2, 10, 25);
/// assert_eq!(page.total_pages, 3);
/// assert!(page.has_more);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: usize,
    pub per_page: usize,
    pub total: usize,
    pub total_pages: usize,
    pub has_more: bool,
}

impl Pagination {
    pub fn new(page: usize, per_page: usize, total: usize) -> Self {
        let page = page.max(1);
        let per_page = per_page.max(1);
        let total_pages = total.div_ceil(per_page);
        Self {
            page,
            per_page,
            total,
            total_pages,
            has_more: page < total_pages,
        }
    }

    /// Index range of this page within the full list.
    pub fn bounds(&self) -> std::ops::Range<usize> {
        let start = self
            .page
            .saturating_sub(1)
            .saturating_mul(self.per_page)
            .min(self.total);
        let end = start.saturating_add(self.per_page).min(self.total);
        start..end
    }
}

/// Output format for CLI subcommands.
///
/// # Examples
///
/// ```
/// use rollcall_core::OutputFormat;
///
/// let fmt: OutputFormat = "json".parse().unwrap();
/// assert_eq!(fmt, OutputFormat::Json);
///
/// let fmt: OutputFormat = "md".parse().unwrap();
/// assert_eq!(fmt, OutputFormat::Markdown);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable summaries.
    #[default]
    Text,
    /// Machine-readable JSON with camelCase keys.
    Json,
    /// Markdown-formatted output.
    Markdown,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
            OutputFormat::Markdown => write!(f, "markdown"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "markdown" | "md" => Ok(OutputFormat::Markdown),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn business_member() -> Member {
        Member {
            city: Some("Coimbatore".into()),
            graduation_year: Some(2004),
            degree: Some("B.E".into()),
            branch: Some("Mechanical Engineering".into()),
            organization: Some("Kovai Precision Castings".into()),
            services: vec!["Manufacturing".into()],
            skills: vec!["CAD".into()],
            annual_turnover: Some(250_000_000.0),
            ..Member::new("m7", "Priya Raman")
        }
    }

    #[test]
    fn intent_roundtrips_through_json() {
        let json = serde_json::to_string(&Intent::FindAlumniBusiness).unwrap();
        assert_eq!(json, "\"find_alumni_business\"");
        let parsed: Intent = serde_json::from_str("\"find_specific_person\"").unwrap();
        assert_eq!(parsed, Intent::FindSpecificPerson);
        assert!("find_cats".parse::<Intent>().is_err());
    }

    #[test]
    fn enforce_disjoint_drops_duplicate_services() {
        let mut entities = ExtractedEntities {
            skills: vec!["Python".into()],
            services: vec!["python".into(), "Catering".into()],
            ..ExtractedEntities::default()
        };
        entities.enforce_disjoint();
        assert_eq!(entities.services, vec!["Catering".to_string()]);
    }

    #[test]
    fn unconstrained_filters_accept_everyone() {
        let filters = SearchFilters::default();
        assert!(filters.is_unconstrained());
        assert_eq!(filters.evaluate(&business_member()), Some(Vec::new()));
    }

    #[test]
    fn evaluate_reports_matched_fields() {
        let filters = SearchFilters {
            location: Some("coimbatore".into()),
            degrees: vec!["BE".into()],
            branches: vec!["Mechanical".into()],
            services: vec!["manufacturing".into()],
            turnover: Some(TurnoverBounds {
                min: Some(100_000_000.0),
                max: None,
            }),
            ..SearchFilters::default()
        };
        let matched = filters.evaluate(&business_member()).unwrap();
        assert_eq!(
            matched,
            vec!["location", "degree", "branch", "services", "turnover"]
        );
    }

    #[test]
    fn evaluate_rejects_missing_or_mismatched_values() {
        let member = business_member();
        let wrong_city = SearchFilters {
            location: Some("Chennai".into()),
            ..SearchFilters::default()
        };
        assert!(wrong_city.evaluate(&member).is_none());

        let range = SearchFilters {
            year_range: Some(YearRange { min: 1990, max: 2000 }),
            ..SearchFilters::default()
        };
        assert!(range.evaluate(&member).is_none());

        let no_turnover = Member::new("m8", "Someone");
        let tier = SearchFilters {
            turnover: Some(TurnoverBounds {
                min: None,
                max: Some(10_000_000.0),
            }),
            ..SearchFilters::default()
        };
        assert!(tier.evaluate(&no_turnover).is_none());
    }

    #[test]
    fn pagination_bounds_clamp_to_total() {
        let page = Pagination::new(3, 10, 25);
        assert_eq!(page.bounds(), 20..25);
        assert!(!page.has_more);

        let beyond = Pagination::new(5, 10, 25);
        assert_eq!(beyond.bounds(), 25..25);

        let empty = Pagination::new(1, 10, 0);
        assert_eq!(empty.total_pages, 0);
        assert_eq!(empty.bounds(), 0..0);
    }

    #[test]
    fn huge_page_numbers_saturate() {
        let page = Pagination::new(usize::MAX, 2, 5);
        assert!(page.bounds().is_empty());
        assert_eq!(page.bounds(), 5..5);
        assert!(!page.has_more);

        let wide = Pagination::new(2, usize::MAX, 5);
        assert!(wide.bounds().is_empty());
    }

    #[test]
    fn scored_member_serializes_camel_case() {
        let scored = ScoredMember {
            member: Member::new("m1", "A"),
            semantic_score: 0.5,
            keyword_score: 0.2,
            relevance_score: 0.41,
            is_exact_match: false,
            matched_fields: vec![],
        };
        let json = serde_json::to_value(&scored).unwrap();
        assert!(json.get("relevanceScore").is_some());
        assert!(json.get("isExactMatch").is_some());
        assert!(json.get("relevance_score").is_none());
    }

    #[test]
    fn output_format_from_str() {
        assert_eq!("text".parse::<OutputFormat>().unwrap(), OutputFormat::Text);
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert_eq!(
            "markdown".parse::<OutputFormat>().unwrap(),
            OutputFormat::Markdown
        );
        assert!("xml".parse::<OutputFormat>().is_err());
    }
}
