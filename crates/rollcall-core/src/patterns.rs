//! Normalization tables and keyword sets shared by extraction and retrieval.
//!
//! Everything here is static data plus pure lookups. Regex tables are
//! compiled once, on first use.

use std::collections::HashSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::types::{TurnoverBounds, TurnoverTier};

/// One crore rupees.
pub const CRORE: f64 = 10_000_000.0;

/// Upper bound (exclusive) of the `low` turnover tier.
pub const LOW_TURNOVER_MAX: f64 = CRORE;

/// Lower bound (inclusive) of the `high` turnover tier.
pub const HIGH_TURNOVER_MIN: f64 = 10.0 * CRORE;

/// City aliases, lower-case alias first, canonical name second.
pub const CITY_ALIASES: &[(&str, &str)] = &[
    ("chennai", "Chennai"),
    ("madras", "Chennai"),
    ("bangalore", "Bangalore"),
    ("bengaluru", "Bangalore"),
    ("blr", "Bangalore"),
    ("mumbai", "Mumbai"),
    ("bombay", "Mumbai"),
    ("kolkata", "Kolkata"),
    ("calcutta", "Kolkata"),
    ("new delhi", "Delhi"),
    ("delhi", "Delhi"),
    ("hyderabad", "Hyderabad"),
    ("secunderabad", "Hyderabad"),
    ("coimbatore", "Coimbatore"),
    ("kovai", "Coimbatore"),
    ("madurai", "Madurai"),
    ("trichy", "Tiruchirappalli"),
    ("tiruchi", "Tiruchirappalli"),
    ("tiruchirappalli", "Tiruchirappalli"),
    ("salem", "Salem"),
    ("erode", "Erode"),
    ("tirunelveli", "Tirunelveli"),
    ("nellai", "Tirunelveli"),
    ("vellore", "Vellore"),
    ("hosur", "Hosur"),
    ("pondicherry", "Puducherry"),
    ("puducherry", "Puducherry"),
    ("pune", "Pune"),
    ("poona", "Pune"),
    ("kochi", "Kochi"),
    ("cochin", "Kochi"),
    ("trivandrum", "Thiruvananthapuram"),
    ("thiruvananthapuram", "Thiruvananthapuram"),
    ("mysore", "Mysuru"),
    ("mysuru", "Mysuru"),
    ("vizag", "Visakhapatnam"),
    ("visakhapatnam", "Visakhapatnam"),
    ("gurgaon", "Gurugram"),
    ("gurugram", "Gurugram"),
    ("noida", "Noida"),
    ("ahmedabad", "Ahmedabad"),
    ("dubai", "Dubai"),
    ("singapore", "Singapore"),
];

/// Degree patterns (matched on lower-cased text) and canonical labels.
pub const DEGREE_PATTERNS: &[(&str, &str)] = &[
    (r"\bb\.\s?e\b|\bbachelor of engineering\b", "B.E"),
    (r"\bb\.?\s?tech\b", "B.Tech"),
    (r"\bm\.\s?e\b|\bmaster of engineering\b", "M.E"),
    (r"\bm\.?\s?tech\b", "M.Tech"),
    (r"\bmba\b", "MBA"),
    (r"\bbba\b", "BBA"),
    (r"\bmca\b", "MCA"),
    (r"\bbca\b", "BCA"),
    (r"\bb\.?\s?sc\b", "B.Sc"),
    (r"\bm\.?\s?sc\b", "M.Sc"),
    (r"\bb\.?\s?com\b", "B.Com"),
    (r"\bm\.?\s?com\b", "M.Com"),
    (r"\bb\.?\s?arch\b", "B.Arch"),
    (r"\bph\.?\s?d\b", "PhD"),
    (r"\bdiploma\b", "Diploma"),
];

/// Upper-case-only degree spellings, matched against the raw query because
/// their lower-case forms are ordinary English words.
pub const DEGREE_UPPER_PATTERNS: &[(&str, &str)] = &[(r"\bBE\b", "B.E"), (r"\bME\b", "M.E")];

/// Branch patterns and the canonical synonyms each one stands for.
pub const BRANCH_PATTERNS: &[(&str, &[&str])] = &[
    (r"\bmech(?:anical)?\b", &["Mechanical"]),
    (r"\bcivil\b", &["Civil"]),
    (r"\bcse\b|\bcomputer science\b", &["CSE", "Computer Science"]),
    (
        r"\bece\b|\belectronics (?:and|&) communications?\b",
        &["ECE", "Electronics and Communication"],
    ),
    (
        r"\beee\b|\belectrical(?: (?:and|&) electronics)?\b",
        &["EEE", "Electrical and Electronics"],
    ),
    (r"\binformation technology\b", &["IT", "Information Technology"]),
    (
        r"\beie\b|\binstrumentation\b",
        &["EIE", "Electronics and Instrumentation"],
    ),
    (r"\bchemical\b", &["Chemical"]),
    (r"\bproduction\b", &["Production"]),
    (r"\baero(?:nautical|space)?\b", &["Aeronautical"]),
    (r"\bautomobile\b|\bautomotive\b", &["Automobile"]),
    (r"\bmechatronics\b", &["Mechatronics"]),
    (r"\bbiotech(?:nology)?\b", &["Biotechnology"]),
    (r"\btextile\b", &["Textile"]),
    (r"\bmetallurg(?:y|ical)\b", &["Metallurgy"]),
];

/// Skill surface terms and canonical labels. Never shares a surface term
/// with [`SERVICE_TERMS`].
pub const SKILL_TERMS: &[(&str, &str)] = &[
    ("python", "Python"),
    ("java", "Java"),
    ("javascript", "JavaScript"),
    ("typescript", "TypeScript"),
    ("react", "React"),
    ("angular", "Angular"),
    ("node.js", "Node.js"),
    ("nodejs", "Node.js"),
    ("golang", "Go"),
    ("c++", "C++"),
    (".net", ".NET"),
    ("dotnet", ".NET"),
    ("sql", "SQL"),
    ("data science", "Data Science"),
    ("data analytics", "Data Analytics"),
    ("data analysis", "Data Analytics"),
    ("machine learning", "Machine Learning"),
    ("ml", "Machine Learning"),
    ("deep learning", "Deep Learning"),
    ("artificial intelligence", "AI"),
    ("ai", "AI"),
    ("aws", "AWS"),
    ("azure", "Azure"),
    ("cloud computing", "Cloud Computing"),
    ("devops", "DevOps"),
    ("kubernetes", "Kubernetes"),
    ("docker", "Docker"),
    ("cybersecurity", "Cybersecurity"),
    ("cyber security", "Cybersecurity"),
    ("blockchain", "Blockchain"),
    ("embedded systems", "Embedded Systems"),
    ("vlsi", "VLSI"),
    ("autocad", "AutoCAD"),
    ("cad", "CAD"),
    ("solidworks", "SolidWorks"),
    ("project management", "Project Management"),
    ("product management", "Product Management"),
    ("ui/ux", "UI/UX"),
    ("ux design", "UI/UX"),
    ("digital marketing", "Digital Marketing"),
    ("sap", "SAP"),
    ("salesforce", "Salesforce"),
    ("android", "Android"),
    ("ios", "iOS"),
    ("flutter", "Flutter"),
    ("full stack", "Full Stack"),
    ("fullstack", "Full Stack"),
];

/// Service surface terms and canonical labels.
pub const SERVICE_TERMS: &[(&str, &str)] = &[
    ("catering", "Catering"),
    ("caterer", "Catering"),
    ("caterers", "Catering"),
    ("interior design", "Interior Design"),
    ("interior designing", "Interior Design"),
    ("interiors", "Interior Design"),
    ("construction", "Construction"),
    ("builder", "Construction"),
    ("real estate", "Real Estate"),
    ("legal services", "Legal Services"),
    ("lawyer", "Legal Services"),
    ("advocate", "Legal Services"),
    ("chartered accountant", "Accounting & Tax"),
    ("accounting", "Accounting & Tax"),
    ("auditing", "Accounting & Tax"),
    ("gst filing", "Accounting & Tax"),
    ("insurance", "Insurance"),
    ("travel agency", "Travel"),
    ("tours and travels", "Travel"),
    ("event management", "Event Management"),
    ("wedding planner", "Event Management"),
    ("printing", "Printing"),
    ("logistics", "Logistics"),
    ("transport", "Logistics"),
    ("manufacturing", "Manufacturing"),
    ("web development", "Web Development"),
    ("website development", "Web Development"),
    ("app development", "App Development"),
    ("photography", "Photography"),
    ("solar installation", "Solar Energy"),
    ("solar", "Solar Energy"),
    ("healthcare", "Healthcare"),
    ("hospital", "Healthcare"),
    ("clinic", "Healthcare"),
    ("pharmacy", "Pharmacy"),
    ("coaching", "Education & Training"),
    ("tuition", "Education & Training"),
    ("garments", "Textiles & Garments"),
    ("jewellery", "Jewellery"),
    ("jewelry", "Jewellery"),
    ("restaurant", "Restaurant"),
    ("consultancy", "Consulting"),
    ("consulting", "Consulting"),
    ("recruitment", "Recruitment"),
    ("staffing", "Recruitment"),
    ("packaging", "Packaging"),
    ("car dealer", "Automobile Dealership"),
    ("advertising", "Advertising & Marketing"),
    ("marketing agency", "Advertising & Marketing"),
    ("plumbing", "Plumbing"),
];

/// Turnover families, evaluated high → medium → low. The families are
/// written so no phrase matches more than one of them.
pub const HIGH_TURNOVER_PATTERNS: &[&str] = &[
    r"\b(?:high|huge|large|big|top)[\s-]+(?:turnover|revenue|sales)\b",
    r"\b(?:large|big)[\s-]+(?:scale|enterprises?|companies|company|businesses|business|firms?)\b",
    r"\b[1-9]\d+\s*\+?\s*(?:cr|crores?)\b",
];

pub const MEDIUM_TURNOVER_PATTERNS: &[&str] = &[
    r"\b(?:medium|mid|moderate|average)[\s-]+(?:turnover|revenue|sized?|scale)\b",
    r"\b[1-9]\s*\+?\s*(?:cr|crores?)\b",
    r"\bsmes?\b",
];

pub const LOW_TURNOVER_PATTERNS: &[&str] = &[
    r"\b(?:low|small|modest)[\s-]+(?:turnover|revenue|scale)\b",
    r"\b(?:small|micro|tiny|home)[\s-]+(?:business|businesses|company|companies|firms?|enterprises?|units?)\b",
    r"\b\d+\s*(?:lakhs?|lacs?)\b",
];

/// Words that put a bare two-digit number in graduation-year context.
pub const GRADUATION_KEYWORDS: &str = r"\b(?:batch|class of|passed out|pass out|passout|graduated|graduation|alumni|alumnus|year of passing|yop)\b";

/// Filler removed from a search phrase before retrieval.
pub const FILLER_WORDS: &[&str] = &[
    "what", "who", "whom", "whose", "which", "where", "when", "how", "why", "is", "are", "was",
    "were", "am", "be", "i", "me", "my", "mine", "we", "us", "our", "you", "your", "they",
    "them", "their", "he", "she", "him", "her", "his", "find", "need", "needs", "show", "get",
    "give", "list", "search", "searching", "looking", "look", "want", "wants", "require",
    "required", "tell", "know", "anyone", "someone", "somebody", "any", "some", "people",
    "person", "persons", "please", "pls", "kindly", "can", "could", "would", "should", "will",
    "do", "does", "did", "have", "has", "the", "a", "an", "of", "for", "in", "at", "to",
    "from", "with", "on", "by", "about", "there", "here", "all", "details", "contact",
    "member", "members", "profile",
];

/// Domain words that make a query "not a bare person name".
pub const DOMAIN_WORDS: &[&str] = &[
    "batch", "batchmates", "batchmate", "classmates", "classmate", "alumni", "alumnus",
    "company", "companies", "business", "businesses", "services", "service", "vendor",
    "vendors", "supplier", "suppliers", "provider", "providers", "firm", "startup", "startups",
    "engineer", "engineers", "developer", "developers", "doctor", "doctors", "consultant",
    "consultants", "entrepreneur", "entrepreneurs", "founder", "founders", "owner", "owners",
    "turnover", "revenue", "crore", "crores", "lakh", "lakhs", "senior", "seniors", "junior",
    "juniors", "peers", "friends", "working", "works", "job", "jobs", "experts", "expert",
];

struct Keyword {
    re: Regex,
    canonical: &'static str,
}

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static pattern compiles")
}

fn keyword_regex(term: &str) -> Regex {
    compile(&format!(
        r"(?:^|[^a-z0-9]){}(?:$|[^a-z0-9])",
        regex::escape(term)
    ))
}

fn keyword_table(terms: &'static [(&'static str, &'static str)]) -> Vec<Keyword> {
    terms
        .iter()
        .map(|(term, canonical)| Keyword {
            re: keyword_regex(term),
            canonical,
        })
        .collect()
}

static SKILL_TABLE: LazyLock<Vec<Keyword>> = LazyLock::new(|| keyword_table(SKILL_TERMS));
static SERVICE_TABLE: LazyLock<Vec<Keyword>> = LazyLock::new(|| keyword_table(SERVICE_TERMS));

static CITY_TABLE: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    let mut aliases: Vec<&(&str, &str)> = CITY_ALIASES.iter().collect();
    // Longest alias first so "new delhi" beats "delhi".
    aliases.sort_by_key(|(alias, _)| std::cmp::Reverse(alias.len()));
    aliases
        .into_iter()
        .map(|(alias, canonical)| (keyword_regex(alias), *canonical))
        .collect()
});

static DEGREE_TABLE: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    DEGREE_PATTERNS
        .iter()
        .map(|(p, c)| (compile(p), *c))
        .collect()
});

static DEGREE_UPPER_TABLE: LazyLock<Vec<(Regex, &'static str)>> = LazyLock::new(|| {
    DEGREE_UPPER_PATTERNS
        .iter()
        .map(|(p, c)| (compile(p), *c))
        .collect()
});

static BRANCH_TABLE: LazyLock<Vec<(Regex, &'static [&'static str])>> = LazyLock::new(|| {
    BRANCH_PATTERNS
        .iter()
        .map(|(p, c)| (compile(p), *c))
        .collect()
});

static TURNOVER_TABLE: LazyLock<Vec<(TurnoverTier, Vec<Regex>)>> = LazyLock::new(|| {
    [
        (TurnoverTier::High, HIGH_TURNOVER_PATTERNS),
        (TurnoverTier::Medium, MEDIUM_TURNOVER_PATTERNS),
        (TurnoverTier::Low, LOW_TURNOVER_PATTERNS),
    ]
    .into_iter()
    .map(|(tier, patterns)| (tier, patterns.iter().map(|p| compile(p)).collect()))
    .collect()
});

static GRADUATION_CONTEXT: LazyLock<Regex> = LazyLock::new(|| compile(GRADUATION_KEYWORDS));

static SINGLE_WORD_VOCABULARY: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    let mut words: HashSet<&'static str> = DOMAIN_WORDS.iter().copied().collect();
    for (term, _) in SKILL_TERMS.iter().chain(SERVICE_TERMS).chain(CITY_ALIASES) {
        if !term.contains(' ') {
            words.insert(*term);
        }
    }
    words
});

/// Canonical city for an alias found anywhere in `lower` (lower-cased text).
///
/// # Examples
///
/// ```
/// use rollcall_core::patterns::find_city;
///
/// assert_eq!(find_city("alumni in madras"), Some("Chennai"));
/// assert_eq!(find_city("anyone in new delhi"), Some("Delhi"));
/// assert_eq!(find_city("nothing here"), None);
/// ```
pub fn find_city(lower: &str) -> Option<&'static str> {
    CITY_TABLE
        .iter()
        .find(|(re, _)| re.is_match(lower))
        .map(|(_, canonical)| *canonical)
}

/// Normalize a free-form city name: known aliases map to their canonical
/// spelling, anything else is title-cased.
///
/// # Examples
///
/// ```
/// use rollcall_core::patterns::normalize_city;
///
/// assert_eq!(normalize_city("Bengaluru"), "Bangalore");
/// assert_eq!(normalize_city("karaikudi"), "Karaikudi");
/// ```
pub fn normalize_city(city: &str) -> String {
    let lower = city.trim().to_lowercase();
    CITY_ALIASES
        .iter()
        .find(|(alias, _)| *alias == lower)
        .map(|(_, canonical)| (*canonical).to_string())
        .unwrap_or_else(|| title_case(&lower))
}

/// Upper-case the first letter of every whitespace-separated word.
pub fn title_case(text: &str) -> String {
    text.split_whitespace()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Canonical degrees mentioned in the query, in table order.
pub fn find_degrees(lower: &str, raw: &str) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    let hits = DEGREE_TABLE
        .iter()
        .filter(|(re, _)| re.is_match(lower))
        .chain(DEGREE_UPPER_TABLE.iter().filter(|(re, _)| re.is_match(raw)));
    for (_, canonical) in hits {
        if !found.iter().any(|d| d == canonical) {
            found.push((*canonical).to_string());
        }
    }
    found
}

/// Canonical branch synonyms for every branch key in the query.
pub fn find_branches(lower: &str) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    for (re, synonyms) in BRANCH_TABLE.iter() {
        if re.is_match(lower) {
            for synonym in *synonyms {
                if !found.iter().any(|b| b == synonym) {
                    found.push((*synonym).to_string());
                }
            }
        }
    }
    found
}

fn find_keywords(table: &[Keyword], lower: &str) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    for keyword in table {
        if keyword.re.is_match(lower) && !found.iter().any(|k| k == keyword.canonical) {
            found.push(keyword.canonical.to_string());
        }
    }
    found
}

/// Canonical skills mentioned in lower-cased text.
///
/// # Examples
///
/// ```
/// use rollcall_core::patterns::find_skills;
///
/// assert_eq!(find_skills("python and ml folks"), vec!["Python", "Machine Learning"]);
/// ```
pub fn find_skills(lower: &str) -> Vec<String> {
    find_keywords(&SKILL_TABLE, lower)
}

/// Canonical services mentioned in lower-cased text.
pub fn find_services(lower: &str) -> Vec<String> {
    find_keywords(&SERVICE_TABLE, lower)
}

/// First turnover tier whose family matches, checked high → medium → low.
///
/// # Examples
///
/// ```
/// use rollcall_core::TurnoverTier;
/// use rollcall_core::patterns::find_turnover_tier;
///
/// assert_eq!(find_turnover_tier("turnover above 50 crores"), Some(TurnoverTier::High));
/// assert_eq!(find_turnover_tier("around 5 cr"), Some(TurnoverTier::Medium));
/// assert_eq!(find_turnover_tier("small business owners"), Some(TurnoverTier::Low));
/// ```
pub fn find_turnover_tier(lower: &str) -> Option<TurnoverTier> {
    TURNOVER_TABLE
        .iter()
        .find(|(_, patterns)| patterns.iter().any(|re| re.is_match(lower)))
        .map(|(tier, _)| *tier)
}

/// `true` when the text mentions graduation context (batch, passed out, ...).
pub fn has_graduation_context(lower: &str) -> bool {
    GRADUATION_CONTEXT.is_match(lower)
}

/// Numeric bounds for a turnover tier.
pub fn turnover_bounds(tier: TurnoverTier) -> TurnoverBounds {
    match tier {
        TurnoverTier::Low => TurnoverBounds {
            min: None,
            max: Some(LOW_TURNOVER_MAX),
        },
        TurnoverTier::Medium => TurnoverBounds {
            min: Some(LOW_TURNOVER_MAX),
            max: Some(HIGH_TURNOVER_MIN),
        },
        TurnoverTier::High => TurnoverBounds {
            min: Some(HIGH_TURNOVER_MIN),
            max: None,
        },
    }
}

/// `true` if a filler word (see [`FILLER_WORDS`]).
pub fn is_filler(word: &str) -> bool {
    FILLER_WORDS.contains(&word)
}

/// `true` if the lower-cased text contains any directory vocabulary:
/// skills, services, branches, degrees, cities or business/cohort words.
pub fn contains_domain_vocabulary(lower: &str) -> bool {
    lower
        .split(|c: char| c.is_whitespace() || c == ',')
        .any(|token| SINGLE_WORD_VOCABULARY.contains(token))
        || !find_skills(lower).is_empty()
        || !find_services(lower).is_empty()
        || !find_branches(lower).is_empty()
        || !find_degrees(lower, "").is_empty()
        || find_city(lower).is_some()
}
