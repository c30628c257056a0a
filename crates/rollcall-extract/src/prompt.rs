use rollcall_core::patterns::normalize_city;
use rollcall_core::{ExtractedEntities, Intent, TurnoverTier};
use rollcall_providers::ChatMessage;
use serde_json::{Map, Value};

use crate::regex_extract::MIN_YEAR;

const SYSTEM_PROMPT: &str = "\
You extract structured search filters from queries against an alumni and \
business member directory.

Rules:
- Only fill a field when the query states it; never guess
- graduationYear is a list of four-digit years
- location is a single city name
- skills are professional skills (Python, AutoCAD, Data Science)
- services are things a business sells (catering, construction, legal services)
- never put the same term in both skills and services
- turnoverRequirement is low (under 1 crore), medium (1 to 10 crore) or high (over 10 crore)
- searchQuery is a short keyword phrase for full-text search

Respond with a JSON object:
{
  \"intent\": \"find_business\" | \"find_peers\" | \"find_specific_person\" | \"find_alumni_business\",
  \"entities\": {
    \"graduationYear\": [1995],
    \"location\": \"Chennai\",
    \"degree\": [\"B.E\"],
    \"branch\": [\"Mechanical\"],
    \"skills\": [],
    \"services\": [],
    \"turnoverRequirement\": null,
    \"name\": null,
    \"organizationName\": null
  },
  \"searchQuery\": \"mechanical 1995 chennai\",
  \"confidence\": 0.0-1.0
}";

/// Extra guidance per suspected intent.
fn intent_instructions(intent: Intent) -> &'static str {
    match intent {
        Intent::FindBusiness => {
            "The user is probably looking for a business or service provider. \
             Focus on services, location and turnover; leave graduationYear empty \
             unless a year is stated."
        }
        Intent::FindPeers => {
            "The user is probably looking for batchmates or alumni. Focus on \
             graduationYear, branch, degree and location. Two-digit years after \
             words like batch or class of are graduation years."
        }
        Intent::FindSpecificPerson => {
            "The user is probably looking for one named person. Put the person's \
             full name in name, without honorifics. Fill organizationName if a \
             workplace is mentioned."
        }
        Intent::FindAlumniBusiness => {
            "The user is probably looking for alumni who run businesses. Capture \
             both cohort details (graduationYear, branch) and business details \
             (services, turnoverRequirement, location)."
        }
    }
}

/// Build the system prompt for entity extraction.
///
/// # Examples
///
/// ```
/// use rollcall_extract::prompt::build_system_prompt;
///
/// let prompt = build_system_prompt();
/// assert!(prompt.contains("graduationYear"));
/// assert!(prompt.contains("searchQuery"));
/// ```
pub fn build_system_prompt() -> String {
    SYSTEM_PROMPT.to_string()
}

/// Build the message list for one extraction call.
///
/// # Examples
///
/// ```
/// use rollcall_core::Intent;
/// use rollcall_extract::prompt::build_extraction_messages;
///
/// let messages = build_extraction_messages("caterers in madurai", Some("earlier: wedding"), Intent::FindBusiness);
/// assert_eq!(messages.len(), 2);
/// assert!(messages[1].content.contains("caterers in madurai"));
/// assert!(messages[1].content.contains("earlier: wedding"));
/// ```
pub fn build_extraction_messages(
    query: &str,
    context: Option<&str>,
    intent: Intent,
) -> Vec<ChatMessage> {
    let mut user = format!("{}\n\nQuery: {query}\n", intent_instructions(intent));
    if let Some(ctx) = context.filter(|c| !c.trim().is_empty()) {
        user.push_str(&format!("\nConversation so far:\n{ctx}\n"));
    }
    vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(user)]
}

/// Append the invalid reply and a corrective instruction to `messages`.
pub fn build_repair_messages(
    messages: &[ChatMessage],
    invalid: &str,
    reason: &str,
) -> Vec<ChatMessage> {
    let mut repaired = messages.to_vec();
    repaired.push(ChatMessage::assistant(invalid));
    repaired.push(ChatMessage::user(format!(
        "That reply was not valid: {reason}.\n\
         Reply again with only a JSON object matching exactly this schema:\n\
         {{\"intent\": string, \"entities\": {{\"graduationYear\": [int], \"location\": string|null, \
         \"degree\": [string], \"branch\": [string], \"skills\": [string], \"services\": [string], \
         \"turnoverRequirement\": \"low\"|\"medium\"|\"high\"|null, \"name\": string|null, \
         \"organizationName\": string|null}}, \"searchQuery\": string, \"confidence\": number}}"
    )));
    repaired
}

/// A validated generative extraction.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerativeExtraction {
    pub intent: Option<Intent>,
    pub entities: ExtractedEntities,
    pub search_query: Option<String>,
    pub confidence: f64,
}

/// Outcome of parsing one provider reply.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedReply {
    Parsed(GenerativeExtraction),
    Invalid { raw: String, reason: String },
}

/// Strip markdown code fences from a response.
///
/// # Examples
///
/// ```
/// use rollcall_extract::prompt::strip_code_fences;
///
/// assert_eq!(strip_code_fences("```json\n{}\n```"), "{}");
/// assert_eq!(strip_code_fences("{}"), "{}");
/// ```
pub fn strip_code_fences(s: &str) -> &str {
    let trimmed = s.trim();
    if let Some(rest) = trimmed.strip_prefix("```json") {
        rest.strip_suffix("```").unwrap_or(rest).trim()
    } else if let Some(rest) = trimmed.strip_prefix("```") {
        rest.strip_suffix("```").unwrap_or(rest).trim()
    } else {
        trimmed
    }
}

/// The span from the first `{` to the last `}`, if any.
///
/// # Examples
///
/// ```
/// use rollcall_extract::prompt::outermost_object;
///
/// assert_eq!(outermost_object("Sure! {\"a\": {\"b\": 1}} hope that helps"), Some("{\"a\": {\"b\": 1}}"));
/// assert_eq!(outermost_object("no json"), None);
/// ```
pub fn outermost_object(s: &str) -> Option<&str> {
    let start = s.find('{')?;
    let end = s.rfind('}')?;
    (end > start).then(|| &s[start..=end])
}

/// Parse and validate a provider reply.
///
/// `current_year` bounds plausible graduation years.
pub fn parse_reply(raw: &str, current_year: i32) -> ParsedReply {
    match validate(raw, current_year) {
        Ok(extraction) => ParsedReply::Parsed(extraction),
        Err(reason) => ParsedReply::Invalid {
            raw: raw.to_string(),
            reason,
        },
    }
}

fn validate(raw: &str, current_year: i32) -> Result<GenerativeExtraction, String> {
    let body = outermost_object(strip_code_fences(raw)).ok_or("no JSON object found")?;
    let value: Value = serde_json::from_str(body).map_err(|e| format!("invalid JSON: {e}"))?;
    let root = value.as_object().ok_or("top level is not an object")?;

    let intent = match root.get("intent") {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) => Some(s.parse::<Intent>()?),
        Some(other) => return Err(format!("intent must be a string, got {other}")),
    };

    let empty = Map::new();
    let fields = match root.get("entities") {
        None | Some(Value::Null) => &empty,
        Some(Value::Object(map)) => map,
        Some(other) => return Err(format!("entities must be an object, got {other}")),
    };

    let mut entities = ExtractedEntities {
        graduation_year: years(field(fields, "graduationYear", "graduation_year"), current_year)?,
        location: string(field(fields, "location", "location"), "location")?
            .map(|city| normalize_city(&city)),
        degree: strings(field(fields, "degree", "degree"), "degree")?,
        branch: strings(field(fields, "branch", "branch"), "branch")?,
        skills: strings(field(fields, "skills", "skills"), "skills")?,
        services: strings(field(fields, "services", "services"), "services")?,
        turnover_requirement: string(
            field(fields, "turnoverRequirement", "turnover_requirement"),
            "turnoverRequirement",
        )?
        .map(|tier| tier.parse::<TurnoverTier>())
        .transpose()?,
        name: string(field(fields, "name", "name"), "name")?,
        organization_name: string(
            field(fields, "organizationName", "organization_name"),
            "organizationName",
        )?,
    };
    entities.enforce_disjoint();

    let search_query = string(root.get("searchQuery").or(root.get("search_query")), "searchQuery")?;

    let confidence = match root.get("confidence") {
        None | Some(Value::Null) => 0.5,
        Some(Value::Number(n)) => coerce_confidence(n.as_f64().unwrap_or(0.0)),
        Some(Value::String(s)) => coerce_confidence(
            s.trim()
                .trim_end_matches('%')
                .parse::<f64>()
                .map_err(|_| format!("confidence is not a number: {s}"))?,
        ),
        Some(other) => return Err(format!("confidence must be a number, got {other}")),
    };

    Ok(GenerativeExtraction {
        intent,
        entities,
        search_query,
        confidence,
    })
}

fn field<'a>(map: &'a Map<String, Value>, camel: &str, snake: &str) -> Option<&'a Value> {
    map.get(camel).or_else(|| map.get(snake))
}

const PERCENT_THRESHOLD: f64 = 1.5;

/// Values above 1.5 and up to 100 are percentages; smaller overshoots clamp
/// to 1.
pub fn coerce_confidence(value: f64) -> f64 {
    let value = if value > PERCENT_THRESHOLD && value <= 100.0 {
        value / 100.0
    } else {
        value
    };
    if value.is_nan() {
        0.0
    } else {
        value.clamp(0.0, 1.0)
    }
}

fn string(value: Option<&Value>, name: &str) -> Result<Option<String>, String> {
    match value {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => {
            let s = s.trim();
            Ok((!s.is_empty()).then(|| s.to_string()))
        }
        Some(other) => Err(format!("{name} must be a string, got {other}")),
    }
}

/// A string or an array of strings; a scalar becomes a one-element list.
fn strings(value: Option<&Value>, name: &str) -> Result<Vec<String>, String> {
    let items: Vec<&Value> = match value {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items.iter().collect(),
        Some(scalar) => vec![scalar],
    };
    let mut out: Vec<String> = Vec::new();
    for item in items {
        match item {
            Value::String(s) => {
                let s = s.trim();
                if !s.is_empty() && !out.iter().any(|o| o.eq_ignore_ascii_case(s)) {
                    out.push(s.to_string());
                }
            }
            Value::Null => {}
            other => return Err(format!("{name} must contain strings, got {other}")),
        }
    }
    Ok(out)
}

fn years(value: Option<&Value>, current_year: i32) -> Result<Vec<i32>, String> {
    let items: Vec<&Value> = match value {
        None | Some(Value::Null) => return Ok(Vec::new()),
        Some(Value::Array(items)) => items.iter().collect(),
        Some(scalar) => vec![scalar],
    };
    let mut out = Vec::new();
    for item in items {
        let year = match item {
            Value::Number(n) => n
                .as_i64()
                .ok_or_else(|| format!("graduationYear must be an integer, got {n}"))?,
            Value::String(s) => s
                .trim()
                .parse::<i64>()
                .map_err(|_| format!("graduationYear must be an integer, got {s:?}"))?,
            other => return Err(format!("graduationYear must be an integer, got {other}")),
        };
        if year < i64::from(MIN_YEAR) || year > i64::from(current_year) {
            return Err(format!("implausible graduation year {year}"));
        }
        let year = year as i32;
        if !out.contains(&year) {
            out.push(year);
        }
    }
    out.sort_unstable();
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parsed(raw: &str) -> GenerativeExtraction {
        match parse_reply(raw, 2025) {
            ParsedReply::Parsed(extraction) => extraction,
            ParsedReply::Invalid { reason, .. } => panic!("unexpected invalid reply: {reason}"),
        }
    }

    fn invalid_reason(raw: &str) -> String {
        match parse_reply(raw, 2025) {
            ParsedReply::Invalid { reason, .. } => reason,
            ParsedReply::Parsed(_) => panic!("expected invalid reply"),
        }
    }

    #[test]
    fn parses_fenced_reply_with_chatter() {
        let raw = "Here you go:\n```json\n{\"intent\":\"find_peers\",\"entities\":{\"graduationYear\":[1995],\"location\":\"madras\"},\"searchQuery\":\"1995 chennai\",\"confidence\":0.9}\n```";
        let extraction = parsed(raw);
        assert_eq!(extraction.intent, Some(Intent::FindPeers));
        assert_eq!(extraction.entities.graduation_year, vec![1995]);
        assert_eq!(extraction.entities.location.as_deref(), Some("Chennai"));
        assert_eq!(extraction.search_query.as_deref(), Some("1995 chennai"));
        assert_eq!(extraction.confidence, 0.9);
    }

    #[test]
    fn scalars_become_single_element_lists() {
        let extraction = parsed(
            r#"{"entities":{"graduationYear":2001,"skills":"Python","branch":["CSE","cse"]},"confidence":0.7}"#,
        );
        assert_eq!(extraction.entities.graduation_year, vec![2001]);
        assert_eq!(extraction.entities.skills, vec!["Python"]);
        assert_eq!(extraction.entities.branch, vec!["CSE"]);
        assert_eq!(extraction.intent, None);
    }

    #[test]
    fn percent_confidence_is_scaled() {
        assert_eq!(parsed(r#"{"confidence":85}"#).confidence, 0.85);
        assert_eq!(parsed(r#"{"confidence":"70%"}"#).confidence, 0.7);
        assert_eq!(parsed(r#"{"confidence":-2}"#).confidence, 0.0);
        assert_eq!(parsed(r#"{"confidence":250}"#).confidence, 1.0);
        assert_eq!(parsed(r#"{"confidence":2}"#).confidence, 0.02);
    }

    #[test]
    fn slight_overshoot_clamps_to_one() {
        assert_eq!(coerce_confidence(1.2), 1.0);
        assert_eq!(parsed(r#"{"confidence":1.5}"#).confidence, 1.0);
    }

    #[test]
    fn services_duplicating_skills_are_dropped() {
        let extraction =
            parsed(r#"{"entities":{"skills":["Web Development"],"services":["web development","Catering"]}}"#);
        assert_eq!(extraction.entities.services, vec!["Catering"]);
    }

    #[test]
    fn snake_case_keys_are_accepted() {
        let extraction = parsed(
            r#"{"entities":{"turnover_requirement":"high","organization_name":"Acme"},"search_query":"acme"}"#,
        );
        assert_eq!(
            extraction.entities.turnover_requirement,
            Some(TurnoverTier::High)
        );
        assert_eq!(extraction.entities.organization_name.as_deref(), Some("Acme"));
        assert_eq!(extraction.search_query.as_deref(), Some("acme"));
    }

    #[test]
    fn invalid_replies_report_a_reason() {
        assert!(invalid_reason("I could not do that").contains("no JSON object"));
        assert!(invalid_reason("{\"intent\": \"find_cats\"}").contains("unknown intent"));
        assert!(invalid_reason(r#"{"entities":{"graduationYear":[1890]}}"#).contains("implausible"));
        assert!(invalid_reason(r#"{"entities":{"turnoverRequirement":"gigantic"}}"#)
            .contains("turnover"));
        assert!(invalid_reason(r#"{"entities":[1,2]}"#).contains("entities"));
        assert!(invalid_reason("{not json}").contains("invalid JSON"));
    }

    #[test]
    fn repair_messages_echo_invalid_output() {
        let messages = build_extraction_messages("q", None, Intent::FindPeers);
        let repaired = build_repair_messages(&messages, "oops", "no JSON object found");
        assert_eq!(repaired.len(), 4);
        assert_eq!(repaired[2].content, "oops");
        assert!(repaired[3].content.contains("no JSON object found"));
        assert!(repaired[3].content.contains("turnoverRequirement"));
    }

    #[test]
    fn context_is_optional() {
        let messages = build_extraction_messages("q", Some("   "), Intent::FindPeers);
        assert!(!messages[1].content.contains("Conversation so far"));
    }
}
