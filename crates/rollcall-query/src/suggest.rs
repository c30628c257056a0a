//! Follow-up query suggestions computed from the surviving result set.

use std::collections::HashMap;

use rollcall_core::names::looks_like_person_name;
use rollcall_core::{ExtractedEntities, Intent, ScoredMember};

/// Most suggestions ever returned.
pub const MAX_SUGGESTIONS: usize = 4;

/// Propose follow-up queries.
///
/// Empty results relax the most specific constraints; non-empty results
/// narrow by the most common unfiltered attribute and offer a cross-intent
/// follow-up.
///
/// # Examples
///
/// ```
/// use rollcall_core::{ExtractedEntities, Intent};
/// use rollcall_query::suggest::suggest;
///
/// let entities = ExtractedEntities {
///     location: Some("Chennai".into()),
///     graduation_year: vec![1995],
///     ..Default::default()
/// };
/// let tips = suggest(Intent::FindPeers, &entities, &[], "1995 batch in Chennai");
/// assert!(tips.iter().any(|t| t.contains("Chennai")));
/// assert!(tips.len() <= 4);
/// ```
pub fn suggest(
    intent: Intent,
    entities: &ExtractedEntities,
    members: &[ScoredMember],
    cleaned_query: &str,
) -> Vec<String> {
    let mut tips = if members.is_empty() {
        relax(entities, cleaned_query)
    } else {
        narrow(intent, entities, members)
    };
    let mut seen = Vec::new();
    tips.retain(|t| {
        let key = t.to_lowercase();
        let fresh = !seen.contains(&key);
        seen.push(key);
        fresh
    });
    tips.truncate(MAX_SUGGESTIONS);
    tips
}

fn relax(entities: &ExtractedEntities, cleaned_query: &str) -> Vec<String> {
    let mut tips = Vec::new();
    if entities.name.is_some() || looks_like_person_name(cleaned_query) {
        let name = entities.name.as_deref().unwrap_or(cleaned_query);
        tips.push(format!(
            "Check the spelling of \"{name}\" or search by first name only"
        ));
    }
    if let Some(city) = &entities.location {
        tips.push(format!("Search all cities instead of only {city}"));
    }
    match entities.graduation_year.as_slice() {
        [] => {}
        [year] => tips.push(format!(
            "Widen the batch to {}-{}",
            year - 1,
            year + 1
        )),
        years => {
            let min = years.iter().min().copied().unwrap_or_default();
            let max = years.iter().max().copied().unwrap_or_default();
            tips.push(format!("Widen the batch to {}-{}", min - 2, max + 2));
        }
    }
    if let Some(tier) = entities.turnover_requirement {
        tips.push(format!("Drop the {tier} turnover requirement"));
    }
    if let Some(skill) = entities.skills.first() {
        if entities.skills.len() > 1 {
            tips.push(format!("Search for {skill} alone"));
        } else {
            tips.push(format!("Try a broader skill than {skill}"));
        }
    }
    if let Some(service) = entities.services.first() {
        tips.push(format!("{service} providers in any city"));
    }
    if tips.is_empty() {
        tips.push("Try fewer words, e.g. a city, a batch year or a service".to_string());
    }
    tips
}

fn most_common<'a>(values: impl Iterator<Item = &'a str>) -> Option<(&'a str, usize)> {
    let mut counts: HashMap<&str, usize> = HashMap::new();
    let mut first_seen: Vec<&str> = Vec::new();
    for value in values {
        let count = counts.entry(value).or_insert(0);
        if *count == 0 {
            first_seen.push(value);
        }
        *count += 1;
    }
    first_seen
        .into_iter()
        .map(|v| (v, counts[v]))
        .fold(None, |best, (v, n)| match best {
            Some((_, m)) if m >= n => best,
            _ => Some((v, n)),
        })
}

fn narrow(intent: Intent, entities: &ExtractedEntities, members: &[ScoredMember]) -> Vec<String> {
    let mut tips = Vec::new();
    let people = members.iter().map(|m| &m.member);

    let top_city = most_common(people.clone().filter_map(|m| m.city.as_deref()));
    if entities.location.is_none() {
        if let Some((city, n)) = top_city.filter(|(_, n)| *n > 1) {
            tips.push(format!("Narrow to {city} ({n} of these members)"));
        }
    }
    if entities.branch.is_empty() && !intent.is_business() {
        if let Some((branch, _)) = most_common(people.clone().filter_map(|m| m.branch.as_deref()))
        {
            tips.push(format!("Only {branch} graduates"));
        }
    }
    if entities.graduation_year.is_empty() && !intent.is_business() {
        let years: Vec<String> = people
            .clone()
            .filter_map(|m| m.graduation_year)
            .map(|y| y.to_string())
            .collect();
        if let Some((year, _)) = most_common(years.iter().map(String::as_str)) {
            tips.push(format!("Only the {year} batch"));
        }
    }

    let city = entities
        .location
        .as_deref()
        .or(top_city.map(|(c, _)| c));
    let in_city = city.map(|c| format!(" in {c}")).unwrap_or_default();
    let cross = match intent {
        Intent::FindPeers => Some(format!("Alumni who run businesses{in_city}")),
        Intent::FindBusiness => {
            let what = entities
                .services
                .first()
                .map(|s| format!("{s} businesses"))
                .unwrap_or_else(|| "businesses".to_string());
            Some(format!("Alumni-run {what}{in_city}"))
        }
        Intent::FindAlumniBusiness => Some(format!("Batchmates of these founders{in_city}")),
        Intent::FindSpecificPerson => members
            .first()
            .and_then(|m| m.member.graduation_year)
            .map(|year| format!("Others from the {year} batch")),
    };
    tips.extend(cross);
    tips
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollcall_core::{Member, TurnoverTier};

    fn scored(id: &str, city: &str, branch: &str, year: i32) -> ScoredMember {
        ScoredMember {
            member: Member {
                city: Some(city.into()),
                branch: Some(branch.into()),
                graduation_year: Some(year),
                ..Member::new(id, id)
            },
            semantic_score: 0.5,
            keyword_score: 0.0,
            relevance_score: 0.35,
            is_exact_match: false,
            matched_fields: vec![],
        }
    }

    #[test]
    fn empty_results_relax_constraints_in_order() {
        let entities = ExtractedEntities {
            location: Some("Madurai".into()),
            graduation_year: vec![1995],
            turnover_requirement: Some(TurnoverTier::High),
            skills: vec!["Python".into()],
            services: vec!["Catering".into()],
            ..Default::default()
        };
        let tips = suggest(Intent::FindBusiness, &entities, &[], "catering madurai");
        assert_eq!(
            tips,
            vec![
                "Search all cities instead of only Madurai",
                "Widen the batch to 1994-1996",
                "Drop the high turnover requirement",
                "Try a broader skill than Python",
            ]
        );
    }

    #[test]
    fn empty_name_query_suggests_spelling() {
        let tips = suggest(
            Intent::FindSpecificPerson,
            &ExtractedEntities::default(),
            &[],
            "Fatimah Marry",
        );
        assert!(tips[0].contains("spelling of \"Fatimah Marry\""));
    }

    #[test]
    fn nothing_to_relax_gives_generic_tip() {
        let tips = suggest(
            Intent::FindBusiness,
            &ExtractedEntities::default(),
            &[],
            "xyz 123",
        );
        assert_eq!(tips.len(), 1);
    }

    #[test]
    fn results_narrow_by_most_common_values() {
        let members = vec![
            scored("a", "Chennai", "Mechanical", 1995),
            scored("b", "Chennai", "Civil", 1995),
            scored("c", "Madurai", "Mechanical", 1996),
        ];
        let tips = suggest(
            Intent::FindPeers,
            &ExtractedEntities::default(),
            &members,
            "alumni",
        );
        assert_eq!(
            tips,
            vec![
                "Narrow to Chennai (2 of these members)",
                "Only Mechanical graduates",
                "Only the 1995 batch",
                "Alumni who run businesses in Chennai",
            ]
        );
    }

    #[test]
    fn filtered_dimensions_are_not_suggested_again() {
        let members = vec![
            scored("a", "Chennai", "Mechanical", 1995),
            scored("b", "Chennai", "Mechanical", 1995),
        ];
        let entities = ExtractedEntities {
            location: Some("Chennai".into()),
            branch: vec!["Mechanical".into()],
            graduation_year: vec![1995],
            ..Default::default()
        };
        let tips = suggest(Intent::FindPeers, &entities, &members, "1995 mechanical");
        assert_eq!(tips, vec!["Alumni who run businesses in Chennai"]);
    }
}
