use proptest::prelude::*;
use rollcall_core::patterns::{SERVICE_TERMS, SKILL_TERMS};
use rollcall_core::{ExtractedEntities, TurnoverTier};
use rollcall_extract::{build_filters, merge_entities, IntentClassifier, RegexExtractor};

fn vocabulary() -> Vec<&'static str> {
    SKILL_TERMS
        .iter()
        .chain(SERVICE_TERMS)
        .map(|(term, _)| *term)
        .chain([
            "in", "chennai", "batch", "1995", "and", "need", "high turnover", "mechanical",
            "b.e", "it", "from", "madurai", "98",
        ])
        .collect()
}

fn query() -> impl Strategy<Value = String> {
    prop::collection::vec(prop::sample::select(vocabulary()), 0..8).prop_map(|w| w.join(" "))
}

fn labels() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("[A-Z][a-z]{2,8}", 0..4).prop_map(|mut v| {
        v.sort_by_key(|s| s.to_lowercase());
        v.dedup_by_key(|s| s.to_lowercase());
        v
    })
}

fn entities() -> impl Strategy<Value = ExtractedEntities> {
    (
        prop::collection::vec(1950i32..=2025, 0..3),
        prop::option::of("[A-Z][a-z]{3,9}"),
        labels(),
        labels(),
        labels(),
        labels(),
        prop::option::of(prop::sample::select(vec![
            TurnoverTier::Low,
            TurnoverTier::Medium,
            TurnoverTier::High,
        ])),
    )
        .prop_map(
            |(graduation_year, location, degree, branch, skills, services, turnover)| {
                let mut entities = ExtractedEntities {
                    graduation_year,
                    location,
                    degree,
                    branch,
                    skills,
                    services,
                    turnover_requirement: turnover,
                    ..Default::default()
                };
                entities.enforce_disjoint();
                entities
            },
        )
}

proptest! {
    #[test]
    fn regex_skills_and_services_never_overlap(q in query()) {
        let result = RegexExtractor::with_current_year(2025).extract(&q);
        for service in &result.entities.services {
            prop_assert!(
                !result.entities.skills.iter().any(|s| s.eq_ignore_ascii_case(service)),
                "{service} in both skills and services for {q:?}"
            );
        }
    }

    #[test]
    fn classifier_confidence_is_bounded(q in query()) {
        let result = IntentClassifier::new().classify(&q);
        prop_assert!((0.0..=1.0).contains(&result.confidence));
        if result.matched_patterns.is_empty() {
            prop_assert_eq!(result.confidence, 0.3);
        }
    }

    #[test]
    fn filter_building_is_deterministic(e in entities()) {
        prop_assert_eq!(build_filters(&e), build_filters(&e.clone()));
    }

    #[test]
    fn merging_with_itself_keeps_array_fields(e in entities()) {
        let (merged, _) = merge_entities(&e, &e);
        prop_assert_eq!(&merged.graduation_year, &e.graduation_year);
        prop_assert_eq!(&merged.degree, &e.degree);
        prop_assert_eq!(&merged.branch, &e.branch);
        prop_assert_eq!(&merged.skills, &e.skills);
        prop_assert_eq!(&merged.services, &e.services);
    }
}
