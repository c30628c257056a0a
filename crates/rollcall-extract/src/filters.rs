use rollcall_core::patterns::turnover_bounds;
use rollcall_core::{ExtractedEntities, SearchFilters, YearRange};

/// Derive retrieval constraints from extracted entities.
///
/// Pure and deterministic: the same entities always produce the same
/// filters. Years are sorted and de-duplicated; more than one year also
/// sets the enclosing range.
///
/// # Examples
///
/// ```
/// use rollcall_core::{ExtractedEntities, TurnoverTier};
/// use rollcall_extract::build_filters;
///
/// let entities = ExtractedEntities {
///     graduation_year: vec![1998, 1995],
///     location: Some("Chennai".into()),
///     turnover_requirement: Some(TurnoverTier::High),
///     ..Default::default()
/// };
/// let filters = build_filters(&entities);
/// assert_eq!(filters.graduation_years, vec![1995, 1998]);
/// assert_eq!(filters.year_range.map(|r| (r.min, r.max)), Some((1995, 1998)));
/// assert_eq!(filters.turnover.and_then(|t| t.min), Some(100_000_000.0));
/// ```
pub fn build_filters(entities: &ExtractedEntities) -> SearchFilters {
    let mut years = entities.graduation_year.clone();
    years.sort_unstable();
    years.dedup();

    let year_range = match (years.first(), years.last()) {
        (Some(&min), Some(&max)) if years.len() > 1 => Some(YearRange { min, max }),
        _ => None,
    };

    SearchFilters {
        location: entities
            .location
            .as_deref()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(str::to_string),
        skills: entities.skills.clone(),
        services: entities.services.clone(),
        graduation_years: years,
        year_range,
        degrees: entities.degree.clone(),
        branches: entities.branch.clone(),
        turnover: entities.turnover_requirement.map(turnover_bounds),
        organization: entities
            .organization_name
            .as_deref()
            .map(str::trim)
            .filter(|o| !o.is_empty())
            .map(str::to_string),
    }
}
