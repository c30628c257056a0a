//! Text, markdown and JSON renderings of a [`QueryResponse`].

use std::fmt::{self, Write};

use rollcall_core::patterns::CRORE;
use rollcall_core::{Intent, Member, OutputFormat, ScoredMember};

use crate::pipeline::QueryResponse;

/// Render `response` in `format`, falling back to a one-line summary if
/// rendering fails.
pub fn render(response: &QueryResponse, format: OutputFormat) -> String {
    let mut out = String::new();
    let rendered = match format {
        OutputFormat::Text => write_text(&mut out, response),
        OutputFormat::Markdown => write_markdown(&mut out, response),
        OutputFormat::Json => match serde_json::to_string_pretty(response) {
            Ok(json) => {
                out = json;
                Ok(())
            }
            Err(_) => Err(fmt::Error),
        },
    };
    match rendered {
        Ok(()) => out,
        Err(_) => fallback_summary(response),
    }
}

/// Minimal templated output.
///
/// # Examples
///
/// ```
/// use rollcall_query::format::fallback_summary;
/// # use rollcall_query::QueryResponse;
/// # fn check(response: &QueryResponse) {
/// let line = fallback_summary(response);
/// assert!(line.starts_with("Found "));
/// # }
/// ```
pub fn fallback_summary(response: &QueryResponse) -> String {
    let names: Vec<&str> = response
        .members
        .iter()
        .map(|m| m.member.name.as_str())
        .collect();
    if names.is_empty() {
        format!("Found 0 members for \"{}\".", response.query)
    } else {
        format!(
            "Found {} members for \"{}\": {}.",
            response.pagination.total,
            response.query,
            names.join(", ")
        )
    }
}

/// Annual turnover in crores or lakhs.
///
/// # Examples
///
/// ```
/// use rollcall_query::format::format_turnover;
///
/// assert_eq!(format_turnover(25_000_000.0), "₹2.5 Cr");
/// assert_eq!(format_turnover(4_500_000.0), "₹45 L");
/// ```
pub fn format_turnover(rupees: f64) -> String {
    if rupees >= CRORE {
        format!("₹{:.1} Cr", rupees / CRORE)
    } else {
        format!("₹{:.0} L", rupees / 100_000.0)
    }
}

fn business_details(member: &Member) -> Vec<String> {
    let mut parts = Vec::new();
    if let Some(org) = &member.organization {
        parts.push(org.clone());
    }
    if !member.services.is_empty() {
        parts.push(member.services.join(", "));
    }
    if let Some(turnover) = member.annual_turnover {
        parts.push(format_turnover(turnover));
    }
    parts
}

fn peer_details(member: &Member) -> Vec<String> {
    let mut parts = Vec::new();
    if let Some(year) = member.graduation_year {
        parts.push(format!("Batch {year}"));
    }
    match (&member.degree, &member.branch) {
        (Some(degree), Some(branch)) => parts.push(format!("{degree} {branch}")),
        (Some(one), None) | (None, Some(one)) => parts.push(one.clone()),
        (None, None) => {}
    }
    if let Some(designation) = &member.designation {
        match &member.organization {
            Some(org) => parts.push(format!("{designation} at {org}")),
            None => parts.push(designation.clone()),
        }
    }
    parts
}

/// One summary line per member, adapted to the query intent.
pub fn member_line(intent: Intent, scored: &ScoredMember) -> String {
    let member = &scored.member;
    let mut parts = if intent.is_business() {
        business_details(member)
    } else {
        peer_details(member)
    };
    if let Some(city) = &member.city {
        parts.push(city.clone());
    }
    let mut line = member.name.clone();
    if !parts.is_empty() {
        line.push_str(" | ");
        line.push_str(&parts.join(" | "));
    }
    line
}

fn contact(member: &Member) -> Option<String> {
    let parts: Vec<&str> = [member.phone.as_deref(), member.email.as_deref()]
        .into_iter()
        .flatten()
        .collect();
    (!parts.is_empty()).then(|| parts.join(" · "))
}

fn write_text(out: &mut impl Write, r: &QueryResponse) -> fmt::Result {
    writeln!(out, "Query Results")?;
    writeln!(out, "=============")?;
    writeln!(
        out,
        "Intent: {} ({:.0}%) | Extraction: {} ({:.0}%) | Results: {}\n",
        r.intent.primary,
        r.intent.confidence * 100.0,
        r.method,
        r.confidence * 100.0,
        r.pagination.total,
    )?;

    if r.members.is_empty() {
        writeln!(out, "No matching members found.")?;
    } else {
        let offset = r.pagination.bounds().start;
        for (i, scored) in r.members.iter().enumerate() {
            let marker = if scored.is_exact_match { " [exact]" } else { "" };
            writeln!(
                out,
                "{}. {}{marker}",
                offset.saturating_add(i + 1),
                member_line(r.intent.primary, scored)
            )?;
            if let Some(contact) = contact(&scored.member) {
                writeln!(out, "   {contact}")?;
            }
        }
        if r.pagination.total_pages > 1 {
            writeln!(
                out,
                "\nPage {} of {}",
                r.pagination.page, r.pagination.total_pages
            )?;
        }
    }

    if !r.suggestions.is_empty() {
        writeln!(out, "\nYou could also try:")?;
        for tip in &r.suggestions {
            writeln!(out, "  - {tip}")?;
        }
    }
    Ok(())
}

fn write_markdown(out: &mut impl Write, r: &QueryResponse) -> fmt::Result {
    writeln!(out, "## Results for \"{}\"\n", r.query)?;
    writeln!(
        out,
        "**Intent:** `{}` · **Extraction:** {} · **Results:** {}\n",
        r.intent.primary, r.method, r.pagination.total
    )?;

    if r.members.is_empty() {
        writeln!(out, "_No matching members found._")?;
    } else {
        writeln!(out, "| # | Member | Details | Relevance |")?;
        writeln!(out, "|---|--------|---------|-----------|")?;
        let offset = r.pagination.bounds().start;
        for (i, scored) in r.members.iter().enumerate() {
            let name = if scored.is_exact_match {
                format!("**{}** ✓", scored.member.name)
            } else {
                scored.member.name.clone()
            };
            let details = member_line(r.intent.primary, scored);
            let details = details
                .split_once(" | ")
                .map(|(_, rest)| rest)
                .unwrap_or("");
            writeln!(
                out,
                "| {} | {name} | {} | {:.2} |",
                offset.saturating_add(i + 1),
                details.replace('|', "/"),
                scored.relevance_score
            )?;
        }
    }

    if !r.suggestions.is_empty() {
        writeln!(out, "\n### Suggestions\n")?;
        for tip in &r.suggestions {
            writeln!(out, "- {tip}")?;
        }
    }
    Ok(())
}

impl fmt::Display for QueryResponse {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_text(f, self)
    }
}

impl QueryResponse {
    /// Markdown rendering.
    pub fn to_markdown(&self) -> String {
        render(self, OutputFormat::Markdown)
    }
}
