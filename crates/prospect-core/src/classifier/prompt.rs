use std::fmt::Write as _;

use super::{BatchItem, BatchRequest};
use crate::evidence::normalize::truncate_chars;
use crate::fingerprint::canonical_text;
use crate::model::CriterionCode;

pub const MAX_SPANS_PER_CRITERION: usize = 2;
pub const MAX_SPANS_PER_PROFILE: usize = 10;
pub const MAX_SPAN_CHARS: usize = 150;

const PLACEHOLDER: &str = "(not informed)";

pub fn render(request: &BatchRequest<'_>) -> String {
    let mut out = String::new();
    let n = request.len();

    let _ = write!(
        out,
        "### Batch {}: classify {} researcher profile(s)\n\n\
         Rules:\n\
         - Judge every profile independently.\n\
         - Mark a criterion true only on direct, clear evidence.\n\
         - Answer with valid JSON only, covering every profile id below.\n\n\
         ### Criteria\n",
        request.batch_id, n
    );
    for code in CriterionCode::ALL {
        let _ = writeln!(out, "{}: {}", code, code.description());
    }

    out.push_str("\n### Profiles\n");
    for item in &request.items {
        render_item(&mut out, item);
    }

    out.push_str(&response_schema());
    out
}

fn or_placeholder(value: &str) -> String {
    let text = canonical_text(value);
    if text.is_empty() {
        PLACEHOLDER.to_string()
    } else {
        text
    }
}

fn render_item(out: &mut String, item: &BatchItem<'_>) {
    let _ = write!(
        out,
        "\n=== Profile id \"{}\": {} ===\nInstitution: {}\nResearch lines: {}\nEvidence:\n",
        item.id,
        or_placeholder(&item.profile.name),
        or_placeholder(&item.profile.institution),
        or_placeholder(&item.profile.research_lines),
    );

    let mut added = 0;
    for (code, spans) in item.evidence.iter() {
        if spans.is_empty() || added >= MAX_SPANS_PER_PROFILE {
            continue;
        }
        let _ = writeln!(out, "{}:", code);
        for span in spans.iter().take(MAX_SPANS_PER_CRITERION) {
            let _ = writeln!(out, "  - {}", truncate_chars(span, MAX_SPAN_CHARS));
            added += 1;
            if added >= MAX_SPANS_PER_PROFILE {
                break;
            }
        }
    }
    if added == 0 {
        out.push_str("  (no matching evidence)\n");
    }
}

fn response_schema() -> String {
    let codes = CriterionCode::ALL
        .iter()
        .map(|c| {
            format!(
                "\"{}\": {{\"value\": true|false, \"confidence\": 0.0-1.0, \"justification\": \"...\"}}",
                c
            )
        })
        .collect::<Vec<_>>()
        .join(",\n      ");
    format!(
        "\n### Response\n\
         Reply ONLY with JSON of exactly this shape, one entry per profile id:\n\
         {{\n  \"profiles\": [\n    {{\n      \"id\": \"<profile id>\",\n      {}\n    }}\n  ]\n}}\n",
        codes
    )
}
