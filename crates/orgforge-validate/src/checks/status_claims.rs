use std::sync::LazyLock;

use orgforge_core::TicketStatus;
use regex::Regex;

use super::{ticket_mentions, CheckInput};

const STATUS_WORDS: &str = r"open|to[\s-]?do|in[\s-]?progress|in[\s-]?review|blocked|done|closed";

/// `is Done`, `was moved to In Review`, `marked as blocked`, `status: open`.
static CLAIM: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)\b(?:is|was|now|moved\s+to|marked(?:\s+as)?|status:?)\s+(?:(?:now|still|currently|already)\s+)?({STATUS_WORDS})\b"
    ))
    .unwrap()
});

/// `PROJ-3 (In Review)` or `PROJ-3 [done]` right after the id.
static BRACKETED: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)^\s*[:\-]?\s*[\(\[]\s*({STATUS_WORDS})\s*[\)\]]"
    ))
    .unwrap()
});

/// Text after a mention up to the end of its clause or the next mention.
fn clause(text: &str, from: usize, next_mention: Option<usize>) -> &str {
    let rest = &text[from..];
    let stop = rest
        .find(['.', ';', '!', '?', '\n'])
        .unwrap_or(rest.len());
    let stop = match next_mention {
        Some(next) => stop.min(next - from),
        None => stop,
    };
    &rest[..stop]
}

fn claimed_status(clause: &str) -> Option<TicketStatus> {
    BRACKETED
        .captures(clause)
        .or_else(|| CLAIM.captures(clause))
        .and_then(|c| c.get(1))
        .and_then(|m| TicketStatus::parse_label(m.as_str()))
}

/// A status stated for a bound ticket matches the status it has at the event.
///
/// The status a ticket moved away from during this very event also counts,
/// so "PROJ-5 was Open" is fine in the planning meeting that started it.
pub fn check(input: &CheckInput<'_>) -> Vec<String> {
    // ticket_refs reports a matcher that failed to build.
    let Ok(re) = input.matchers.tickets() else {
        return Vec::new();
    };
    let mut out = Vec::new();
    for fragment in input.artifact.text_fragments() {
        let mentions = ticket_mentions(re, fragment);
        for (i, mention) in mentions.iter().enumerate() {
            let Some(&expected) = input.event.bound_status.get(&mention.id) else {
                continue;
            };
            let next = mentions.get(i + 1).map(|m| m.start);
            let Some(claimed) = claimed_status(clause(fragment, mention.end, next)) else {
                continue;
            };
            let earlier = input
                .event
                .status_changes
                .iter()
                .any(|c| c.ticket_id == mention.id && c.from == claimed);
            if claimed != expected && !earlier {
                let message = format!(
                    "{} is described as {} but is {}",
                    mention.id,
                    claimed.label(),
                    expected.label()
                );
                if !out.contains(&message) {
                    out.push(message);
                }
            }
        }
    }
    out
}
