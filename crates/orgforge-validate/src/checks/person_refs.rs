use std::collections::HashSet;

use aho_corasick::{AhoCorasick, BuildError, MatchKind};
use orgforge_core::{Person, PersonId};

use super::CheckInput;

/// Speakers, senders, and recipients are bound people, and no other
/// person in the company is named (or emailed) in the text.
///
/// Only full display names and company emails count as mentions. A bare
/// first name ("ask Karen") is not attributed to anyone.
pub fn check(input: &CheckInput<'_>) -> Vec<String> {
    let org = &input.graph.org;
    let mut out = Vec::new();
    let mut reported: HashSet<&str> = HashSet::new();

    for name in input.artifact.participant_names() {
        if !reported.insert(name) {
            continue;
        }
        match org.person_by_name(name) {
            None => out.push(format!("{name} is not a known person")),
            Some(p) if !input.event.binds_person(&p.id) => {
                out.push(format!("{name} takes part but is not part of this event"))
            }
            Some(_) => {}
        }
    }

    let matcher = match input.matchers.people() {
        Ok(m) => m,
        Err(e) => {
            out.push(format!("person mentions could not be checked: {e}"));
            return out;
        }
    };
    let mut mentioned: HashSet<&str> = HashSet::new();
    for fragment in input.artifact.text_fragments() {
        for (id, name) in matcher.mentions(fragment) {
            if input.event.binds_person(id) || !mentioned.insert(id) {
                continue;
            }
            out.push(format!("{name} is mentioned but is not part of this event"));
        }
    }
    out
}

/// Every display name and email in the company, matched ASCII
/// case-insensitively on word boundaries.
pub struct PeopleMatcher {
    automaton: AhoCorasick,
    /// (person id, display name) per pattern, in pattern order.
    owners: Vec<(PersonId, String)>,
}

impl PeopleMatcher {
    pub fn new(people: &[Person]) -> Result<Self, BuildError> {
        let mut patterns = Vec::with_capacity(people.len() * 2);
        let mut owners = Vec::with_capacity(people.len() * 2);
        for p in people {
            for pattern in [&p.name, &p.email] {
                patterns.push(pattern.as_str());
                owners.push((p.id.clone(), p.name.clone()));
            }
        }
        let automaton = AhoCorasick::builder()
            .ascii_case_insensitive(true)
            .match_kind(MatchKind::Standard)
            .build(patterns)?;
        Ok(Self { automaton, owners })
    }

    /// People mentioned in `text`, in order of appearance. A match inside a
    /// longer match (`Mary Smith` within `Mary Smith 12`) is dropped.
    pub fn mentions<'m>(&'m self, text: &str) -> Vec<(&'m str, &'m str)> {
        let hits: Vec<(usize, usize, usize)> = self
            .automaton
            .find_overlapping_iter(text)
            .filter(|m| on_word_boundaries(text, m.start(), m.end()))
            .map(|m| (m.start(), m.end(), m.pattern().as_usize()))
            .collect();
        let mut kept: Vec<(usize, usize, usize)> = hits
            .iter()
            .copied()
            .filter(|&(s, e, _)| {
                !hits
                    .iter()
                    .any(|&(s2, e2, _)| s2 <= s && e <= e2 && e2 - s2 > e - s)
            })
            .collect();
        kept.sort_by_key(|&(s, e, _)| (s, e));
        kept.into_iter()
            .filter_map(|(_, _, pattern)| self.owners.get(pattern))
            .map(|(id, name)| (id.as_str(), name.as_str()))
            .collect()
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || c == '_'
}

fn on_word_boundaries(text: &str, start: usize, end: usize) -> bool {
    let before = text[..start].chars().next_back();
    let after = text[end..].chars().next();
    !before.is_some_and(is_word_char) && !after.is_some_and(is_word_char)
}
