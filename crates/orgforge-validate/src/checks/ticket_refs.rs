use std::collections::HashSet;

use super::{ticket_mentions, CheckInput};

/// Every ticket id in the text exists in the graph and is bound to the event.
pub fn check(input: &CheckInput<'_>) -> Vec<String> {
    let re = match input.matchers.tickets() {
        Ok(re) => re,
        Err(e) => return vec![format!("ticket ids could not be checked: {e}")],
    };
    let mut seen: HashSet<String> = HashSet::new();
    let mut out = Vec::new();
    for fragment in input.artifact.text_fragments() {
        for mention in ticket_mentions(re, fragment) {
            if !seen.insert(mention.id.clone()) {
                continue;
            }
            if input.graph.ticket(&mention.id).is_none() {
                out.push(format!("{} does not exist", mention.id));
            } else if !input.event.binds_ticket(&mention.id) {
                out.push(format!("{} is not part of this event", mention.id));
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::checks::Matchers;
    use orgforge_core::fixtures;
    use orgforge_core::{Artifact, ArtifactBody, Transcript, Utterance};

    fn transcript(lines: &[&str]) -> Artifact {
        Artifact {
            id: "a".into(),
            event_id: "EVT-1".into(),
            attempts: 1,
            body: ArtifactBody::Transcript(Transcript {
                title: "Platform Daily Standup".into(),
                start: fixtures::START,
                turns: lines
                    .iter()
                    .enumerate()
                    .map(|(i, text)| Utterance {
                        speaker: "Mary Smith".into(),
                        offset_sec: i as u32 * 10,
                        text: text.to_string(),
                    })
                    .collect(),
            }),
        }
    }

    #[test]
    fn bound_ticket_passes() {
        let g = fixtures::company();
        let e = fixtures::standup(&g);
        let a = transcript(&["PROJ-2 is moving along", "More on PROJ-2 later"]);
        let matchers = Matchers::new(&g);
        let input = CheckInput {
            artifact: &a,
            event: &e,
            graph: &g,
            matchers: &matchers,
        };
        assert!(check(&input).is_empty());
    }

    #[test]
    fn unknown_and_unbound_tickets_are_reported_once() {
        let g = fixtures::company();
        let e = fixtures::standup(&g);
        let a = transcript(&["PROJ-3 and PROJ-99", "PROJ-3 again"]);
        let matchers = Matchers::new(&g);
        let input = CheckInput {
            artifact: &a,
            event: &e,
            graph: &g,
            matchers: &matchers,
        };
        assert_eq!(
            check(&input),
            vec![
                "PROJ-3 is not part of this event".to_string(),
                "PROJ-99 does not exist".to_string(),
            ]
        );
    }
}
