use std::sync::LazyLock;

use orgforge_core::config::Range;
use orgforge_core::{GenerationError, Utterance};
use regex::Regex;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use crate::prompt::Participant;

static STAMP: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\[(\d{1,2}):(\d{2})(?::(\d{2}))?\]\s*(.*)$").unwrap());

/// Two or three capitalised words, the shape of a speaker label.
static NAME_LIKE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Z][a-z'\-]+(?:\s+[A-Z]\.?)?(?:\s+[A-Z][a-z'\-]+){1,2}$").unwrap()
});

/// Seconds added to untimed turns.
const UNTIMED_STEP: u32 = 15;

fn clean_label(raw: &str) -> &str {
    raw.trim().trim_matches(|c| c == '*' || c == '_' || c == '"').trim()
}

/// Match a speaker / sender token against the bound participants, by
/// display name or email, ignoring case. `Name <email>` is accepted.
pub fn resolve<'p>(participants: &'p [Participant], token: &str) -> Option<&'p Participant> {
    let token = clean_label(token);
    if let (Some(open), true) = (token.find('<'), token.ends_with('>')) {
        let email = &token[open + 1..token.len() - 1];
        let name = token[..open].trim();
        return resolve(participants, email).or_else(|| {
            (!name.is_empty())
                .then(|| resolve(participants, name))
                .flatten()
        });
    }
    participants
        .iter()
        .find(|p| p.name.eq_ignore_ascii_case(token) || p.email.eq_ignore_ascii_case(token))
}

fn is_fence(line: &str) -> bool {
    line.starts_with("```")
}

/// Parse a meeting transcript.
///
/// One turn per line as `[MM:SS] Speaker Name: utterance` (or `[H:MM:SS]`).
/// The timestamp may be omitted, in which case the turn lands a few seconds
/// after the previous one. Lines that do not start a turn continue the
/// previous one.
pub fn parse_transcript(
    text: &str,
    participants: &[Participant],
    turns: Range,
) -> Result<Vec<Utterance>, GenerationError> {
    let mut out: Vec<Utterance> = Vec::new();

    for (idx, raw) in text.lines().enumerate() {
        let line_no = idx + 1;
        let line = raw.trim();
        if line.is_empty() || is_fence(line) {
            continue;
        }

        let (stamp, rest) = match STAMP.captures(line) {
            Some(caps) => {
                let num = |i: usize| {
                    caps.get(i)
                        .and_then(|m| m.as_str().parse::<u32>().ok())
                };
                let (h, m, s) = match num(3) {
                    Some(s) => (num(1).unwrap_or(0), num(2).unwrap_or(0), s),
                    None => (0, num(1).unwrap_or(0), num(2).unwrap_or(0)),
                };
                if s >= 60 || (h > 0 && m >= 60) {
                    return Err(GenerationError::BadLine {
                        line: line_no,
                        reason: "timestamp out of range".into(),
                    });
                }
                let rest = caps.get(4).map_or("", |m| m.as_str());
                (Some(h * 3600 + m * 60 + s), rest)
            }
            None => (None, line),
        };

        let split = rest.split_once(':');
        let speaker = split.and_then(|(who, said)| resolve(participants, who).map(|p| (p, said)));

        match (stamp, speaker) {
            (_, Some((person, said))) => {
                let said = said.trim();
                if said.is_empty() {
                    return Err(GenerationError::BadLine {
                        line: line_no,
                        reason: "empty utterance".into(),
                    });
                }
                let prev = out.last().map(|u| u.offset_sec);
                let offset = stamp.unwrap_or_else(|| prev.map_or(0, |p| p + UNTIMED_STEP));
                if prev.is_some_and(|p| offset <= p) {
                    return Err(GenerationError::NonIncreasing { line: line_no });
                }
                out.push(Utterance {
                    speaker: person.name.clone(),
                    offset_sec: offset,
                    text: said.to_string(),
                });
            }
            (Some(_), None) => {
                let who = split.map(|(w, _)| clean_label(w)).unwrap_or("");
                return Err(if who.is_empty() {
                    GenerationError::BadLine {
                        line: line_no,
                        reason: "expected `Speaker Name: utterance`".into(),
                    }
                } else {
                    GenerationError::UnknownParticipant(who.to_string())
                });
            }
            (None, None) => {
                if let Some((who, _)) = split {
                    let who = clean_label(who);
                    if NAME_LIKE.is_match(who) {
                        return Err(GenerationError::UnknownParticipant(who.to_string()));
                    }
                }
                match out.last_mut() {
                    Some(turn) => {
                        turn.text.push(' ');
                        turn.text.push_str(line);
                    }
                    None => {
                        return Err(GenerationError::BadLine {
                            line: line_no,
                            reason: "text before the first turn".into(),
                        })
                    }
                }
            }
        }
    }

    if out.is_empty() {
        return Err(GenerationError::Empty);
    }
    let got = out.len();
    if !turns.contains(got as u32) {
        return Err(GenerationError::TurnCount {
            got,
            min: turns.min,
            max: turns.max,
        });
    }
    Ok(out)
}

/// One email as written by the generator.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedEmail {
    /// Display name of the sender.
    pub sender: String,
    pub recipients: Vec<String>,
    pub date: Option<OffsetDateTime>,
    /// Line of the `Date:` header, for error reporting.
    pub date_line: Option<usize>,
    pub subject: String,
    pub body: String,
}

const HEADERS: &[&str] = &["from", "to", "cc", "date", "subject"];

/// Parse `From:` / `To:` / optional `Date:` / `Subject:` headers, a blank
/// line, then the body.
pub fn parse_email(
    text: &str,
    participants: &[Participant],
) -> Result<ParsedEmail, GenerationError> {
    let lines: Vec<&str> = text.lines().collect();
    let mut i = 0;
    while i < lines.len() && (lines[i].trim().is_empty() || is_fence(lines[i].trim())) {
        i += 1;
    }
    if i == lines.len() {
        return Err(GenerationError::Empty);
    }

    let mut from: Option<(usize, &str)> = None;
    let mut to: Vec<(usize, &str)> = Vec::new();
    let mut date: Option<(usize, &str)> = None;
    let mut subject: Option<&str> = None;

    while i < lines.len() {
        let line = lines[i].trim();
        if line.is_empty() {
            i += 1;
            break;
        }
        let Some((key, value)) = line.split_once(':') else {
            break;
        };
        let key = key.trim().to_ascii_lowercase();
        if !HEADERS.contains(&key.as_str()) {
            break;
        }
        let value = value.trim();
        match key.as_str() {
            "from" => from = Some((i + 1, value)),
            "to" | "cc" => to.push((i + 1, value)),
            "date" => date = Some((i + 1, value)),
            _ => subject = Some(value),
        }
        i += 1;
    }

    let (_, from) = from.ok_or(GenerationError::MissingHeader("From"))?;
    if to.is_empty() {
        return Err(GenerationError::MissingHeader("To"));
    }
    let subject = subject.ok_or(GenerationError::MissingHeader("Subject"))?;

    let sender = resolve(participants, from)
        .ok_or_else(|| GenerationError::UnknownParticipant(clean_label(from).to_string()))?
        .name
        .clone();

    let mut recipients: Vec<String> = Vec::new();
    for (_, value) in &to {
        for token in value.split([',', ';']).map(str::trim).filter(|t| !t.is_empty()) {
            let person = resolve(participants, token)
                .ok_or_else(|| GenerationError::UnknownParticipant(clean_label(token).to_string()))?;
            if !recipients.contains(&person.name) {
                recipients.push(person.name.clone());
            }
        }
    }
    if recipients.is_empty() {
        return Err(GenerationError::MissingHeader("To"));
    }

    let (date, date_line) = match date {
        Some((line, value)) => {
            let at = OffsetDateTime::parse(value, &Rfc3339).map_err(|_| GenerationError::BadLine {
                line,
                reason: format!("Date `{value}` is not RFC 3339"),
            })?;
            (Some(at), Some(line))
        }
        None => (None, None),
    };

    let body_start = i + 1;
    let body = lines[i.min(lines.len())..]
        .iter()
        .filter(|l| !is_fence(l.trim()))
        .copied()
        .collect::<Vec<_>>()
        .join("\n");
    let body = body.trim();
    if body.is_empty() {
        return Err(GenerationError::BadLine {
            line: body_start,
            reason: "empty body".into(),
        });
    }

    Ok(ParsedEmail {
        sender,
        recipients,
        date,
        date_line,
        subject: subject.to_string(),
        body: body.to_string(),
    })
}
