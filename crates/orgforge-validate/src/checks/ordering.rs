use orgforge_core::ArtifactBody;

use super::CheckInput;

/// The artifact belongs to the event, is not empty, and its turns or
/// messages strictly increase in time.
pub fn check(input: &CheckInput<'_>) -> Vec<String> {
    let mut out = Vec::new();
    if input.artifact.event_id != input.event.id {
        out.push(format!(
            "artifact is for {} but was checked against {}",
            input.artifact.event_id, input.event.id
        ));
    }
    if input.event.kind.is_email() != matches!(input.artifact.body, ArtifactBody::EmailThread(_)) {
        out.push(format!(
            "{} expects {}",
            input.event.kind,
            if input.event.kind.is_email() {
                "an email thread"
            } else {
                "a transcript"
            }
        ));
    }

    match &input.artifact.body {
        ArtifactBody::Transcript(t) => {
            if t.turns.is_empty() {
                out.push("transcript has no turns".into());
            }
            if t.start != input.event.timestamp {
                out.push("transcript does not start at the event time".into());
            }
            for (i, pair) in t.turns.windows(2).enumerate() {
                if pair[1].offset_sec <= pair[0].offset_sec {
                    out.push(format!(
                        "turn {} at {}s does not come after turn {} at {}s",
                        i + 2,
                        pair[1].offset_sec,
                        i + 1,
                        pair[0].offset_sec
                    ));
                }
            }
        }
        ArtifactBody::EmailThread(thread) => {
            if thread.messages.is_empty() {
                out.push("email thread has no messages".into());
            }
            for (i, pair) in thread.messages.windows(2).enumerate() {
                if pair[1].timestamp <= pair[0].timestamp {
                    out.push(format!(
                        "message {} is not later than message {}",
                        i + 2,
                        i + 1
                    ));
                }
            }
        }
    }
    out
}
