use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use tokio::time::Instant;

use crate::ids::MessageId;
use crate::text::{
    is_cjk_terminal, is_closing, is_emoji_extender, is_latin_terminal, is_pictographic,
};

pub const DEFAULT_REVEAL_BASE: Duration = Duration::from_millis(800);
pub const DEFAULT_REVEAL_STEP: Duration = Duration::from_millis(400);

static MARKDOWN_LINK: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"!?\[([^\]]*)\]\([^)]*\)").expect("valid link pattern"));
// Known tag names only, with quoted attributes, so comparisons like `a<b and c>d` survive.
static MARKUP_TAG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r#"(?i)</?(?:a|b|i|u|s|em|strong|br|p|div|span|code|pre|ul|ol|li|h[1-6]|blockquote|del|mark|sub|sup)(?:\s+[a-z-]+=(?:"[^"]*"|'[^']*'))*\s*/?>"#,
    )
    .expect("valid tag pattern")
});
static LINE_PREFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?m)^[ \t]*(?:#{1,6}[ \t]+|>[ \t]?|[-*+][ \t]+)").expect("valid prefix pattern")
});
static STRONG: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\*\*([^\s*](?:[^*\n]*[^\s*])?)\*\*").expect("valid strong pattern")
});
static EMPHASIS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(^|[^\w*])\*([^\s*](?:[^*\n]*[^\s*])?)\*").expect("valid emphasis pattern")
});
static STRIKETHROUGH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"~~([^\s~](?:[^~\n]*[^\s~])?)~~").expect("valid strikethrough pattern")
});
static INLINE_CODE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"`+([^`\n]+?)`+").expect("valid inline code pattern"));
static LINE_BREAKS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:\r?\n)+").expect("valid line break pattern"));
static SPACES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]{2,}").expect("valid whitespace pattern"));

/// Strips structural markup and collapses line breaks into single spaces.
pub fn normalize_markup(text: &str) -> String {
    let text = MARKDOWN_LINK.replace_all(text, "$1");
    let text = MARKUP_TAG.replace_all(&text, "");
    let text = LINE_PREFIX.replace_all(&text, "");
    let text = STRONG.replace_all(&text, "${1}");
    let text = EMPHASIS.replace_all(&text, "${1}${2}");
    let text = STRIKETHROUGH.replace_all(&text, "${1}");
    let text = INLINE_CODE.replace_all(&text, "${1}");
    let text = LINE_BREAKS.replace_all(&text, " ");
    SPACES.replace_all(&text, " ").trim().to_string()
}

/// Splits a reply into sentence-like units in display order.
///
/// Every non-whitespace character of the normalized text lands in exactly one unit.
pub fn split_units(text: &str) -> Vec<String> {
    let chars = normalize_markup(text).chars().collect::<Vec<_>>();
    let mut units = Vec::new();
    let mut current = String::new();
    let mut index = 0;

    while index < chars.len() {
        let ch = chars[index];

        if is_pictographic(ch) {
            push_unit(&mut units, &mut current);
            let end = pictographic_run_end(&chars, index);
            let run = chars[index..end].iter().collect::<String>();
            push_unit(&mut units, &mut run.trim().to_string());
            index = end;
            continue;
        }

        current.push(ch);
        index += 1;

        if is_cjk_terminal(ch) || is_latin_terminal(ch) {
            while index < chars.len()
                && (is_latin_terminal(chars[index])
                    || is_cjk_terminal(chars[index])
                    || is_closing(chars[index]))
            {
                current.push(chars[index]);
                index += 1;
            }

            let at_boundary = index == chars.len()
                || chars[index].is_whitespace()
                || is_pictographic(chars[index]);
            if is_cjk_terminal(ch) || at_boundary {
                push_unit(&mut units, &mut current);
            }
        }
    }

    push_unit(&mut units, &mut current);
    units
}

fn pictographic_run_end(chars: &[char], start: usize) -> usize {
    let mut end = start;
    let mut cursor = start;

    while cursor < chars.len() {
        let ch = chars[cursor];
        if is_pictographic(ch) || is_emoji_extender(ch) {
            cursor += 1;
            end = cursor;
        } else if ch.is_whitespace() && chars.get(cursor + 1).copied().is_some_and(is_pictographic) {
            // Space-separated emoji stay together as one unit.
            cursor += 1;
        } else {
            break;
        }
    }

    end
}

fn push_unit(units: &mut Vec<String>, current: &mut String) {
    let unit = current.trim();
    if !unit.is_empty() {
        units.push(unit.to_string());
    }
    current.clear();
}

/// Observable effect of advancing the scheduler.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RevealStep {
    Show {
        message_id: MessageId,
        index: usize,
        unit: String,
    },
    Composing {
        message_id: MessageId,
        active: bool,
    },
    Complete {
        message_id: MessageId,
    },
    /// A newer reply replaced this reveal before it finished.
    Superseded {
        message_id: MessageId,
        remaining: Vec<String>,
    },
}

#[derive(Debug)]
struct ActiveReveal {
    message_id: MessageId,
    units: Vec<String>,
    next_index: usize,
    next_at: Instant,
}

/// Index-driven reveal of one reply at a time.
#[derive(Debug)]
pub struct RevealScheduler {
    base: Duration,
    step: Duration,
    active: Option<ActiveReveal>,
}

impl RevealScheduler {
    pub fn new(base: Duration, step: Duration) -> Self {
        Self {
            base,
            step,
            active: None,
        }
    }

    /// Starts revealing `text`, superseding any reveal in flight.
    ///
    /// The first unit is shown immediately; empty text completes with zero units.
    pub fn start(&mut self, message_id: MessageId, text: &str, now: Instant) -> Vec<RevealStep> {
        let mut steps = Vec::new();
        if let Some(previous) = self.active.take() {
            tracing::debug!(
                message_id = %previous.message_id,
                shown = previous.next_index,
                total = previous.units.len(),
                "reveal superseded by a newer reply"
            );
            steps.push(RevealStep::Superseded {
                message_id: previous.message_id,
                remaining: previous.units[previous.next_index..].to_vec(),
            });
        }

        let units = split_units(text);
        if units.is_empty() {
            steps.push(RevealStep::Complete { message_id });
            return steps;
        }

        self.active = Some(ActiveReveal {
            message_id,
            units,
            next_index: 0,
            next_at: now,
        });
        steps.extend(self.poll(now));
        steps
    }

    /// Emits every step that is due at `now`.
    pub fn poll(&mut self, now: Instant) -> Vec<RevealStep> {
        let mut steps = Vec::new();
        let (base, step) = (self.base, self.step);

        while let Some(active) = self.active.as_mut() {
            if active.next_at > now {
                break;
            }

            let index = active.next_index;
            if index > 0 {
                steps.push(RevealStep::Composing {
                    message_id: active.message_id.clone(),
                    active: false,
                });
            }
            steps.push(RevealStep::Show {
                message_id: active.message_id.clone(),
                index,
                unit: active.units[index].clone(),
            });
            active.next_index += 1;

            if active.next_index == active.units.len() {
                steps.push(RevealStep::Complete {
                    message_id: active.message_id.clone(),
                });
                self.active = None;
                break;
            }

            active.next_at += pause_after(base, step, index);
            steps.push(RevealStep::Composing {
                message_id: active.message_id.clone(),
                active: true,
            });
        }

        steps
    }

    /// Pause after showing unit `index`: `base + index * step`.
    pub fn delay_after(&self, index: usize) -> Duration {
        pause_after(self.base, self.step, index)
    }

    /// Drops the reveal in flight and returns the message it belonged to.
    pub fn cancel(&mut self) -> Option<MessageId> {
        self.active.take().map(|active| active.message_id)
    }

    pub fn active_message(&self) -> Option<&MessageId> {
        self.active.as_ref().map(|active| &active.message_id)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        self.active.as_ref().map(|active| active.next_at)
    }
}

fn pause_after(base: Duration, step: Duration, index: usize) -> Duration {
    let factor = u32::try_from(index).unwrap_or(u32::MAX);
    base.saturating_add(step.saturating_mul(factor))
}

impl Default for RevealScheduler {
    fn default() -> Self {
        Self::new(DEFAULT_REVEAL_BASE, DEFAULT_REVEAL_STEP)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shown(steps: &[RevealStep]) -> Vec<String> {
        steps
            .iter()
            .filter_map(|step| match step {
                RevealStep::Show { unit, .. } => Some(unit.clone()),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn splits_sentences_and_trailing_emoji() {
        assert_eq!(
            split_units("Hi there! How are you? 🙂"),
            vec!["Hi there!", "How are you?", "🙂"]
        );
    }

    #[test]
    fn keeps_decimals_and_handles_cjk_enders() {
        assert_eq!(
            split_units("Pi is 3.14 roughly. 你好。今天好吗？Great!!"),
            vec!["Pi is 3.14 roughly.", "你好。", "今天好吗？", "Great!!"]
        );
    }

    #[test]
    fn normalizes_markup_and_line_breaks() {
        assert_eq!(
            split_units("## Title\n**Bold** move.\n- see [docs](https://x.y) now"),
            vec!["Title Bold move.", "see docs now"]
        );
    }

    #[test]
    fn plain_symbols_are_not_mistaken_for_markup() {
        assert_eq!(split_units("If a<b and c>d then stop."), vec!["If a<b and c>d then stop."]);
        assert_eq!(split_units("5 * 3 = 15. Done."), vec!["5 * 3 = 15.", "Done."]);
        assert_eq!(split_units("Call __init__ now."), vec!["Call __init__ now."]);
        assert_eq!(split_units(r"Open C:\new folder."), vec![r"Open C:\new folder."]);
    }

    #[test]
    fn strips_paired_emphasis_and_known_tags() {
        assert_eq!(
            normalize_markup("A *quick* <b>bold</b> ~~old~~ `code` <br/>move"),
            "A quick bold old code move"
        );
    }

    #[test]
    fn emoji_sequences_stay_whole() {
        assert_eq!(
            split_units("Love it 👍🏽 👨‍👩‍👧 see you"),
            vec!["Love it", "👍🏽 👨‍👩‍👧", "see you"]
        );
    }

    #[test]
    fn units_cover_every_character_exactly_once() {
        let inputs = [
            "Wait... really?! Yes. 😀😀 ok",
            "no punctuation at all",
            "Trailing quote.\" Then more",
            "多句。多句！多句？",
            "If a<b and c>d then stop.",
            "5 * 3 = 15. Done.",
            "Call __init__ now.",
            r"Open C:\new folder.",
            "2*3*4 is 24.",
        ];

        for input in inputs {
            let expected = input
                .chars()
                .filter(|ch| !ch.is_whitespace())
                .collect::<String>();
            let joined = split_units(input)
                .concat()
                .chars()
                .filter(|ch| !ch.is_whitespace())
                .collect::<String>();
            assert_eq!(joined, expected, "input: {input}");
        }
    }

    #[test]
    fn paces_units_with_growing_delays() {
        let start = Instant::now();
        let mut scheduler = RevealScheduler::default();
        let id = MessageId::from("a-1");

        let first = scheduler.start(id.clone(), "One. Two. Three.", start);
        assert_eq!(shown(&first), vec!["One."]);
        assert_eq!(scheduler.next_deadline(), Some(start + DEFAULT_REVEAL_BASE));

        assert!(scheduler.poll(start + Duration::from_millis(799)).is_empty());
        let second = scheduler.poll(start + Duration::from_millis(800));
        assert_eq!(shown(&second), vec!["Two."]);

        // Second pause is base + step.
        assert!(scheduler.poll(start + Duration::from_millis(1_999)).is_empty());
        let third = scheduler.poll(start + Duration::from_millis(2_000));
        assert_eq!(shown(&third), vec!["Three."]);
        assert_eq!(
            third.last(),
            Some(&RevealStep::Complete { message_id: id })
        );
        assert_eq!(scheduler.next_deadline(), None);
    }

    #[test]
    fn empty_text_completes_immediately() {
        let mut scheduler = RevealScheduler::default();
        let id = MessageId::from("a-1");

        let steps = scheduler.start(id.clone(), "  \n ", Instant::now());
        assert_eq!(steps, vec![RevealStep::Complete { message_id: id }]);
        assert!(scheduler.active_message().is_none());
    }

    #[test]
    fn restart_supersedes_reveal_in_flight() {
        let start = Instant::now();
        let mut scheduler = RevealScheduler::default();

        scheduler.start(MessageId::from("a-1"), "One. Two.", start);
        let steps = scheduler.start(MessageId::from("a-2"), "Fresh.", start);

        assert_eq!(
            steps.first(),
            Some(&RevealStep::Superseded {
                message_id: MessageId::from("a-1"),
                remaining: vec!["Two.".to_string()],
            })
        );
        assert_eq!(shown(&steps), vec!["Fresh."]);
        assert!(scheduler.active_message().is_none());
    }
}
