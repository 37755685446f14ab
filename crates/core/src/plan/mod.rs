use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

use crate::chapter::Chapter;
use crate::extract::{extract_response, extract_tag};
use crate::logging::{LogLevel, LogRecord, LogSink};
use crate::model::LanguageModel;
use crate::prompts::{keys, PromptRegistry};
use crate::styles::WritingStyle;

fn chapter_marker_regex() -> &'static Regex {
    static REGEX: OnceLock<Regex> = OnceLock::new();
    REGEX.get_or_init(|| Regex::new(r"<chapter (\d+)>").expect("invalid chapter marker regex"))
}

/// Outcome of parsing a plan response, kept separate from the service so the
/// rejection reasons can be logged and tested.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ParsedPlan {
    pub chapters: Vec<Chapter>,
    pub rejected: Vec<String>,
}

/// Parses the `<chapters>` block of a plan response (the `<response>`
/// field, already extracted). Returns `None` when there is no block at all.
///
/// Each `<chapter N>` block needs a non-empty `<title>` and `<overview>`;
/// incomplete blocks, repeated numbers and numbers outside `1..=requested`
/// are dropped rather than patched. Surviving chapters keep their own numbers
/// and come back sorted by number.
pub fn parse_chapter_plan(response: &str, requested: u32) -> Option<ParsedPlan> {
    let block = extract_tag(response, "chapters");
    if block.trim().is_empty() {
        return None;
    }

    let mut accepted: BTreeMap<u32, Chapter> = BTreeMap::new();
    let mut rejected = Vec::new();

    for captures in chapter_marker_regex().captures_iter(block) {
        let raw_number = &captures[1];
        let Ok(number) = raw_number.parse::<u32>() else {
            rejected.push(format!("chapter {raw_number}: number out of range"));
            continue;
        };
        if number == 0 || number > requested {
            rejected.push(format!("chapter {number}: outside 1..={requested}"));
            continue;
        }
        if accepted.contains_key(&number) {
            rejected.push(format!("chapter {number}: duplicate"));
            continue;
        }

        let body = extract_tag(block, &format!("chapter {raw_number}"));
        let title = extract_tag(body, "title").trim();
        let overview = extract_tag(body, "overview").trim();
        if title.is_empty() || overview.is_empty() {
            rejected.push(format!("chapter {number}: missing title or overview"));
            continue;
        }

        accepted.insert(number, Chapter::new(number, title, overview));
    }

    Some(ParsedPlan {
        chapters: accepted.into_values().collect(),
        rejected,
    })
}

pub struct ChapterPlanService<'a> {
    prompts: &'a PromptRegistry,
    sink: &'a dyn LogSink,
}

impl<'a> ChapterPlanService<'a> {
    pub fn new(prompts: &'a PromptRegistry, sink: &'a dyn LogSink) -> Self {
        Self { prompts, sink }
    }

    /// One completion call, parsed into chapter stubs. `None` covers every
    /// failure: backend error, missing `<chapters>` block, or nothing usable.
    pub fn plan_chapters<M: LanguageModel + ?Sized>(
        &self,
        model: &M,
        outline: &str,
        chapter_count: u32,
        style: WritingStyle,
    ) -> Option<Vec<Chapter>> {
        self.log(
            LogLevel::Info,
            format!("Planning {chapter_count} chapters"),
        );

        let prompt = match self.prompts.format_with(
            keys::CHAPTER_PLAN,
            [
                ("style_name", style.name().to_string()),
                ("chapter_count", chapter_count.to_string()),
                ("outline", outline.to_string()),
            ],
        ) {
            Ok(prompt) => prompt,
            Err(err) => {
                self.log(LogLevel::Error, format!("Failed to render chapter plan prompt: {err}"));
                return None;
            }
        };

        self.log(LogLevel::Debug, format!("Chapter plan prompt:\n{prompt}"));
        let raw = match model.complete(style.system_prompt(), &prompt) {
            Ok(raw) => raw,
            Err(err) => {
                self.log(LogLevel::Error, format!("Error generating chapter plan: {err}"));
                return None;
            }
        };
        self.log(LogLevel::Debug, format!("Chapter plan response:\n{raw}"));

        let Some(parsed) = parse_chapter_plan(&extract_response(&raw), chapter_count) else {
            self.log(LogLevel::Warn, "No <chapters> block found in the plan response");
            return None;
        };

        for reason in &parsed.rejected {
            self.log(LogLevel::Warn, format!("Dropped planned {reason}"));
        }

        if parsed.chapters.is_empty() {
            self.log(LogLevel::Warn, "Chapter plan contained no complete chapters");
            return None;
        }
        if parsed.chapters.len() < chapter_count as usize {
            self.log(
                LogLevel::Warn,
                format!(
                    "Chapter plan kept {} of {chapter_count} requested chapters",
                    parsed.chapters.len()
                ),
            );
        }

        Some(parsed.chapters)
    }

    fn log(&self, level: LogLevel, message: impl Into<String>) {
        self.sink.log(LogRecord::new(level, message.into()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block(number: u32, title: &str, overview: &str) -> String {
        format!(
            "<chapter {number}>\n  <title>{title}</title>\n  <overview>{overview}</overview>\n</chapter {number}>\n"
        )
    }

    #[test]
    fn keeps_only_complete_chapters_with_their_own_numbers() {
        let response = format!(
            "<chapters>\n{}{}{}{}{}</chapters>",
            block(1, "Arrival", "Mara reaches the island."),
            "<chapter 2>\n  <title>Broken</title>\n</chapter 2>\n",
            block(3, "The Log", "She reads the keeper's log."),
            block(4, "", "No title here."),
            block(5, "Light", "The lamp burns again."),
        );

        let parsed = parse_chapter_plan(&response, 5).unwrap();
        let numbers: Vec<u32> = parsed.chapters.iter().map(|c| c.number).collect();
        assert_eq!(numbers, vec![1, 3, 5]);
        assert_eq!(parsed.chapters[1].title, "The Log");
        assert!(parsed.chapters.iter().all(|c| c.content.is_none()));
        assert_eq!(parsed.rejected.len(), 2);
    }

    #[test]
    fn drops_duplicates_and_out_of_range_numbers() {
        let response = format!(
            "<chapters>{}{}{}{}</chapters>",
            block(2, "Second", "Two."),
            block(0, "Zero", "Nothing."),
            block(2, "Again", "Two again."),
            block(9, "Nine", "Too far."),
        );

        let parsed = parse_chapter_plan(&response, 5).unwrap();
        assert_eq!(parsed.chapters, vec![Chapter::new(2, "Second", "Two.")]);
        assert_eq!(parsed.rejected.len(), 3);
    }

    #[test]
    fn sorts_by_number() {
        let response = format!(
            "<chapters>{}{}</chapters>",
            block(2, "B", "b."),
            block(1, "A", "a.")
        );
        let parsed = parse_chapter_plan(&response, 2).unwrap();
        assert_eq!(parsed.chapters[0].number, 1);
        assert_eq!(parsed.chapters[1].number, 2);
    }

    #[test]
    fn zero_padded_numbers_keep_their_block() {
        let response = "<chapters>\n<chapter 01>\n  <title>Arrival</title>\n  <overview>Mara lands.</overview>\n</chapter 01>\n</chapters>";
        let parsed = parse_chapter_plan(response, 3).unwrap();
        assert_eq!(parsed.chapters, vec![Chapter::new(1, "Arrival", "Mara lands.")]);
        assert!(parsed.rejected.is_empty());
    }

    #[test]
    fn missing_chapters_block_is_none() {
        assert_eq!(parse_chapter_plan("<chapter 1>x</chapter 1>", 5), None);
    }

    #[test]
    fn empty_block_parses_to_nothing() {
        let parsed = parse_chapter_plan("<chapters>\nnothing useful\n</chapters>", 5).unwrap();
        assert!(parsed.chapters.is_empty());
    }
}
