use crate::prompts::{keys, PromptArguments, PromptError, PromptRegistry};

use super::{ChapterPosition, ChapterRequest};

pub fn render_chapter_prompt(
    prompts: &PromptRegistry,
    request: &ChapterRequest<'_>,
) -> Result<String, PromptError> {
    let mut args = PromptArguments::new();
    args.insert("outline".into(), request.outline.to_string());
    args.insert("chapter_title".into(), request.chapter.title.clone());
    args.insert("chapter_overview".into(), request.chapter.overview.clone());

    let key = match request.position {
        ChapterPosition::Opening => keys::OPENING_CHAPTER,
        ChapterPosition::Continuation { previous } => {
            args.insert("previous_content".into(), previous.to_string());
            keys::CONTINUATION_CHAPTER
        }
        ChapterPosition::Closing { previous } => {
            args.insert("previous_content".into(), previous.to_string());
            keys::CLOSING_CHAPTER
        }
    };

    prompts.format(key, &args)
}
