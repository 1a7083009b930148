use scraper::ElementRef;

use crate::domain::Reply;
use crate::extract::{FieldExtractors, Extraction, ExtractionOutcome, REPLY_NODES};

/// Every reply node under `root`, flattened to a single level.
pub(crate) fn extract_replies(
    root: &ElementRef<'_>,
    extractors: &FieldExtractors,
) -> Extraction<Vec<Reply>> {
    let mut replies: Vec<Reply> = Vec::new();

    for node in root.select(&REPLY_NODES) {
        let Some(reply) = extractors.reply(&node) else {
            continue;
        };
        let duplicate = replies.iter().any(|r| {
            r.author.name == reply.author.name && r.text == reply.text && r.images == reply.images
        });
        if !duplicate {
            replies.push(reply);
        }
    }

    if replies.is_empty() {
        Err(ExtractionOutcome::NotFound)
    } else {
        Ok(replies)
    }
}
