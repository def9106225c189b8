use serde::Serialize;

use crate::model::TagId;

pub const MIN_TOTAL_PAGES: u32 = 30;
pub const MIN_TAGS: usize = 1;
pub const MAX_TAGS: usize = 5;

#[derive(Debug, Clone)]
pub struct ReadinessInput<'a> {
    pub total_pages: u32,
    pub selected_tags: &'a [TagId],
    pub consent_affirmed: bool,
    pub remaining_publish_slots: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Readiness {
    pub can_proceed_step1: bool,
    pub can_submit: bool,
    /// First failing rule, in rule order.
    pub reason: Option<String>,
}

/// Publish gates, checked in order: page floor, tag count, consent, weekly slots.
pub fn evaluate(input: &ReadinessInput<'_>) -> Readiness {
    let step1_failure = page_failure(input.total_pages).or_else(|| tag_failure(input.selected_tags));
    if let Some(reason) = step1_failure {
        return Readiness {
            can_proceed_step1: false,
            can_submit: false,
            reason: Some(reason),
        };
    }

    let submit_failure = if !input.consent_affirmed {
        Some("Confirm that you have the rights to publish this book.".to_owned())
    } else if input.remaining_publish_slots == 0 {
        Some("You have no publish slots left this week.".to_owned())
    } else {
        None
    };

    Readiness {
        can_proceed_step1: true,
        can_submit: submit_failure.is_none(),
        reason: submit_failure,
    }
}

fn page_failure(total_pages: u32) -> Option<String> {
    (total_pages < MIN_TOTAL_PAGES).then(|| {
        format!(
            "Your book needs at least {MIN_TOTAL_PAGES} pages to publish (currently {total_pages})."
        )
    })
}

fn tag_failure(tags: &[TagId]) -> Option<String> {
    if tags.len() < MIN_TAGS {
        Some("Select at least one tag.".to_owned())
    } else if tags.len() > MAX_TAGS {
        Some(format!("Select at most {MAX_TAGS} tags."))
    } else {
        None
    }
}
