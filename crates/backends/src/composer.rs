//! The local composer — the always-available, no-network backend.
//!
//! Builds a reading from the payload's own card meanings and analysis with
//! a fixed template. Deterministic given its inputs, performs no I/O, and
//! therefore cannot fail for availability reasons; it is the terminal
//! fallback of every dispatch chain.

use crate::registry::COMPOSER_ID;
use arcanum_core::error::BackendError;
use arcanum_core::reading::ReadingPayload;
use arcanum_core::{Backend, GenerationRequest, GenerationResponse, Usage};
use async_trait::async_trait;

pub struct LocalComposer {
    payload: ReadingPayload,
}

impl LocalComposer {
    pub fn new(payload: &ReadingPayload) -> Self {
        Self {
            payload: payload.clone(),
        }
    }
}

#[async_trait]
impl Backend for LocalComposer {
    fn id(&self) -> &str {
        COMPOSER_ID
    }

    async fn generate(
        &self,
        request: GenerationRequest,
    ) -> std::result::Result<GenerationResponse, BackendError> {
        let text = compose_reading(&self.payload);
        let prompt_tokens =
            arcanum_prompt::estimate_tokens(&request.system_prompt)
                + arcanum_prompt::estimate_tokens(&request.user_prompt);
        let completion_tokens = arcanum_prompt::estimate_tokens(&text);

        Ok(GenerationResponse {
            text,
            model: format!("{COMPOSER_ID}/template-v1"),
            usage: Some(Usage {
                prompt_tokens: prompt_tokens as u32,
                completion_tokens: completion_tokens as u32,
                total_tokens: (prompt_tokens + completion_tokens) as u32,
            }),
        })
    }
}

fn compose_reading(payload: &ReadingPayload) -> String {
    let mut out = String::new();

    // Opening
    let theme = payload
        .themes
        .dominant_theme
        .as_deref()
        .unwrap_or("a quiet turning point");
    out.push_str(&format!(
        "This {} reading gathers around {}. Taken together, the cards sketch \
         one movement — read them as a single breath rather than three \
         separate verdicts.\n",
        payload.spread.label, theme
    ));

    // Card by card
    for card in &payload.cards {
        out.push_str(&format!(
            "\n{} — {} ({})\n{}",
            card.position, card.card_name, card.orientation, card.meaning
        ));
        if !card.meaning.ends_with('.') {
            out.push('.');
        }
        out.push('\n');
    }

    // Relationships, when the analysis found any
    if let Some(rel) = &payload.relationships {
        out.push_str(&format!("\nAcross the spread: {}\n", rel.summary));
    }

    // Guidance
    if let Some(last) = payload.cards.last() {
        out.push_str(&format!(
            "\nGuidance: let {} in the {} position set the direction — hold it \
             lightly, and revisit the question as the week unfolds.\n",
            last.card_name, last.position
        ));
    }

    out
}
