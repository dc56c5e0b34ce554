use std::sync::Arc;

use crate::generation::Generator;
use crate::models::chat::ChatMessage;
use crate::retrieval::{RetrievalHit, Retriever};
use crate::safety;
use crate::selector::{AnswerSelector, SelectedAnswer};

/// Runs one question through safety screening, retrieval, generation and
/// answer selection. Collaborator failures degrade to the fallback answer.
#[derive(Clone)]
pub struct ChatEngine {
    retriever: Option<Arc<dyn Retriever>>,
    generator: Option<Arc<dyn Generator>>,
    selector: AnswerSelector,
}

impl ChatEngine {
    pub fn new(
        retriever: Option<Arc<dyn Retriever>>,
        generator: Option<Arc<dyn Generator>>,
        selector: AnswerSelector,
    ) -> Self {
        Self {
            retriever,
            generator,
            selector,
        }
    }

    pub fn selector(&self) -> &AnswerSelector {
        &self.selector
    }

    pub fn retriever_name(&self) -> Option<&'static str> {
        self.retriever.as_ref().map(|r| r.name())
    }

    pub fn generator_name(&self) -> Option<&'static str> {
        self.generator.as_ref().map(|g| g.name())
    }

    /// `history` is the session so far, oldest first, excluding `question`.
    pub async fn answer(&self, question: &str, history: &[ChatMessage]) -> SelectedAnswer {
        if safety::screen(question, history) {
            tracing::warn!("Crisis keywords detected; returning support message");
            return SelectedAnswer::crisis(safety::CRISIS_MESSAGE);
        }

        let hit = self.retrieve(question).await;

        if self.selector.retrieval_is_confident(hit.as_ref()) {
            return self.selector.select(hit.as_ref(), None);
        }

        let generated = match &self.generator {
            Some(generator) => {
                let context = hit.as_ref().map(|h| h.text.as_str());
                match generator.generate(question, context, history).await {
                    Ok(answer) => Some(answer),
                    Err(e) => {
                        tracing::error!("Generation failed ({}): {}", generator.name(), e);
                        None
                    }
                }
            }
            None => None,
        };

        self.selector.select(hit.as_ref(), generated.as_ref())
    }

    async fn retrieve(&self, question: &str) -> Option<RetrievalHit> {
        let retriever = self.retriever.as_ref()?;
        match retriever.nearest(question).await {
            Ok(hit) => {
                if let Some(ref h) = hit {
                    tracing::debug!("Retrieval ({}) best score {:.3}", retriever.name(), h.score);
                }
                hit
            }
            Err(e) => {
                tracing::error!("Retrieval failed ({}): {}", retriever.name(), e);
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::selector::{AnswerSource, FALLBACK_MESSAGE};
    use crate::test_support::{StubGenerator, StubRetriever};

    fn engine(retriever: &Arc<StubRetriever>, generator: &Arc<StubGenerator>) -> ChatEngine {
        ChatEngine::new(
            Some(retriever.clone() as Arc<dyn Retriever>),
            Some(generator.clone() as Arc<dyn Generator>),
            AnswerSelector::new(0.35),
        )
    }

    #[tokio::test]
    async fn confident_retrieval_skips_generation() {
        let retriever = Arc::new(StubRetriever::hit("Stored", 0.5));
        let generator = Arc::new(StubGenerator::answer("Generated", Some(-0.2)));

        let answer = engine(&retriever, &generator).answer("What is flu?", &[]).await;
        assert_eq!(answer.source, AnswerSource::Retrieval);
        assert_eq!(answer.confidence, Some(0.5));
        assert_eq!(retriever.calls(), 1);
        assert_eq!(generator.calls(), 0);
    }

    #[tokio::test]
    async fn weak_retrieval_passes_context_to_generation() {
        let retriever = Arc::new(StubRetriever::hit("Flu is a viral infection.", 0.1));
        let generator = Arc::new(StubGenerator::answer("Generated", Some(0.0)));

        let answer = engine(&retriever, &generator).answer("What is flu?", &[]).await;
        assert_eq!(answer.source, AnswerSource::Generation);
        assert_eq!(answer.text, "Generated");
        assert_eq!(generator.calls(), 1);
        assert_eq!(
            generator.last_context().as_deref(),
            Some("Flu is a viral infection.")
        );
    }

    #[tokio::test]
    async fn failing_collaborators_fall_back() {
        let retriever = Arc::new(StubRetriever::failing());
        let generator = Arc::new(StubGenerator::failing());

        let answer = engine(&retriever, &generator).answer("What is flu?", &[]).await;
        assert_eq!(answer.source, AnswerSource::Fallback);
        assert_eq!(answer.text, FALLBACK_MESSAGE);
        assert_eq!(answer.confidence, None);
        assert_eq!(generator.calls(), 1);
    }

    #[tokio::test]
    async fn no_collaborators_falls_back() {
        let engine = ChatEngine::new(None, None, AnswerSelector::default());
        let answer = engine.answer("What is flu?", &[]).await;
        assert_eq!(answer.source, AnswerSource::Fallback);
    }

    #[tokio::test]
    async fn crisis_short_circuits_without_external_calls() {
        let retriever = Arc::new(StubRetriever::hit("Stored", 0.9));
        let generator = Arc::new(StubGenerator::answer("Generated", None));

        let answer = engine(&retriever, &generator)
            .answer("I want to hurt myself", &[])
            .await;
        assert_eq!(answer.source, AnswerSource::Safety);
        assert!(answer.flagged);
        assert_eq!(answer.confidence, None);
        assert_eq!(retriever.calls(), 0);
        assert_eq!(generator.calls(), 0);
    }
}
