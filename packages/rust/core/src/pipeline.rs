//! One assistant turn: stream → accumulate → resolve → repair → finalize.

use std::fmt::Display;

use chrono::Utc;
use futures::{Stream, StreamExt};
use tracing::{Span, debug, field, info, instrument, warn};

use citeflow_citations::{CitationResolver, NameCleaner, SourceCatalog};
use citeflow_markdown::{finalize_document, repair_tables};
use citeflow_shared::{AnswerDocument, AppConfig, CiteflowError, Result, SourceRecord, TurnId};
use citeflow_stream::{AnswerAccumulator, ProtocolEvent, event_stream};

use crate::observer::AnswerObserver;

/// Settings for post-processing.
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    /// Turns source titles into display names.
    pub cleaner: NameCleaner,
}

impl From<&AppConfig> for PipelineConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            cleaner: NameCleaner::from_config(&config.citations),
        }
    }
}

/// Drives one turn at a time. Holds no state between turns.
#[derive(Debug, Clone, Default)]
pub struct AnswerPipeline {
    config: PipelineConfig,
}

impl AnswerPipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    /// Run the post-stream stages over complete answer text.
    pub fn post_process(&self, raw_text: &str, sources: &[SourceRecord]) -> AnswerDocument {
        self.assemble(TurnId::new(), raw_text.to_string(), sources)
    }

    /// Consume a chat byte stream to completion.
    ///
    /// Every content delta produces one snapshot on `observer`, in receive
    /// order. On the completion event the answer is post-processed and passed
    /// to [`AnswerObserver::finalized`]. Any failure is reported through
    /// [`AnswerObserver::failed`] and returned, carrying the text accumulated
    /// so far.
    #[instrument(skip_all, fields(turn_id = field::Empty))]
    pub async fn run_turn<S, B, E>(
        &self,
        bytes: S,
        observer: &dyn AnswerObserver,
    ) -> Result<AnswerDocument>
    where
        S: Stream<Item = std::result::Result<B, E>> + Unpin,
        B: AsRef<[u8]>,
        E: Display,
    {
        let turn_id = TurnId::new();
        Span::current().record("turn_id", field::display(&turn_id));

        match self.drive(turn_id, bytes, observer).await {
            Ok(document) => {
                observer.finalized(&document);
                Ok(document)
            }
            Err(e) => {
                warn!(error = %e, "turn failed");
                observer.failed(&e);
                Err(e)
            }
        }
    }

    async fn drive<S, B, E>(
        &self,
        turn_id: TurnId,
        bytes: S,
        observer: &dyn AnswerObserver,
    ) -> Result<AnswerDocument>
    where
        S: Stream<Item = std::result::Result<B, E>> + Unpin,
        B: AsRef<[u8]>,
        E: Display,
    {
        let mut events = std::pin::pin!(event_stream(bytes));
        let mut answer = AnswerAccumulator::new();

        while let Some(event) = events.next().await {
            match event.map_err(|e| e.with_partial(answer.text()))? {
                ProtocolEvent::ContentDelta(delta) => {
                    answer.push(&delta);
                    observer.snapshot(answer.delta_count(), answer.text());
                }
                ProtocolEvent::Completion(sources) => {
                    info!(
                        deltas = answer.delta_count(),
                        sources = sources.len(),
                        "stream complete"
                    );
                    return Ok(self.assemble(turn_id, answer.into_text(), &sources));
                }
                ProtocolEvent::StreamError(message) => {
                    return Err(CiteflowError::Stream {
                        message,
                        partial: answer.into_text(),
                    });
                }
            }
        }

        Err(CiteflowError::Incomplete {
            partial: answer.into_text(),
        })
    }

    fn assemble(&self, turn_id: TurnId, raw_text: String, sources: &[SourceRecord]) -> AnswerDocument {
        let catalog = SourceCatalog::build(sources, &self.config.cleaner);
        let resolution = CitationResolver::new(&catalog).resolve(&raw_text);
        let repaired = repair_tables(&resolution.text);
        let final_text = finalize_document(&repaired);

        debug!(
            %turn_id,
            resolved = resolution.stats.resolved,
            dropped = resolution.stats.dropped,
            tables_changed = repaired != resolution.text,
            final_len = final_text.len(),
            "answer post-processed"
        );

        AnswerDocument {
            turn_id,
            raw_text,
            resolved_text: resolution.text,
            final_text,
            sources: sources.to_vec(),
            completed_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;
    use crate::observer::SilentObserver;
    use crate::replay::replay_stream;

    const DOC_A: &str = "0f8c2a4e9b1d4c7a8e3f5a6b7c8d9e0f";
    const DOC_B: &str = "1a2b3c4d5e6f7a8b9c0d1e2f3a4b5c6d";

    /// Records every callback for assertions.
    #[derive(Default)]
    struct Recorder {
        snapshots: Mutex<Vec<(usize, String)>>,
        finals: Mutex<Vec<String>>,
        failures: Mutex<Vec<Option<String>>>,
    }

    impl AnswerObserver for Recorder {
        fn snapshot(&self, seq: usize, text: &str) {
            self.snapshots.lock().unwrap().push((seq, text.to_string()));
        }
        fn finalized(&self, document: &AnswerDocument) {
            self.finals.lock().unwrap().push(document.final_text.clone());
        }
        fn failed(&self, error: &CiteflowError) {
            self.failures
                .lock()
                .unwrap()
                .push(error.partial_text().map(str::to_string));
        }
    }

    fn fixture(name: &str) -> Vec<u8> {
        let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("../../../fixtures/streams")
            .join(name);
        std::fs::read(&path).unwrap_or_else(|e| panic!("failed to read fixture {name}: {e}"))
    }

    fn expected_final() -> String {
        format!(
            "Revenue grew 12% [[SOURCE:Annual Report.pdf:{DOC_A}:]]. Costs fell \
             [[SOURCE:Annual Report.pdf:{DOC_A}:]], [[SOURCE:Budget:{DOC_B}:]].\n\n\
             |Quarter|Revenue|\n|---|---|\n|Q1|10|\n|Q2|12|\n\n\
             See [[SOURCE:Press release:abc:https://example.com/press]] and."
        )
    }

    #[tokio::test]
    async fn replayed_log_produces_final_document() {
        let pipeline = AnswerPipeline::default();
        let recorder = Recorder::default();

        let doc = pipeline
            .run_turn(replay_stream(fixture("answer.log"), 7), &recorder)
            .await
            .unwrap();

        assert_eq!(doc.final_text, expected_final());
        assert_eq!(doc.sources.len(), 3);
        assert!(doc.raw_text.contains("[Sources 1, 2]"));
        assert!(doc.resolved_text.contains("Sources Used: 3"));

        let snapshots = recorder.snapshots.lock().unwrap();
        assert_eq!(snapshots.len(), 4);
        assert_eq!(snapshots[0], (1, "Revenue grew 12% ".to_string()));
        assert_eq!(snapshots[3].1, doc.raw_text);
        assert!(snapshots.windows(2).all(|w| w[1].1.starts_with(&w[0].1)));
        assert_eq!(*recorder.finals.lock().unwrap(), vec![doc.final_text.clone()]);
    }

    #[tokio::test]
    async fn chunk_size_does_not_change_result() {
        let pipeline = AnswerPipeline::default();
        let log = fixture("answer.log");
        for chunk_size in [1, 3, 64, log.len()] {
            let doc = pipeline
                .run_turn(replay_stream(log.clone(), chunk_size), &SilentObserver)
                .await
                .unwrap();
            assert_eq!(doc.final_text, expected_final(), "chunk size {chunk_size}");
        }
    }

    #[tokio::test]
    async fn stream_error_keeps_partial_text() {
        let recorder = Recorder::default();
        let log = b"data: {\"content\": \"Partial \"}\ndata: {\"content\": \"answer\"}\ndata: {\"error\": \"model overloaded\"}\n";

        let err = AnswerPipeline::default()
            .run_turn(replay_stream(log.to_vec(), 10), &recorder)
            .await
            .unwrap_err();

        match &err {
            CiteflowError::Stream { message, partial } => {
                assert_eq!(message, "model overloaded");
                assert_eq!(partial, "Partial answer");
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(
            *recorder.failures.lock().unwrap(),
            vec![Some("Partial answer".to_string())]
        );
        assert!(recorder.finals.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_terminal_event_is_incomplete() {
        let log = b"data: {\"content\": \"cut off\"}\n";
        let err = AnswerPipeline::default()
            .run_turn(replay_stream(log.to_vec(), 4), &SilentObserver)
            .await
            .unwrap_err();

        assert!(matches!(err, CiteflowError::Incomplete { .. }));
        assert_eq!(err.partial_text(), Some("cut off"));
    }

    #[tokio::test]
    async fn transport_error_carries_accumulated_text() {
        let items: Vec<std::result::Result<&'static [u8], std::io::Error>> = vec![
            Ok(&b"data: {\"content\": \"so far\"}\n"[..]),
            Err(std::io::Error::other("connection reset")),
        ];

        let err = AnswerPipeline::default()
            .run_turn(futures::stream::iter(items), &SilentObserver)
            .await
            .unwrap_err();

        assert!(matches!(err, CiteflowError::Transport { .. }));
        assert_eq!(err.partial_text(), Some("so far"));
    }

    #[test]
    fn post_process_runs_every_stage() {
        let sources = vec![SourceRecord {
            ordinal: 1,
            title: "Paper A".into(),
            doc_id: DOC_A.into(),
            source_url: None,
        }];
        let doc = AnswerPipeline::default().post_process(
            "see [Source 1]\n\n```\nx\ty\n1\t2\n```\n\n📚 Sources\n",
            &sources,
        );

        assert_eq!(
            doc.final_text,
            format!("see [[SOURCE:Paper A:{DOC_A}:]]\n\n| x | y |\n| --- | --- |\n| 1 | 2 |")
        );
        assert_eq!(doc.sources, sources);
    }

    #[test]
    fn config_prefixes_reach_the_catalog() {
        let mut app = AppConfig::default();
        app.citations.noise_prefixes = vec!["draft_".into()];
        let pipeline = AnswerPipeline::new(PipelineConfig::from(&app));

        let sources = vec![SourceRecord {
            ordinal: 1,
            title: "draft_Plan".into(),
            doc_id: "d".into(),
            source_url: None,
        }];
        let doc = pipeline.post_process("[Source 1]", &sources);
        assert_eq!(doc.final_text, "[[SOURCE:Plan:d:]]");
    }
}
