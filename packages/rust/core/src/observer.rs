//! Turn observers: the live snapshot path and the final document path.
//!
//! A pipeline reports every accumulated snapshot, in receive order, through
//! [`AnswerObserver::snapshot`]. Once post-processing finishes it hands over
//! the document through [`AnswerObserver::finalized`], which must replace
//! whatever the snapshots displayed.

use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

use citeflow_shared::{AnswerDocument, CiteflowError};

/// Receives the progress of one assistant turn.
pub trait AnswerObserver: Send + Sync {
    /// Running answer text after content delta number `seq` (1-based).
    fn snapshot(&self, seq: usize, text: &str);
    /// The finished document. Called at most once, after the last snapshot.
    fn finalized(&self, document: &AnswerDocument);
    /// The turn failed. Called instead of `finalized`.
    fn failed(&self, error: &CiteflowError);
}

/// No-op observer for headless/test usage.
pub struct SilentObserver;

impl AnswerObserver for SilentObserver {
    fn snapshot(&self, _seq: usize, _text: &str) {}
    fn finalized(&self, _document: &AnswerDocument) {}
    fn failed(&self, _error: &CiteflowError) {}
}

/// Owned form of an observer callback, for sending across tasks.
#[derive(Debug, Clone)]
pub enum AnswerUpdate {
    Snapshot { seq: usize, text: String },
    Finalized(Box<AnswerDocument>),
    Failed {
        message: String,
        partial: Option<String>,
    },
}

/// Forwards every callback over an unbounded channel.
///
/// Sends never block the decode loop. A dropped receiver only means nobody
/// is watching, so send failures are ignored.
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: UnboundedSender<AnswerUpdate>,
}

impl ChannelObserver {
    pub fn new() -> (Self, UnboundedReceiver<AnswerUpdate>) {
        let (tx, rx) = unbounded_channel();
        (Self { tx }, rx)
    }

    fn send(&self, update: AnswerUpdate) {
        let _ = self.tx.send(update);
    }
}

impl AnswerObserver for ChannelObserver {
    fn snapshot(&self, seq: usize, text: &str) {
        self.send(AnswerUpdate::Snapshot {
            seq,
            text: text.to_string(),
        });
    }

    fn finalized(&self, document: &AnswerDocument) {
        self.send(AnswerUpdate::Finalized(Box::new(document.clone())));
    }

    fn failed(&self, error: &CiteflowError) {
        self.send(AnswerUpdate::Failed {
            message: error.to_string(),
            partial: error.partial_text().map(str::to_string),
        });
    }
}
