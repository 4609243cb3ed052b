//! Turn orchestration for citeflow.
//!
//! This crate ties the stream decoder, citation resolver and Markdown repair
//! passes into [`AnswerPipeline`], and provides the HTTP [`ChatClient`] that
//! feeds it.

pub mod client;
pub mod observer;
pub mod pipeline;
pub mod replay;

pub use client::{ByteStream, ChatClient};
pub use observer::{AnswerObserver, AnswerUpdate, ChannelObserver, SilentObserver};
pub use pipeline::{AnswerPipeline, PipelineConfig};
pub use replay::replay_stream;
