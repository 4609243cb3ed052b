//! Chat event stream decoding and answer accumulation.
//!
//! [`FrameDecoder`] turns transport chunks into [`ProtocolEvent`]s, and
//! [`AnswerAccumulator`] folds content deltas into the live answer text.
//! [`event_stream`] wraps both halves of the decode loop around an async
//! byte stream.

mod accumulator;
mod decoder;

use std::collections::VecDeque;
use std::fmt::Display;

use futures::{Stream, StreamExt, stream};

use citeflow_shared::{CiteflowError, Result};

pub use accumulator::AnswerAccumulator;
pub use decoder::{FrameDecoder, ProtocolEvent, decode_all};

/// Lazily decode an async byte stream into protocol events.
///
/// The returned stream ends after the first terminal event, or when the byte
/// stream is exhausted. A failed chunk read yields a single
/// [`CiteflowError::Transport`] and ends the stream.
pub fn event_stream<S, B, E>(bytes: S) -> impl Stream<Item = Result<ProtocolEvent>>
where
    S: Stream<Item = std::result::Result<B, E>> + Unpin,
    B: AsRef<[u8]>,
    E: Display,
{
    struct State<S> {
        bytes: S,
        decoder: FrameDecoder,
        pending: VecDeque<ProtocolEvent>,
        done: bool,
    }

    stream::try_unfold(
        State {
            bytes,
            decoder: FrameDecoder::new(),
            pending: VecDeque::new(),
            done: false,
        },
        |mut state| async move {
            loop {
                if let Some(event) = state.pending.pop_front() {
                    return Ok(Some((event, state)));
                }
                if state.done {
                    return Ok(None);
                }

                match state.bytes.next().await {
                    Some(Ok(chunk)) => {
                        state.pending.extend(state.decoder.push_chunk(chunk.as_ref()));
                        state.done = state.decoder.is_terminated();
                    }
                    Some(Err(e)) => {
                        return Err(CiteflowError::Transport {
                            message: format!("stream read failed: {e}"),
                            partial: String::new(),
                        });
                    }
                    None => {
                        state.pending.extend(state.decoder.finish());
                        state.done = true;
                    }
                }
            }
        },
    )
}
