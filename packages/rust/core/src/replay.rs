//! Replay of recorded chat streams.

use std::convert::Infallible;

use bytes::Bytes;
use futures::Stream;
use futures::stream;

/// Split a recorded stream into `chunk_size`-byte chunks, mimicking a
/// transport that cuts frames at arbitrary points. A size of 0 is treated as 1.
pub fn replay_stream(
    data: impl Into<Bytes>,
    chunk_size: usize,
) -> impl Stream<Item = Result<Bytes, Infallible>> + Unpin {
    let data = data.into();
    let size = chunk_size.max(1);
    let chunks: Vec<_> = (0..data.len())
        .step_by(size)
        .map(|start| Ok(data.slice(start..(start + size).min(data.len()))))
        .collect();
    stream::iter(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[tokio::test]
    async fn splits_into_fixed_chunks() {
        let chunks: Vec<_> = replay_stream(&b"abcdefg"[..], 3)
            .map(|c| c.unwrap())
            .collect()
            .await;
        assert_eq!(chunks, vec![Bytes::from("abc"), Bytes::from("def"), Bytes::from("g")]);
    }

    #[tokio::test]
    async fn zero_chunk_size_means_single_bytes() {
        assert_eq!(replay_stream("ab", 0).count().await, 2);
    }

    #[tokio::test]
    async fn empty_input_yields_nothing() {
        assert_eq!(replay_stream(Vec::new(), 8).count().await, 0);
    }
}
