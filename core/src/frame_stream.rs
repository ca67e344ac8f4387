use std::collections::VecDeque;
use std::pin::Pin;
use std::task::Context;
use std::task::Poll;

use bytes::Bytes;
use chatline_protocol::StreamFrame;
use futures::Stream;
use tracing::debug;

use crate::decoder::FrameDecoder;
use crate::error::TransportError;

/// Adapts a body byte stream into decoded [`StreamFrame`]s.
///
/// Frames come out in the order their bytes arrived. When the body ends the
/// decoder is flushed, so an unterminated final line still counts.
pub struct FrameStream<S> {
    inner: S,
    decoder: FrameDecoder,
    pending: VecDeque<StreamFrame>,
    finished: bool,
}

impl<S> FrameStream<S> {
    pub fn new(inner: S) -> Self {
        Self {
            inner,
            decoder: FrameDecoder::new(),
            pending: VecDeque::new(),
            finished: false,
        }
    }
}

impl<S, E> Stream for FrameStream<S>
where
    S: Stream<Item = std::result::Result<Bytes, E>> + Unpin,
    E: std::fmt::Display,
{
    type Item = crate::error::Result<StreamFrame>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            if let Some(frame) = self.pending.pop_front() {
                return Poll::Ready(Some(Ok(frame)));
            }
            if self.finished {
                return Poll::Ready(None);
            }

            match Pin::new(&mut self.inner).poll_next(cx) {
                Poll::Ready(Some(Ok(chunk))) => {
                    let frames = self.decoder.push_bytes(&chunk);
                    self.pending.extend(frames);
                }
                Poll::Ready(Some(Err(err))) => {
                    self.finished = true;
                    return Poll::Ready(Some(Err(TransportError::Read(err.to_string()))));
                }
                Poll::Ready(None) => {
                    self.finished = true;
                    let frames = self.decoder.finish();
                    self.pending.extend(frames);
                    debug!(
                        frames = self.decoder.frames_decoded(),
                        dropped = self.decoder.lines_dropped(),
                        "response body ended"
                    );
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use futures::stream;
    use pretty_assertions::assert_eq;

    fn chunks(parts: &[&'static str]) -> Vec<std::result::Result<Bytes, std::io::Error>> {
        parts
            .iter()
            .map(|part| Ok(Bytes::from_static(part.as_bytes())))
            .collect()
    }

    #[tokio::test]
    async fn frames_follow_chunk_order() {
        let body = stream::iter(chunks(&[
            "data: {\"content\":\"a\"}\nda",
            "ta: {\"content\":\"b\"}\n",
            "data: [DONE]",
        ]));
        let frames: Vec<StreamFrame> = FrameStream::new(body)
            .filter_map(|item| async move { item.ok() })
            .collect()
            .await;
        assert_eq!(
            frames,
            vec![
                StreamFrame::ContentDelta("a".to_string()),
                StreamFrame::ContentDelta("b".to_string()),
                StreamFrame::EndOfStream,
            ]
        );
    }

    #[tokio::test]
    async fn body_error_ends_the_stream() {
        let body = stream::iter(vec![
            Ok(Bytes::from_static(b"data: {\"content\":\"a\"}\n")),
            Err(std::io::Error::other("reset by peer")),
            Ok(Bytes::from_static(b"data: {\"content\":\"never\"}\n")),
        ]);
        let items: Vec<_> = FrameStream::new(body).collect().await;
        assert_eq!(items.len(), 2);
        assert!(matches!(&items[0], Ok(StreamFrame::ContentDelta(text)) if text == "a"));
        assert!(matches!(&items[1], Err(TransportError::Read(msg)) if msg.contains("reset")));
    }
}
