//! Connection adapter.
//!
//! Clients talk to their peer through a [`Frame`] stream and a [`Frame`]
//! sink, so the pumps do not depend on the WebSocket library and can be
//! driven by in-memory channels in tests.

use bytes::Bytes;
use futures::future;
use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use crate::error::ConnectionError;

/// One unit of traffic on a connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    /// Application payload (one JSON message).
    Data(Bytes),
    /// Keep-alive. Written as a ping; received pings and pongs map here.
    Heartbeat,
    /// Close handshake.
    Close,
}

impl Frame {
    /// UTF-8 payloads go out as text frames, anything else as binary.
    pub fn into_message(self) -> Message {
        match self {
            Frame::Data(bytes) => match String::from_utf8(bytes.to_vec()) {
                Ok(text) => Message::Text(text),
                Err(err) => Message::Binary(err.into_bytes()),
            },
            Frame::Heartbeat => Message::Ping(Vec::new()),
            Frame::Close => Message::Close(None),
        }
    }

    /// `None` for raw frames, which never surface when reading.
    pub fn from_message(message: Message) -> Option<Frame> {
        match message {
            Message::Text(text) => Some(Frame::Data(Bytes::from(text))),
            Message::Binary(data) => Some(Frame::Data(Bytes::from(data))),
            Message::Ping(_) | Message::Pong(_) => Some(Frame::Heartbeat),
            Message::Close(_) => Some(Frame::Close),
            Message::Frame(_) => None,
        }
    }
}

/// Split an upgraded WebSocket into a frame stream and a frame sink.
pub fn split_websocket<S>(
    ws: WebSocketStream<S>,
) -> (
    impl Stream<Item = Result<Frame, ConnectionError>> + Unpin + Send,
    impl Sink<Frame, Error = ConnectionError> + Unpin + Send,
)
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    let (sink, stream) = ws.split();

    let stream = stream.filter_map(|item| {
        future::ready(match item {
            Ok(message) => Frame::from_message(message).map(Ok),
            Err(err) => Some(Err(ConnectionError::from(err))),
        })
    });

    let sink = sink
        .sink_map_err(ConnectionError::from)
        .with(|frame: Frame| future::ready(Ok::<_, ConnectionError>(frame.into_message())));

    (stream, sink)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn text_payload_becomes_text_message() {
        let msg = Frame::Data(Bytes::from_static(br#"{"kind":"ping"}"#)).into_message();
        assert_eq!(msg, Message::Text(r#"{"kind":"ping"}"#.to_string()));
    }

    #[test]
    fn non_utf8_payload_becomes_binary() {
        let msg = Frame::Data(Bytes::from_static(&[0xff, 0x00])).into_message();
        assert_eq!(msg, Message::Binary(vec![0xff, 0x00]));
    }

    #[test]
    fn control_messages_map_to_control_frames() {
        assert_eq!(Frame::Heartbeat.into_message(), Message::Ping(Vec::new()));
        assert_eq!(Frame::Close.into_message(), Message::Close(None));

        assert_eq!(
            Frame::from_message(Message::Pong(vec![1])),
            Some(Frame::Heartbeat)
        );
        assert_eq!(Frame::from_message(Message::Close(None)), Some(Frame::Close));
        assert_eq!(
            Frame::from_message(Message::Text("hi".into())),
            Some(Frame::Data(Bytes::from_static(b"hi")))
        );
    }
}
