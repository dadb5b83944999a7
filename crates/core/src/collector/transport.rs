use color_eyre::eyre::{self, WrapErr as _};
use futures::{
    Sink, Stream, StreamExt as _,
    stream::{SplitSink, SplitStream},
};
use tokio::net::TcpStream;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, tungstenite::Message};

pub type WsError = tokio_tungstenite::tungstenite::Error;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Opens a message-oriented connection to a feed endpoint.
pub trait Connect: Send + Sync + 'static {
    type Sink: Sink<Message, Error = WsError> + Unpin + Send;
    type Stream: Stream<Item = Result<Message, WsError>> + Unpin + Send;

    fn connect(
        &self,
        url: &str,
    ) -> impl Future<Output = eyre::Result<(Self::Sink, Self::Stream)>> + Send;
}

/// Websocket connector backed by `tokio-tungstenite`.
#[derive(Debug, Clone, Copy, Default)]
pub struct WsConnector;

impl Connect for WsConnector {
    type Sink = SplitSink<WsStream, Message>;
    type Stream = SplitStream<WsStream>;

    async fn connect(&self, url: &str) -> eyre::Result<(Self::Sink, Self::Stream)> {
        let (socket, _response) = tokio_tungstenite::connect_async(url)
            .await
            .wrap_err_with(|| format!("failed to connect to {url}"))?;
        Ok(socket.split())
    }
}
