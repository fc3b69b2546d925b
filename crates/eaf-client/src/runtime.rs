//! ---
//! eaf_section: "05-networking-external-interfaces"
//! eaf_subsection: "module"
//! eaf_type: "source"
//! eaf_scope: "code"
//! eaf_description: "Tokio driver running the streaming client over tokio-tungstenite."
//! eaf_version: "v0.0.0-prealpha"
//! eaf_owner: "tbd"
//! ---
use std::future::pending;
use std::time::Duration;

use eaf_common::{now_ms, ClientConfig};
use eaf_msg::{encode, log_message, MessageDirection};
use futures_util::future::BoxFuture;
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::{self, Message};
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, warn};

use crate::core::{ClientAction, ClientSettings, CloseKind, StreamClient};
use crate::endpoint::Endpoint;
use crate::sink::StateSink;
use crate::ClientError;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;
type PendingConnect = BoxFuture<'static, Result<WsStream, tungstenite::Error>>;

#[derive(Debug)]
enum Command {
    Reconnect,
}

/// Handle to a spawned streaming client.
pub struct StreamingClientHandle<S> {
    endpoint: Endpoint,
    shutdown: watch::Sender<bool>,
    commands: mpsc::UnboundedSender<Command>,
    task: JoinHandle<S>,
}

impl<S> StreamingClientHandle<S> {
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Manual reconnect, also after retries are exhausted.
    pub fn reconnect(&self) {
        let _ = self.commands.send(Command::Reconnect);
    }

    /// Tear the client down and hand back its sink.
    pub async fn shutdown(self) -> Result<S, ClientError> {
        let _ = self.shutdown.send(true);
        Ok(self.task.await?)
    }
}

/// Validate `config`, derive the endpoint and start streaming on the tokio runtime.
pub fn spawn_client<S>(config: &ClientConfig, sink: S) -> Result<StreamingClientHandle<S>, ClientError>
where
    S: StateSink + 'static,
{
    config
        .validate()
        .map_err(|err| ClientError::Config(format!("{err:#}")))?;
    let endpoint = Endpoint::from_page(&config.page_url, &config.path)?;
    let client = StreamClient::new(ClientSettings::from(config), sink);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let task = tokio::spawn(drive(endpoint.clone(), client, shutdown_rx, command_rx));
    info!(endpoint = %endpoint, session = ?config.session_key, "streaming client started");

    Ok(StreamingClientHandle {
        endpoint,
        shutdown: shutdown_tx,
        commands: command_tx,
        task,
    })
}

async fn drive<S: StateSink>(
    endpoint: Endpoint,
    mut client: StreamClient<S>,
    mut shutdown: watch::Receiver<bool>,
    mut commands: mpsc::UnboundedReceiver<Command>,
) -> S {
    let mut socket: Option<WsStream> = None;
    let mut connecting: Option<PendingConnect> = None;
    client.connect(now_ms());

    loop {
        perform_actions(&mut client, &endpoint, &mut socket, &mut connecting).await;
        let deadline = client.next_deadline();

        tokio::select! {
            _ = shutdown.changed() => {
                client.close();
                perform_actions(&mut client, &endpoint, &mut socket, &mut connecting).await;
                break;
            }
            Some(command) = commands.recv() => match command {
                Command::Reconnect => client.reconnect_now(now_ms()),
            },
            result = await_connect(&mut connecting) => {
                connecting = None;
                match result {
                    Ok(stream) => {
                        socket = Some(stream);
                        client.handle_open(now_ms());
                    }
                    Err(err) => {
                        warn!(endpoint = %endpoint, error = %err, "connect failed");
                        client.handle_close(CloseKind::Abnormal, now_ms());
                    }
                }
            }
            frame = next_frame(&mut socket) => {
                match frame {
                    Some(Ok(Message::Text(text))) => client.handle_text(&text, now_ms()),
                    Some(Ok(Message::Close(frame))) => {
                        let kind = match frame {
                            Some(frame) if frame.code == CloseCode::Normal => CloseKind::Clean,
                            _ => CloseKind::Abnormal,
                        };
                        debug!(?kind, "server closed the stream");
                        socket = None;
                        client.handle_close(kind, now_ms());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(err)) => {
                        warn!(error = %err, "stream transport error");
                        socket = None;
                        client.handle_close(CloseKind::Abnormal, now_ms());
                    }
                    None => {
                        socket = None;
                        client.handle_close(CloseKind::Abnormal, now_ms());
                    }
                }
            }
            _ = sleep_until_deadline(deadline) => client.fire_due(now_ms()),
        }
    }

    info!("streaming client stopped");
    client.into_sink()
}

async fn perform_actions<S: StateSink>(
    client: &mut StreamClient<S>,
    endpoint: &Endpoint,
    socket: &mut Option<WsStream>,
    connecting: &mut Option<PendingConnect>,
) {
    while let Some(action) = client.poll_action() {
        match action {
            ClientAction::Connect => {
                *socket = None;
                let url = endpoint.as_str().to_owned();
                debug!(%url, "opening stream");
                *connecting = Some(Box::pin(async move {
                    connect_async(url).await.map(|(stream, _response)| stream)
                }));
            }
            ClientAction::Send(message) => {
                let Some(stream) = socket.as_mut() else {
                    debug!(kind = message.kind(), "not connected; dropping outbound message");
                    continue;
                };
                let text = match encode(&message) {
                    Ok(text) => text,
                    Err(err) => {
                        warn!(error = %err, "failed to encode outbound message");
                        continue;
                    }
                };
                log_message(MessageDirection::Outbound, message.kind(), None);
                if let Err(err) = stream.send(Message::Text(text)).await {
                    // The read half reports the failure and drives recovery.
                    warn!(error = %err, "failed to send message");
                }
            }
            ClientAction::Disconnect => {
                *connecting = None;
                if let Some(mut stream) = socket.take() {
                    if let Err(err) = stream.close(None).await {
                        debug!(error = %err, "error while closing stream");
                    }
                }
            }
        }
    }
}

async fn await_connect(connecting: &mut Option<PendingConnect>) -> Result<WsStream, tungstenite::Error> {
    match connecting.as_mut() {
        Some(future) => future.await,
        None => pending().await,
    }
}

async fn next_frame(socket: &mut Option<WsStream>) -> Option<Result<Message, tungstenite::Error>> {
    match socket.as_mut() {
        Some(stream) => stream.next().await,
        None => pending().await,
    }
}

async fn sleep_until_deadline(deadline: Option<i64>) {
    match deadline {
        Some(due) => {
            let wait = u64::try_from(due - now_ms()).unwrap_or(0);
            sleep(Duration::from_millis(wait)).await;
        }
        None => pending().await,
    }
}
