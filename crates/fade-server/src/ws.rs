/// WebSocket adapter: one socket ⇄ one hub channel.
///
/// First frame must be `{"type":"auth","username":…}` from the trusted
/// auth layer. After that, text frames go to the room and room events come
/// back out. Errors are answered on this socket only. Either half ending
/// closes the other and drops the subscription.
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use fade_protocol::{ChatRoom, Identity, ServerEvent};
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;

/// How long a new socket has to authenticate.
const AUTH_TIMEOUT: Duration = Duration::from_secs(10);

/// Direct replies queued per socket (error frames).
const REPLY_BUFFER: usize = 16;

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
enum AuthFrame {
    Auth { username: String },
}

pub async fn upgrade(ws: WebSocketUpgrade, State(room): State<ChatRoom>) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, room))
}

async fn handle_socket(socket: WebSocket, room: ChatRoom) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    let Some(identity) = authenticate(&mut ws_tx, &mut ws_rx).await else {
        return;
    };
    let mut subscription = room.connect(&identity);
    let channel = subscription.channel_id();
    tracing::info!(%identity, %channel, "client connected");

    let ack = ServerEvent::AuthSuccess {
        username: identity.clone(),
    };
    if send_event(&mut ws_tx, &ack).await.is_err() {
        return;
    }

    let (reply_tx, mut reply_rx) = mpsc::channel::<ServerEvent>(REPLY_BUFFER);

    // Room events and direct replies → socket.
    let mut send_task = tokio::spawn(async move {
        loop {
            let event = tokio::select! {
                event = subscription.recv() => match event {
                    Some(event) => event,
                    // Hub dropped us (slow consumer)
                    None => break,
                },
                Some(reply) = reply_rx.recv() => reply,
            };
            if send_event(&mut ws_tx, &event).await.is_err() {
                break;
            }
        }
        let _ = ws_tx.close().await;
    });

    // Socket → room.
    let sender = identity.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = ws_rx.next().await {
            match msg {
                Message::Text(text) => {
                    // Store writes may block on SQLite
                    let (room, sender) = (room.clone(), sender.clone());
                    let frame = text.as_str().to_owned();
                    let handled =
                        tokio::task::spawn_blocking(move || room.handle_frame(&sender, &frame))
                            .await;
                    let reply = match handled {
                        Ok(Ok(_)) => continue,
                        Ok(Err(e)) => ServerEvent::error(&e),
                        Err(e) => {
                            tracing::error!(error = %e, "frame task failed");
                            ServerEvent::Error {
                                message: "Failed to send message".into(),
                            }
                        }
                    };
                    if reply_tx.send(reply).await.is_err() {
                        break;
                    }
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }
    tracing::info!(%identity, %channel, "client disconnected");
}

/// Wait for the auth frame. `None` means the socket was closed or refused.
async fn authenticate(
    ws_tx: &mut SplitSink<WebSocket, Message>,
    ws_rx: &mut SplitStream<WebSocket>,
) -> Option<Identity> {
    let deadline = tokio::time::sleep(AUTH_TIMEOUT);
    tokio::pin!(deadline);

    loop {
        let msg = tokio::select! {
            msg = ws_rx.next() => msg,
            _ = &mut deadline => {
                tracing::warn!("client did not authenticate within {AUTH_TIMEOUT:?}");
                let _ = ws_tx.close().await;
                return None;
            }
        };
        let Some(Ok(msg)) = msg else {
            return None;
        };
        match msg {
            Message::Text(text) => {
                return match serde_json::from_str::<AuthFrame>(text.as_str()) {
                    Ok(AuthFrame::Auth { username }) if !username.trim().is_empty() => {
                        Some(Identity::from(username))
                    }
                    _ => {
                        let refusal = ServerEvent::Error {
                            message: "Authentication required".into(),
                        };
                        let _ = send_event(ws_tx, &refusal).await;
                        let _ = ws_tx.close().await;
                        None
                    }
                };
            }
            Message::Close(_) => return None,
            _ => {}
        }
    }
}

async fn send_event(
    ws_tx: &mut SplitSink<WebSocket, Message>,
    event: &ServerEvent,
) -> anyhow::Result<()> {
    let json = event.to_json()?;
    ws_tx.send(Message::Text(json.into())).await?;
    Ok(())
}
