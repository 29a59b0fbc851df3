//! The tungstenite connector against a local websocket server.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{ScriptedNegotiator, credential};
use foundry_client::{
    ClientConfig, CredentialStore, FoundryClient, FoundryError, SupervisorEvent,
    TungsteniteConnector,
};
use futures::{SinkExt, StreamExt};
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{WebSocketStream, accept_async};

const HANDSHAKE: &str = r#"0{"sid":"eio-1","upgrades":[],"pingInterval":25000,"pingTimeout":20000,"maxPayload":1000000}"#;

async fn accept(listener: &TcpListener) -> WebSocketStream<TcpStream> {
    let (stream, _) = listener.accept().await.unwrap();
    accept_async(stream).await.unwrap()
}

async fn next_text(ws: &mut WebSocketStream<TcpStream>) -> String {
    loop {
        match ws.next().await.unwrap().unwrap() {
            Message::Text(text) => return text.as_str().to_owned(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected message {other:?}"),
        }
    }
}

async fn send(ws: &mut WebSocketStream<TcpStream>, text: &str) {
    ws.send(Message::Text(text.to_string().into())).await.unwrap();
}

/// Sends the Engine.IO open packet and the session event.
async fn open_session(ws: &mut WebSocketStream<TcpStream>) {
    send(ws, HANDSHAKE).await;
    send(ws, r#"40{"sid":"sio-1"}"#).await;
    send(ws, r#"42["session",{"userId":"gm"}]"#).await;
}

fn client_for(host: &str) -> FoundryClient {
    FoundryClient::builder()
        .with_config(ClientConfig::default().with_secure(false))
        .with_negotiator(Arc::new(ScriptedNegotiator::new()))
        .with_connector(Arc::new(TungsteniteConnector::new()))
        .with_credentials(CredentialStore::from_credentials(vec![credential(host)]))
        .build()
        .unwrap()
}

#[tokio::test]
async fn world_round_trip_and_reconnect_over_real_sockets() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let host = listener.local_addr().unwrap().to_string();

    let server = tokio::spawn(async move {
        // First connection: answer one world request, then drop the client.
        let mut ws = accept(&listener).await;
        open_session(&mut ws).await;
        let mut received = vec![next_text(&mut ws).await, next_text(&mut ws).await];
        received.sort();
        assert_eq!(received, ["40", "420[\"world\"]"]);
        let world = json!([{"title": "Lost Mine", "actors": []}]);
        send(&mut ws, &format!("430{world}")).await;
        ws.close(None).await.unwrap();

        // Second connection: the reconnect.
        let mut ws = accept(&listener).await;
        open_session(&mut ws).await;
        assert_eq!(next_text(&mut ws).await, "40");
        ws
    });

    let client = client_for(&host);
    client.connect().await.unwrap();
    let mut events = client.subscribe();

    let world = client.request_world_snapshot().await.unwrap();
    assert_eq!(world["title"], "Lost Mine");

    let event = tokio::time::timeout(Duration::from_secs(10), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        event,
        SupervisorEvent::Reconnected {
            hostname: host.clone(),
            renewed_session: false
        }
    );

    let _second = server.await.unwrap();
    assert!(client.is_connected());
}

#[tokio::test]
async fn refused_socket_is_a_websocket_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let host = listener.local_addr().unwrap().to_string();
    drop(listener);

    let client = client_for(&host);
    let err = client.connect().await.unwrap_err();
    assert!(matches!(err, FoundryError::NoServerAvailable));

    let connection = foundry_client::connection::Connection::new(
        Arc::new(TungsteniteConnector::new()),
        &ClientConfig::default().with_secure(false),
    );
    let err = connection.open(&host, "sid").await.unwrap_err();
    assert!(err.to_string().starts_with("WebSocket connection failed: "), "{err}");
}
