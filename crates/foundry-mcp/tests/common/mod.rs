//! A scripted Foundry peer behind in-memory sockets.

#![allow(dead_code, unreachable_pub)]

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use foundry_client::connection::{OpenedSocket, Outbound, SocketEvent};
use foundry_client::{
    Credential, CredentialStore, FixedClock, FoundryClient, FoundryResult, SessionNegotiator,
    SocketConnector, SocketHandle,
};
use foundry_mcp::{McpServer, ToolDispatcher};
use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::sync::mpsc;

/// Accepts every login.
#[derive(Debug, Default)]
pub struct AcceptingNegotiator;

#[async_trait]
impl SessionNegotiator for AcceptingNegotiator {
    async fn get_session(&self, hostname: &str) -> FoundryResult<String> {
        Ok(format!("sid-{hostname}"))
    }

    async fn authenticate(&self, _hostname: &str, _session_id: &str, _credential: &Credential) -> FoundryResult<bool> {
        Ok(true)
    }
}

/// Every opened socket is answered by a [`serve_foundry`] task over `world`.
#[derive(Debug)]
pub struct ScriptedConnector {
    world: Value,
    opened: Mutex<Vec<String>>,
}

impl ScriptedConnector {
    pub fn new(world: Value) -> Self {
        Self {
            world,
            opened: Mutex::new(Vec::new()),
        }
    }

    /// URLs of the sockets opened so far.
    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().clone()
    }
}

#[async_trait]
impl SocketConnector for ScriptedConnector {
    async fn open(&self, url: &str) -> FoundryResult<OpenedSocket> {
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        self.opened.lock().push(url.to_string());
        tokio::spawn(serve_foundry(self.world.clone(), out_rx, event_tx));
        Ok(OpenedSocket {
            handle: SocketHandle::new(out_tx),
            events: event_rx,
        })
    }
}

/// `(ack id, payload array)` of a `42<id>[...]` frame.
fn parse_event(text: &str) -> Option<(u64, Value)> {
    let rest = text.strip_prefix("42")?;
    let start = rest.find('[')?;
    let id = rest[..start].parse().ok()?;
    let payload = serde_json::from_str(&rest[start..]).ok()?;
    Some((id, payload))
}

fn answer(world: &Value, payload: &Value) -> Option<Value> {
    let body = &payload[1];
    match payload[0].as_str()? {
        "world" => Some(world.clone()),
        "modifyDocument" => {
            let operation = &body["operation"];
            let result = match body["action"].as_str()? {
                "update" => operation["updates"].clone(),
                "create" => operation["data"].clone(),
                "delete" => operation["ids"].clone(),
                _ => return None,
            };
            Some(json!({"type": body["type"], "action": body["action"], "result": result}))
        }
        "manageFiles" => Some(json!({
            "target": body["target"],
            "dirs": [format!("{}/tokens", body["target"].as_str().unwrap_or_default())],
            "files": [format!("{}/map.webp", body["target"].as_str().unwrap_or_default())],
        })),
        "manageCompendium" => Some(json!({
            "request": body,
            "result": [{"label": body["data"]["label"], "id": "world.my-npcs"}],
        })),
        _ => None,
    }
}

/// Answers world, document, file and compendium requests until the client
/// closes the socket.
async fn serve_foundry(
    world: Value,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    events: mpsc::UnboundedSender<SocketEvent>,
) {
    while let Some(Outbound::Text(text)) = outbound.recv().await {
        let Some((id, payload)) = parse_event(&text) else {
            continue;
        };
        if let Some(reply) = answer(&world, &payload) {
            let _ = events.send(SocketEvent::Frame(format!("43{id}{}", json!([reply]))));
        }
    }
}

pub fn credential(id: &str, host: &str) -> Credential {
    Credential {
        id: id.to_string(),
        hostname: host.to_string(),
        userid: "gamemaster".into(),
        password: "hunter2".into(),
    }
}

pub fn sample_world() -> Value {
    json!({
        "title": "Lost Mine",
        "system": "dnd5e",
        "actors": [
            {"_id": "a1", "name": "Goblin", "type": "npc", "folder": "f1", "hp": 7},
            {"_id": "a2", "name": "Hero", "type": "character", "folder": "f1", "hp": 30},
            {"_id": "a3", "name": "Orc", "type": "npc", "folder": "f2", "hp": 15}
        ],
        "items": [{"_id": "i1", "name": "Dagger"}],
        "journal": [{"_id": "j1", "name": "Session Zero"}],
        "scenes": []
    })
}

pub fn client_over(world: Value, hosts: &[(&str, &str)]) -> (FoundryClient, Arc<ScriptedConnector>) {
    let connector = Arc::new(ScriptedConnector::new(world));
    let store = CredentialStore::from_credentials(hosts.iter().map(|(id, host)| credential(id, host)).collect());
    let client = FoundryClient::builder()
        .with_negotiator(Arc::new(AcceptingNegotiator))
        .with_connector(connector.clone())
        .with_clock(Arc::new(FixedClock(1_700_000_000_000)))
        .with_credentials(store)
        .build()
        .expect("client builds");
    (client, connector)
}

/// A server whose client is connected to the first of `hosts`.
pub async fn connected_server(world: Value, hosts: &[(&str, &str)]) -> (Arc<McpServer>, Arc<ScriptedConnector>) {
    let (client, connector) = client_over(world, hosts);
    tokio::time::timeout(Duration::from_secs(5), client.connect())
        .await
        .expect("connect does not hang")
        .expect("connects");
    (Arc::new(McpServer::new(ToolDispatcher::new(client))), connector)
}

/// Calls `name` through the JSON-RPC front end; `(is_error, text)`.
pub async fn call_tool(server: &McpServer, name: &str, arguments: Value) -> (bool, String) {
    let request = json!({
        "jsonrpc": "2.0",
        "id": 7,
        "method": "tools/call",
        "params": {"name": name, "arguments": arguments},
    });
    let response = server
        .handle_line(&request.to_string())
        .await
        .expect("requests get a response");
    let result = response.as_result().expect("tool calls succeed at the protocol level");
    let is_error = result.get("isError").and_then(Value::as_bool).unwrap_or(false);
    let text = result["content"][0]["text"].as_str().unwrap_or_default().to_string();
    (is_error, text)
}
