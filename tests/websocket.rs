//! End-to-end test over a real WebSocket connection

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use chat_session::{ChatServer, Config};

type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

async fn start_server() -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(ChatServer::new(&Config::default()).run(listener));
    format!("ws://{}", addr)
}

async fn send(client: &mut Client, value: Value) {
    client
        .send(Message::Text(value.to_string().into()))
        .await
        .unwrap();
}

/// Read frames until one of the given type arrives
async fn expect(client: &mut Client, kind: &str) -> Value {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let frame = client.next().await.unwrap().unwrap();
            if let Message::Text(text) = frame {
                let value: Value = serde_json::from_str(&text).unwrap();
                if value["type"] == kind {
                    return value;
                }
            }
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {}", kind))
}

/// Read state pushes until one satisfies `pred`
async fn expect_state<F>(client: &mut Client, pred: F) -> Value
where
    F: Fn(&Value) -> bool,
{
    loop {
        let msg = expect(client, "state").await;
        if pred(&msg["state"]) {
            return msg["state"].clone();
        }
    }
}

async fn login(url: &str, name: &str) -> (Client, String) {
    let (mut client, _) = connect_async(url).await.unwrap();
    expect(&mut client, "connected").await;
    send(&mut client, json!({"type": "login", "display_name": name})).await;
    let reply = expect(&mut client, "logged_in").await;
    let id = reply["user"]["id"].as_str().unwrap().to_string();
    (client, id)
}

#[tokio::test]
async fn direct_message_and_call_over_websocket() {
    let url = start_server().await;
    let (mut alice, alice_id) = login(&url, "Alice").await;
    let (mut bob, bob_id) = login(&url, "Bob").await;

    send(&mut alice, json!({"type": "change_room", "target": bob_id})).await;
    send(&mut alice, json!({"type": "send_message", "text": "hi"})).await;
    let sent = expect(&mut alice, "message_sent").await;
    assert_eq!(sent["message"]["body"], "hi");
    assert_eq!(sent["message"]["sender_id"], alice_id.as_str());

    send(&mut bob, json!({"type": "change_room", "target": alice_id})).await;
    let state = expect_state(&mut bob, |s| s["messages"].as_array().is_some_and(|m| !m.is_empty())).await;
    assert_eq!(state["messages"].as_array().unwrap().len(), 1);
    assert_eq!(state["messages"][0]["body"], "hi");
    assert_eq!(state["active_conversation"]["title"], "Alice");

    send(&mut alice, json!({"type": "start_call", "is_video": false})).await;
    let ringing = expect(&mut alice, "call_updated").await;
    assert_eq!(ringing["call"]["state"], "ringing");

    expect_state(&mut bob, |s| s["call_state"] == "ringing").await;
    send(&mut bob, json!({"type": "respond_to_call", "accept": true})).await;
    let connected = expect(&mut bob, "call_updated").await;
    assert_eq!(connected["call"]["state"], "connected");

    expect_state(&mut alice, |s| s["call_state"] == "connected").await;
    send(&mut alice, json!({"type": "hang_up"})).await;
    let ended = expect(&mut alice, "call_updated").await;
    assert_eq!(ended["call"]["state"], "ended");
}

#[tokio::test]
async fn errors_come_back_as_messages() {
    let url = start_server().await;
    let (mut alice, _) = login(&url, "Alice").await;

    send(&mut alice, json!({"type": "start_call", "is_video": true})).await;
    let err = expect(&mut alice, "error").await;
    assert_eq!(err["code"], "call_not_supported");

    send(&mut alice, json!({"type": "send_message", "text": "   "})).await;
    let err = expect(&mut alice, "error").await;
    assert_eq!(err["code"], "empty_body");

    alice
        .send(Message::Text("not json".to_string().into()))
        .await
        .unwrap();
    let err = expect(&mut alice, "error").await;
    assert_eq!(err["code"], "invalid_message");
}

#[tokio::test]
async fn disconnect_marks_user_offline() {
    let url = start_server().await;
    let (mut alice, _) = login(&url, "Alice").await;
    let (bob, bob_id) = login(&url, "Bob").await;

    drop(bob);

    let state = expect_state(&mut alice, |s| {
        s["users"]
            .as_array()
            .into_iter()
            .flatten()
            .any(|u| u["id"] == bob_id.as_str() && u["status"] == "offline")
    })
    .await;
    assert_eq!(state["current_user"]["display_name"], "Alice");
}

#[tokio::test]
async fn close_handshake_completes_after_commands() {
    let url = start_server().await;
    let (mut alice, _) = login(&url, "Alice").await;

    send(&mut alice, json!({"type": "search_users", "term": "bob"})).await;
    alice.close(None).await.unwrap();

    // The server answers with its own close frame, then the stream ends cleanly
    let saw_close = tokio::time::timeout(Duration::from_secs(5), async {
        let mut saw_close = false;
        while let Some(frame) = alice.next().await {
            if let Message::Close(_) = frame.unwrap() {
                saw_close = true;
            }
        }
        saw_close
    })
    .await
    .expect("connection did not close");
    assert!(saw_close);
}

#[tokio::test]
async fn second_connection_with_same_name_keeps_user_online() {
    let url = start_server().await;
    let (mut alice, alice_id) = login(&url, "Alice").await;
    let (second_tab, same_id) = login(&url, "Alice").await;
    let (mut bob, _) = login(&url, "Bob").await;
    assert_eq!(alice_id, same_id);

    drop(second_tab);

    // Bob sends a message so a fresh state reaches him after the drop
    tokio::time::sleep(Duration::from_millis(200)).await;
    send(&mut bob, json!({"type": "send_message", "text": "still there?"})).await;
    let state = expect_state(&mut bob, |s| {
        s["messages"]
            .as_array()
            .is_some_and(|m| m.iter().any(|msg| msg["body"] == "still there?"))
    })
    .await;
    let alice_entry = state["users"]
        .as_array()
        .unwrap()
        .iter()
        .find(|u| u["id"] == alice_id.as_str())
        .unwrap();
    assert_eq!(alice_entry["status"], "online");

    send(&mut alice, json!({"type": "get_state"})).await;
    let own = expect(&mut alice, "state").await;
    assert_eq!(own["state"]["current_user"]["status"], "online");
}
