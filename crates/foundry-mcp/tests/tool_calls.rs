//! Tool calls against a scripted Foundry peer.

mod common;

use common::{call_tool, connected_server, sample_world};
use pretty_assertions::assert_eq;
use serde_json::{Value, json};

const HOME: &[(&str, &str)] = &[("home", "vtt.example.com")];

fn parsed(text: &str) -> Value {
    serde_json::from_str(text).unwrap_or_else(|e| panic!("{text:?} is not JSON: {e}"))
}

#[tokio::test]
async fn list_tool_filters_projects_and_truncates() {
    let (server, _) = connected_server(sample_world(), HOME).await;

    let (is_error, text) = call_tool(
        &server,
        "get_actors",
        json!({"where": {"type": "npc"}, "requested_fields": ["hp"]}),
    )
    .await;
    assert!(!is_error, "{text}");
    assert_eq!(
        parsed(&text),
        json!([
            {"hp": 7, "_id": "a1", "name": "Goblin"},
            {"hp": 15, "_id": "a3", "name": "Orc"}
        ])
    );

    let one_doc = serde_json::to_string(&json!([{"_id": "a1", "name": "Goblin"}])).unwrap();
    let (_, text) = call_tool(
        &server,
        "get_actors",
        json!({"requested_fields": ["_id"], "max_length": one_doc.len()}),
    )
    .await;
    assert_eq!(parsed(&text), json!([{"_id": "a1", "name": "Goblin"}]));
}

#[tokio::test]
async fn journal_tools_read_the_journal_collection() {
    let (server, _) = connected_server(sample_world(), HOME).await;

    let (_, text) = call_tool(&server, "get_journals", json!({})).await;
    assert_eq!(parsed(&text), json!([{"_id": "j1", "name": "Session Zero"}]));

    let (is_error, text) = call_tool(&server, "get_journal", json!({"name": "Nope"})).await;
    assert!(!is_error);
    assert_eq!(text, "Journal entry not found");
}

#[tokio::test]
async fn get_tool_needs_an_identifier() {
    let (server, _) = connected_server(sample_world(), HOME).await;

    let (is_error, text) = call_tool(&server, "get_actor", json!({})).await;
    assert!(is_error);
    assert_eq!(text, "Error: Must provide at least one of: id, _id, or name");

    let (is_error, text) = call_tool(&server, "get_actor", json!({"id": "a2", "requested_fields": ["hp"]})).await;
    assert!(!is_error);
    assert_eq!(parsed(&text), json!({"hp": 30, "_id": "a2", "name": "Hero"}));
}

#[tokio::test]
async fn missing_collection_is_reported_as_a_fetch_error() {
    let (server, _) = connected_server(sample_world(), HOME).await;
    let (is_error, text) = call_tool(&server, "get_macros", json!({})).await;
    assert!(is_error);
    assert_eq!(text, "Error fetching macros: Response does not contain macros array");
}

#[tokio::test]
async fn world_tool_strips_collections() {
    let (server, _) = connected_server(sample_world(), HOME).await;
    let (_, text) = call_tool(&server, "get_world", json!({})).await;
    assert_eq!(parsed(&text), json!({"title": "Lost Mine", "system": "dnd5e"}));
}

#[tokio::test]
async fn document_mutations_return_the_ack() {
    let (server, _) = connected_server(sample_world(), HOME).await;

    let (is_error, text) = call_tool(
        &server,
        "modify_document",
        json!({"type": "Actor", "_id": "a1", "updates": [{"name": "Goblin Boss"}]}),
    )
    .await;
    assert!(!is_error, "{text}");
    let ack = parsed(&text);
    assert_eq!(ack["action"], "update");
    assert_eq!(ack["result"], json!([{"name": "Goblin Boss", "_id": "a1"}]));

    let (_, text) = call_tool(
        &server,
        "create_document",
        json!({"type": "Item", "data": [{"name": "Potion"}], "pack": "world.loot"}),
    )
    .await;
    assert_eq!(parsed(&text)["result"], json!([{"name": "Potion"}]));

    let (_, text) = call_tool(&server, "delete_document", json!({"type": "Item", "ids": ["i1"]})).await;
    assert_eq!(parsed(&text)["result"], json!(["i1"]));
}

#[tokio::test]
async fn document_arguments_are_validated() {
    let (server, _) = connected_server(sample_world(), HOME).await;

    let cases = [
        ("modify_document", json!({"_id": "a1", "updates": []}), "Error: 'type' is required"),
        ("modify_document", json!({"type": "Actor", "updates": []}), "Error: '_id' is required"),
        (
            "modify_document",
            json!({"type": "Actor", "_id": "a1", "updates": {"name": "x"}}),
            "Error: 'updates' must be an array of objects",
        ),
        ("create_document", json!({"type": "Actor"}), "Error: 'data' must be an array of objects"),
        (
            "delete_document",
            json!({"type": "Actor", "ids": []}),
            "Error: 'ids' must be a non-empty array of strings",
        ),
    ];
    for (tool, arguments, expected) in cases {
        let (is_error, text) = call_tool(&server, tool, arguments).await;
        assert!(is_error, "{tool}");
        assert_eq!(text, expected);
    }
}

#[tokio::test]
async fn file_and_compendium_tools() {
    let (server, _) = connected_server(sample_world(), HOME).await;

    let (is_error, text) = call_tool(&server, "browse_files", json!({"target": "worlds/w/assets"})).await;
    assert!(!is_error, "{text}");
    let listing = parsed(&text);
    assert_eq!(listing["dirs"], json!(["worlds/w/assets/tokens"]));
    assert_eq!(listing["files"], json!(["worlds/w/assets/map.webp"]));

    let (is_error, text) = call_tool(&server, "browse_files", json!({})).await;
    assert!(is_error);
    assert_eq!(text, "Error: 'target' is required");

    let (is_error, text) = call_tool(
        &server,
        "upload_file",
        json!({"target": "a", "filename": "b.png", "url": "https://x/y.png", "image_data": "aGk="}),
    )
    .await;
    assert!(is_error);
    assert_eq!(
        text,
        "Error uploading file: Cannot provide both 'url' and 'image_data'. Please provide exactly one."
    );

    let (_, text) = call_tool(&server, "create_compendium", json!({"label": "My NPCs", "type": "Actor"})).await;
    assert_eq!(parsed(&text)["request"]["data"], json!({"label": "My NPCs", "type": "Actor"}));

    let (is_error, text) = call_tool(&server, "delete_compendium", json!({})).await;
    assert!(is_error);
    assert_eq!(text, "Error: 'name' is required");
}

#[tokio::test]
async fn choose_instance_switches_and_show_credentials_follows() {
    let hosts = &[("home", "vtt.example.com"), ("club", "club.example.org")];
    let (server, connector) = connected_server(sample_world(), hosts).await;

    let (is_error, text) = call_tool(&server, "choose_foundry_instance", json!({"_id": "club"})).await;
    assert!(!is_error, "{text}");
    assert_eq!(
        parsed(&text),
        json!({
            "success": true,
            "message": "Successfully connected to club.example.org",
            "hostname": "club.example.org"
        })
    );
    assert_eq!(connector.opened().len(), 2);
    assert!(connector.opened()[1].starts_with("wss://club.example.org/socket.io/"));

    let (_, text) = call_tool(&server, "show_credentials", json!({})).await;
    let active: Vec<bool> = parsed(&text)
        .as_array()
        .unwrap()
        .iter()
        .map(|c| c["currently_active"].as_bool().unwrap())
        .collect();
    assert_eq!(active, vec![false, true]);

    let (_, text) = call_tool(&server, "get_actor", json!({"_id": "a3"})).await;
    assert_eq!(parsed(&text)["name"], "Orc");
}
