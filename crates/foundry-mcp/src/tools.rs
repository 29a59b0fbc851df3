//! Tool catalogue advertised through `tools/list`
//!
//! Every world collection gets a list tool (`get_<plural>`) and a lookup tool
//! (`get_<singular>`); the remaining tools map one to one onto client
//! operations.

use serde::Serialize;
use serde_json::{Value, json};

/// A world collection exposed as a pair of read tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DocumentType {
    /// Name used by the lookup tool, e.g. `actor`
    pub singular: &'static str,
    /// Name used by the list tool, e.g. `actors`
    pub plural: &'static str,
    /// Key of the array in the world snapshot
    pub collection: &'static str,
    /// Human readable noun for messages
    pub description: &'static str,
}

impl DocumentType {
    const fn new(
        singular: &'static str,
        plural: &'static str,
        collection: &'static str,
        description: &'static str,
    ) -> Self {
        Self {
            singular,
            plural,
            collection,
            description,
        }
    }

    /// `get_<plural>`
    pub fn list_tool_name(&self) -> String {
        format!("get_{}", self.plural)
    }

    /// `get_<singular>`
    pub fn get_tool_name(&self) -> String {
        format!("get_{}", self.singular)
    }

    /// `"<Description> not found"`, returned when a lookup matches nothing.
    pub fn not_found_message(&self) -> String {
        format!("{} not found", capitalize(self.description))
    }
}

/// Collections read from the world snapshot.
pub const DOCUMENT_TYPES: &[DocumentType] = &[
    DocumentType::new("actor", "actors", "actors", "actor"),
    DocumentType::new("item", "items", "items", "item"),
    DocumentType::new("folder", "folders", "folders", "folder"),
    DocumentType::new("user", "users", "users", "user"),
    DocumentType::new("scene", "scenes", "scenes", "scene"),
    DocumentType::new("journal", "journals", "journal", "journal entry"),
    DocumentType::new("macro", "macros", "macros", "macro"),
    DocumentType::new("card", "cards", "cards", "card"),
    DocumentType::new("playlist", "playlists", "playlists", "playlist"),
    DocumentType::new("table", "tables", "tables", "table"),
    DocumentType::new("combat", "combats", "combats", "combats"),
    DocumentType::new("message", "messages", "messages", "messages"),
    DocumentType::new("setting", "settings", "settings", "settings"),
];

/// Collection keys stripped from `get_world`.
pub fn collection_keys() -> Vec<&'static str> {
    DOCUMENT_TYPES.iter().map(|t| t.collection).collect()
}

/// One entry of the `tools/list` result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolDefinition {
    /// Tool name
    pub name: String,
    /// What the tool does
    pub description: String,
    /// JSON schema of the arguments object
    #[serde(rename = "inputSchema")]
    pub input_schema: Value,
}

impl ToolDefinition {
    fn new(name: impl Into<String>, description: impl Into<String>, input_schema: Value) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            input_schema,
        }
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn object_schema(properties: Value, required: &[&str]) -> Value {
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}

const DOCUMENT_CLASSES: &str = r#"Valid types include: "Actor", "Item", "Scene", "JournalEntry", "Folder", "User", "Playlist", "Macro", "RollTable", "Cards", "ChatMessage", "Combat", "Combatant", "ActiveEffect", "Drawing", "MeasuredTemplate", "Note", "Tile", "Token", "Wall", "AmbientLight", "AmbientSound". The type must match Foundry's internal document class name (case-sensitive)."#;

const PARENT_FORMAT: &str = r#"Format: "{ParentType}.{parentId}" (e.g., "Scene.vrKkbtn8u66mv1Y9")."#;

fn list_tool(doc: &DocumentType) -> ToolDefinition {
    let plural = doc.plural;
    ToolDefinition::new(
        doc.list_tool_name(),
        format!("Get all {plural} from FoundryVTT"),
        object_schema(
            json!({
                "max_length": {
                    "type": "integer",
                    "description": format!(
                        "Maximum number of bytes the JSON response can be. {} are removed one by one until under this limit. If 0, undefined, or null, there is no limit.",
                        capitalize(plural)
                    ),
                },
                "requested_fields": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": format!(
                        "Array of field names to include in each {} object. Always includes _id and name. If empty, undefined, or null, all fields are included.",
                        doc.description
                    ),
                },
                "where": {
                    "type": "object",
                    "additionalProperties": true,
                    "description": format!(
                        "Filter {plural} by field values. Provide key-value pairs to match. All conditions must match (AND logic). Example: {{\"folder\": \"abc123\"}} returns only {plural} in that folder. Example: {{\"folder\": \"abc123\", \"type\": \"npc\"}} returns only {plural} matching both conditions."
                    ),
                },
            }),
            &[],
        ),
    )
}

fn get_tool(doc: &DocumentType) -> ToolDefinition {
    let noun = doc.description;
    ToolDefinition::new(
        doc.get_tool_name(),
        format!("Get a specific {noun} from FoundryVTT by id, _id, or name"),
        object_schema(
            json!({
                "id": {"type": "string", "description": format!("The id of the {noun} to retrieve")},
                "_id": {"type": "string", "description": format!("The _id of the {noun} to retrieve")},
                "name": {"type": "string", "description": format!("The name of the {noun} to retrieve")},
                "requested_fields": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": format!(
                        "Array of field names to include in the {noun} object. Always includes _id and name. If empty, undefined, or null, all fields are included."
                    ),
                },
            }),
            &[],
        ),
    )
}

fn get_world_tool() -> ToolDefinition {
    ToolDefinition::new(
        "get_world",
        "Get world metadata from FoundryVTT. Returns information about the world such as title, system, version, and other metadata. This excludes document collections (actors, items, scenes, etc.); use the specific get_* tools for those.",
        object_schema(json!({}), &[]),
    )
}

fn modify_document_tool() -> ToolDefinition {
    ToolDefinition::new(
        "modify_document",
        "Modify a document in FoundryVTT. IMPORTANT: Before using this tool, you should first retrieve the document using the appropriate get_* tool (e.g., get_actor, get_item) to understand its current structure and field names. Document schemas vary by game system, so inspecting the document first ensures you use the correct field paths in your updates.",
        object_schema(
            json!({
                "type": {
                    "type": "string",
                    "description": format!("The document type to modify. {DOCUMENT_CLASSES}"),
                },
                "_id": {
                    "type": "string",
                    "description": "The _id of the document to modify. This is the unique identifier for the document in FoundryVTT.",
                },
                "updates": {
                    "type": "array",
                    "items": {"type": "object", "additionalProperties": true},
                    "description": "An array of update objects to apply to the document. Each update object should contain the fields you want to modify, using nested objects to represent the document structure. The _id will be automatically added to each update object.\n\nExample: To update an Actor's strength attribute, you might use:\n[{ \"system\": { \"attributes_physical\": { \"strength\": { \"value\": 5 } } } }]\n\nExample: To update an Item's description and quantity:\n[{ \"system\": { \"description\": \"A shiny sword\", \"quantity\": 2 } }]\n\nThe exact field structure depends on the game system. Use the get_* tools first to inspect the document's current structure and determine the correct field paths.",
                },
                "parent_uuid": {
                    "type": "string",
                    "description": format!("Optional. The UUID of the parent document for embedded documents. Required when modifying embedded documents like Drawings, Tokens, Tiles, Walls, etc. that exist within a parent document (e.g., a Scene). {PARENT_FORMAT}"),
                },
                "pack": {
                    "type": "string",
                    "description": "Optional. The compendium pack ID containing the document to modify (e.g., \"world.my-compendium\"). If not provided, modifies a world document. Use this to update documents within a compendium.",
                },
            }),
            &["type", "_id", "updates"],
        ),
    )
}

fn create_document_tool() -> ToolDefinition {
    ToolDefinition::new(
        "create_document",
        "Create a new document in FoundryVTT. IMPORTANT: Before using this tool, you should first retrieve an existing document of the same type using the appropriate get_* tool (e.g., get_actor, get_item) to understand the expected schema and field structure. Document schemas vary significantly by game system, so inspecting an existing document first ensures you provide the correct fields when creating a new one.",
        object_schema(
            json!({
                "type": {
                    "type": "string",
                    "description": format!("The document type to create. {DOCUMENT_CLASSES}"),
                },
                "data": {
                    "type": "array",
                    "items": {"type": "object", "additionalProperties": true},
                    "description": "An array of data objects defining the new documents to create. Each object should contain all required fields for the document type. At minimum, most documents require a \"name\" field.\n\nExample: To create a simple Item:\n[{ \"name\": \"Healing Potion\", \"type\": \"consumable\" }]\n\nExample: To create an Actor with some system data:\n[{ \"name\": \"Goblin\", \"type\": \"npc\", \"system\": { \"attributes\": { \"hp\": { \"value\": 10, \"max\": 10 } } } }]\n\nThe exact field structure depends on the game system. Use the get_* tools first to retrieve an existing document of the same type to understand the expected schema.",
                },
                "parent_uuid": {
                    "type": "string",
                    "description": format!("Optional. The UUID of the parent document for embedded documents. Required when creating embedded documents like Drawings, Tokens, Tiles, Walls, etc. within a parent document (e.g., a Scene). {PARENT_FORMAT}"),
                },
                "pack": {
                    "type": "string",
                    "description": "Optional. The compendium pack ID to create the document in (e.g., \"world.my-compendium\"). If not provided, the document is created in the world. Use this to add documents directly to a compendium.",
                },
            }),
            &["type", "data"],
        ),
    )
}

fn delete_document_tool() -> ToolDefinition {
    ToolDefinition::new(
        "delete_document",
        "Delete one or more documents in FoundryVTT. This action is permanent and cannot be undone. Use with caution.",
        object_schema(
            json!({
                "type": {
                    "type": "string",
                    "description": format!("The document type to delete. {DOCUMENT_CLASSES}"),
                },
                "ids": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": "An array of document _ids to delete. Each _id is the unique identifier for a document in FoundryVTT.\n\nExample: To delete a single document:\n[\"vlcf6AI5FaE9qjgJ\"]\n\nExample: To delete multiple documents:\n[\"vlcf6AI5FaE9qjgJ\", \"abc123def456\", \"xyz789ghi012\"]",
                },
                "parent_uuid": {
                    "type": "string",
                    "description": format!("Optional. The UUID of the parent document for embedded documents. Required when deleting embedded documents like Drawings, Tokens, Tiles, Walls, etc. from a parent document (e.g., a Scene). {PARENT_FORMAT}"),
                },
                "pack": {
                    "type": "string",
                    "description": "Optional. The compendium pack ID containing the documents to delete (e.g., \"world.my-compendium\"). If not provided, deletes world documents. Use this to remove documents from a compendium.",
                },
            }),
            &["type", "ids"],
        ),
    )
}

fn show_credentials_tool() -> ToolDefinition {
    ToolDefinition::new(
        "show_credentials",
        "Show all configured Foundry credentials without revealing passwords. Returns the _id, hostname, userid, item_order (zero-based index), and currently_active status for each credential entry. Use this to see which Foundry instances are available and which one is currently connected.",
        object_schema(json!({}), &[]),
    )
}

fn choose_instance_tool() -> ToolDefinition {
    ToolDefinition::new(
        "choose_foundry_instance",
        "Switch to a different Foundry instance. Disconnects from the current instance (if any) and connects to the specified one. You can identify the instance either by item_order (zero-based index) or by _id (the name of the credential entry). Use show_credentials first to see available instances.",
        object_schema(
            json!({
                "item_order": {
                    "type": "integer",
                    "description": "The zero-based index of the credential in the foundry_credentials.json array. Use show_credentials to see the item_order for each instance.",
                },
                "_id": {
                    "type": "string",
                    "description": "The _id (name) of the credential entry. This is the user-defined identifier in the foundry_credentials.json file.",
                },
            }),
            &[],
        ),
    )
}

fn upload_file_tool() -> ToolDefinition {
    ToolDefinition::new(
        "upload_file",
        "Upload a file to FoundryVTT. You must provide EXACTLY ONE of 'url' or 'image_data'. If you provide both or neither, the request will fail.\n\n- Use 'url' to download and upload a file from a remote URL (e.g., an image URL from the web)\n- Use 'image_data' to upload base64-encoded file content directly\n\nThe file will be uploaded to the specified target directory in FoundryVTT's data storage.",
        object_schema(
            json!({
                "target": {
                    "type": "string",
                    "description": "The target directory path in FoundryVTT where the file should be uploaded. Example: \"worlds/myworld/assets/avatars\" or \"worlds/myworld/assets/scenes\"",
                },
                "filename": {
                    "type": "string",
                    "description": "The filename to use for the uploaded file (including extension). Example: \"goblin-avatar.png\"",
                },
                "url": {
                    "type": "string",
                    "description": "URL to download the file from. The file will be downloaded and then uploaded to FoundryVTT. Cannot be used together with 'image_data'.",
                },
                "image_data": {
                    "type": "string",
                    "description": "Base64-encoded file content to upload. Cannot be used together with 'url'.",
                },
            }),
            &["target", "filename"],
        ),
    )
}

fn browse_files_tool() -> ToolDefinition {
    ToolDefinition::new(
        "browse_files",
        "Browse files and directories in FoundryVTT's file system. Returns a listing of directories and files at the specified target path, filtered by file type.",
        object_schema(
            json!({
                "target": {
                    "type": "string",
                    "description": "The target directory path to browse. Example: \"worlds/myworld/assets\" or \"worlds/myworld/assets/avatars\"",
                },
                "type": {
                    "type": "string",
                    "description": "The file type filter. Defaults to \"image\". Common values: \"image\", \"audio\", \"video\", \"text\"",
                },
                "extensions": {
                    "type": "array",
                    "items": {"type": "string"},
                    "description": format!(
                        "Array of file extensions to filter (with leading dot). Defaults to common image extensions: {:?}",
                        foundry_client::client::operations::DEFAULT_IMAGE_EXTENSIONS
                    ),
                },
            }),
            &["target"],
        ),
    )
}

fn create_compendium_tool() -> ToolDefinition {
    ToolDefinition::new(
        "create_compendium",
        "Create a new Compendium pack in FoundryVTT. Compendia are collections of documents (Actors, Items, Scenes, etc.) that can be used for organizing and sharing content. The compendium will be created in the current world.",
        object_schema(
            json!({
                "label": {
                    "type": "string",
                    "description": "The display label for the compendium (e.g., \"My NPCs\", \"Custom Items\"). This is what users see in the UI.",
                },
                "type": {
                    "type": "string",
                    "description": "The document type this compendium will contain. Valid types: \"Actor\", \"Item\", \"Scene\", \"JournalEntry\", \"Macro\", \"Playlist\", \"RollTable\", \"Cards\", \"Adventure\". All documents in a compendium must be of the same type.",
                },
            }),
            &["label", "type"],
        ),
    )
}

fn delete_compendium_tool() -> ToolDefinition {
    ToolDefinition::new(
        "delete_compendium",
        "Delete a Compendium pack from FoundryVTT. This permanently removes the compendium and all documents it contains. Use with caution.",
        object_schema(
            json!({
                "name": {
                    "type": "string",
                    "description": "The name (not label) of the compendium to delete. This is the lowercase, slugified version of the label (e.g., \"my-npcs\" for a compendium labeled \"My NPCs\"). You can find this in the compendium's \"id\" field (e.g., \"world.my-npcs\" has name \"my-npcs\").",
                },
            }),
            &["name"],
        ),
    )
}

/// Every tool, collection tools first.
pub fn tool_definitions() -> Vec<ToolDefinition> {
    DOCUMENT_TYPES
        .iter()
        .flat_map(|doc| [list_tool(doc), get_tool(doc)])
        .chain([
            get_world_tool(),
            modify_document_tool(),
            create_document_tool(),
            delete_document_tool(),
            show_credentials_tool(),
            choose_instance_tool(),
            upload_file_tool(),
            browse_files_tool(),
            create_compendium_tool(),
            delete_compendium_tool(),
        ])
        .collect()
}
