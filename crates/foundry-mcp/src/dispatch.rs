//! `tools/call` routing
//!
//! Validation problems and client failures never fail the JSON-RPC request;
//! they come back as tool results with `isError: true` so the model can read
//! and react to them.

use foundry_client::{
    BrowseRequest, DocumentLookup, DocumentOptions, DocumentQuery, FoundryClient, FoundryError,
    Selector,
};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use tracing::{debug, warn};

use crate::error::{ServerError, ServerResult};
use crate::tools::{DOCUMENT_TYPES, DocumentType, collection_keys};

/// Result text for connection-bound tools while disconnected.
pub const NOT_CONNECTED: &str = "Error: Not connected to FoundryVTT server";

/// A text content block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextContent {
    #[serde(rename = "type")]
    kind: &'static str,
    /// The text
    pub text: String,
}

/// Result of one `tools/call`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolResult {
    /// Content blocks; always a single text block here
    pub content: Vec<TextContent>,
    /// Set when the tool failed
    #[serde(rename = "isError", skip_serializing_if = "std::ops::Not::not")]
    pub is_error: bool,
}

impl ToolResult {
    /// Plain text success.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![TextContent {
                kind: "text",
                text: text.into(),
            }],
            is_error: false,
        }
    }

    /// Failure with `text` as the message.
    pub fn error(text: impl Into<String>) -> Self {
        Self {
            is_error: true,
            ..Self::text(text)
        }
    }

    /// `value` encoded as JSON text.
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Self {
        match serde_json::to_string(value) {
            Ok(text) => Self::text(text),
            Err(e) => Self::error(format!("Error encoding result: {e}")),
        }
    }

    /// Text of the first content block.
    pub fn text_content(&self) -> &str {
        self.content.first().map(|c| c.text.as_str()).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tool {
    List(&'static DocumentType),
    Get(&'static DocumentType),
    GetWorld,
    ModifyDocument,
    CreateDocument,
    DeleteDocument,
    ShowCredentials,
    ChooseInstance,
    UploadFile,
    BrowseFiles,
    CreateCompendium,
    DeleteCompendium,
}

impl Tool {
    fn from_name(name: &str) -> Option<Self> {
        if let Some(doc) = DOCUMENT_TYPES.iter().find(|d| d.list_tool_name() == name) {
            return Some(Self::List(doc));
        }
        if let Some(doc) = DOCUMENT_TYPES.iter().find(|d| d.get_tool_name() == name) {
            return Some(Self::Get(doc));
        }
        let tool = match name {
            "get_world" => Self::GetWorld,
            "modify_document" => Self::ModifyDocument,
            "create_document" => Self::CreateDocument,
            "delete_document" => Self::DeleteDocument,
            "show_credentials" => Self::ShowCredentials,
            "choose_foundry_instance" => Self::ChooseInstance,
            "upload_file" => Self::UploadFile,
            "browse_files" => Self::BrowseFiles,
            "create_compendium" => Self::CreateCompendium,
            "delete_compendium" => Self::DeleteCompendium,
            _ => return None,
        };
        Some(tool)
    }

    fn needs_connection(self) -> bool {
        !matches!(self, Self::ShowCredentials | Self::ChooseInstance)
    }

    /// Gerund used in failure messages, e.g. `Error fetching actors: ...`.
    fn activity(self) -> String {
        match self {
            Self::List(doc) => format!("fetching {}", doc.plural),
            Self::Get(doc) => format!("fetching {}", doc.description),
            Self::GetWorld => "fetching world".into(),
            Self::ModifyDocument => "modifying document".into(),
            Self::CreateDocument => "creating document".into(),
            Self::DeleteDocument => "deleting document".into(),
            Self::ShowCredentials => "fetching credentials".into(),
            Self::ChooseInstance => "switching Foundry instance".into(),
            Self::UploadFile => "uploading file".into(),
            Self::BrowseFiles => "browsing files".into(),
            Self::CreateCompendium => "creating compendium".into(),
            Self::DeleteCompendium => "deleting compendium".into(),
        }
    }
}

enum ToolError {
    /// Rendered as `Error: <message>`
    Usage(String),
    /// Rendered as `Error <activity>: <error>`
    Failed(FoundryError),
}

impl From<FoundryError> for ToolError {
    fn from(error: FoundryError) -> Self {
        Self::Failed(error)
    }
}

type ToolOutcome = Result<ToolResult, ToolError>;

fn parse_args<T: DeserializeOwned>(arguments: Value) -> Result<T, ToolError> {
    serde_json::from_value(arguments).map_err(|e| ToolError::Usage(format!("Invalid arguments: {e}")))
}

fn required(value: Option<String>, name: &str) -> Result<String, ToolError> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| ToolError::Usage(format!("'{name}' is required")))
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

fn document_options(pack: Option<String>, parent_uuid: Option<String>) -> DocumentOptions {
    DocumentOptions {
        pack: non_empty(pack),
        parent_uuid: non_empty(parent_uuid),
    }
}

fn array_of_objects(value: Option<Value>, name: &str) -> Result<Vec<Value>, ToolError> {
    match value {
        Some(Value::Array(items)) if items.iter().all(Value::is_object) => Ok(items),
        _ => Err(ToolError::Usage(format!("'{name}' must be an array of objects"))),
    }
}

fn ids_from(value: Option<Value>) -> Result<Vec<String>, ToolError> {
    let invalid = || ToolError::Usage("'ids' must be a non-empty array of strings".into());
    match value {
        Some(Value::Array(items)) if !items.is_empty() => items
            .into_iter()
            .map(|item| match item {
                Value::String(id) => Some(id),
                _ => None,
            })
            .collect::<Option<Vec<_>>>()
            .ok_or_else(invalid),
        _ => Err(invalid()),
    }
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ListArgs {
    max_length: Option<i64>,
    requested_fields: Option<Vec<String>>,
    #[serde(rename = "where")]
    where_clause: Option<Map<String, Value>>,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct GetArgs {
    id: Option<String>,
    #[serde(rename = "_id")]
    underscore_id: Option<String>,
    name: Option<String>,
    requested_fields: Option<Vec<String>>,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct DocumentArgs {
    #[serde(rename = "type")]
    doc_type: Option<String>,
    #[serde(rename = "_id")]
    id: Option<String>,
    updates: Option<Value>,
    data: Option<Value>,
    ids: Option<Value>,
    parent_uuid: Option<String>,
    pack: Option<String>,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct ChooseArgs {
    item_order: Option<i64>,
    #[serde(rename = "_id")]
    id: Option<String>,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct UploadArgs {
    target: Option<String>,
    filename: Option<String>,
    url: Option<String>,
    image_data: Option<String>,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct BrowseArgs {
    target: Option<String>,
    #[serde(rename = "type")]
    file_type: Option<String>,
    extensions: Option<Vec<String>>,
}

#[derive(Debug, Default, serde::Deserialize)]
#[serde(default)]
struct CompendiumArgs {
    label: Option<String>,
    #[serde(rename = "type")]
    doc_type: Option<String>,
    name: Option<String>,
}

/// Routes tool calls to a [`FoundryClient`].
#[derive(Debug, Clone)]
pub struct ToolDispatcher {
    client: FoundryClient,
}

impl ToolDispatcher {
    /// Dispatcher over `client`.
    pub fn new(client: FoundryClient) -> Self {
        Self { client }
    }

    /// The underlying client.
    pub fn client(&self) -> &FoundryClient {
        &self.client
    }

    /// Runs tool `name` with `arguments`.
    ///
    /// # Errors
    ///
    /// [`ServerError::UnknownTool`] when no tool has that name. Everything
    /// else is reported inside the returned [`ToolResult`].
    pub async fn call(&self, name: &str, arguments: Option<Value>) -> ServerResult<ToolResult> {
        let tool = Tool::from_name(name).ok_or_else(|| ServerError::UnknownTool(name.to_string()))?;
        if tool.needs_connection() && !self.client.is_connected() {
            return Ok(ToolResult::error(NOT_CONNECTED));
        }

        let arguments = match arguments {
            None | Some(Value::Null) => Value::Object(Map::new()),
            Some(value) => value,
        };
        debug!(tool = name, "Calling tool");

        let outcome = match tool {
            Tool::List(doc) => self.list_documents(doc, arguments).await,
            Tool::Get(doc) => self.get_document(doc, arguments).await,
            Tool::GetWorld => self.get_world().await,
            Tool::ModifyDocument => self.modify_document(arguments).await,
            Tool::CreateDocument => self.create_document(arguments).await,
            Tool::DeleteDocument => self.delete_document(arguments).await,
            Tool::ShowCredentials => self.show_credentials(),
            Tool::ChooseInstance => self.choose_instance(arguments).await,
            Tool::UploadFile => self.upload_file(arguments).await,
            Tool::BrowseFiles => self.browse_files(arguments).await,
            Tool::CreateCompendium => self.create_compendium(arguments).await,
            Tool::DeleteCompendium => self.delete_compendium(arguments).await,
        };

        Ok(match outcome {
            Ok(result) => result,
            Err(ToolError::Usage(message)) => ToolResult::error(format!("Error: {message}")),
            Err(ToolError::Failed(error)) => {
                warn!(tool = name, %error, "Tool failed");
                ToolResult::error(format!("Error {}: {error}", tool.activity()))
            }
        })
    }

    async fn list_documents(&self, doc: &DocumentType, arguments: Value) -> ToolOutcome {
        let args: ListArgs = parse_args(arguments)?;
        let query = DocumentQuery {
            max_length: args
                .max_length
                .and_then(|n| usize::try_from(n).ok())
                .unwrap_or(0),
            requested_fields: args.requested_fields,
            where_clause: args.where_clause,
        };
        let docs = self.client.documents(doc.collection, &query).await?;
        Ok(ToolResult::json(&docs))
    }

    async fn get_document(&self, doc: &DocumentType, arguments: Value) -> ToolOutcome {
        let args: GetArgs = parse_args(arguments)?;
        let lookup = DocumentLookup::from_parts(args.id, args.underscore_id, args.name)
            .ok_or_else(|| ToolError::Usage("Must provide at least one of: id, _id, or name".into()))?;
        let found = self
            .client
            .document(doc.collection, &lookup, args.requested_fields.as_deref())
            .await?;
        Ok(match found {
            Some(document) => ToolResult::json(&document),
            None => ToolResult::text(doc.not_found_message()),
        })
    }

    async fn get_world(&self) -> ToolOutcome {
        let world = self.client.world(&collection_keys()).await?;
        Ok(ToolResult::json(&world))
    }

    async fn modify_document(&self, arguments: Value) -> ToolOutcome {
        let args: DocumentArgs = parse_args(arguments)?;
        let doc_type = required(args.doc_type, "type")?;
        let id = required(args.id, "_id")?;
        let updates = array_of_objects(args.updates, "updates")?;
        let options = document_options(args.pack, args.parent_uuid);
        let ack = self.client.modify_document(&doc_type, &id, updates, &options).await?;
        Ok(ToolResult::json(&ack))
    }

    async fn create_document(&self, arguments: Value) -> ToolOutcome {
        let args: DocumentArgs = parse_args(arguments)?;
        let doc_type = required(args.doc_type, "type")?;
        let data = array_of_objects(args.data, "data")?;
        let options = document_options(args.pack, args.parent_uuid);
        let ack = self.client.create_document(&doc_type, data, &options).await?;
        Ok(ToolResult::json(&ack))
    }

    async fn delete_document(&self, arguments: Value) -> ToolOutcome {
        let args: DocumentArgs = parse_args(arguments)?;
        let doc_type = required(args.doc_type, "type")?;
        let ids = ids_from(args.ids)?;
        let options = document_options(args.pack, args.parent_uuid);
        let ack = self.client.delete_document(&doc_type, &ids, &options).await?;
        Ok(ToolResult::json(&ack))
    }

    fn show_credentials(&self) -> ToolOutcome {
        Ok(ToolResult::json(&self.client.credentials_info()?))
    }

    async fn choose_instance(&self, arguments: Value) -> ToolOutcome {
        let args: ChooseArgs = parse_args(arguments)?;
        let selector = Selector::from_parts(args.item_order, non_empty(args.id))
            .map_err(|e| ToolError::Usage(e.to_string()))?;
        let chosen = self.client.choose_instance(&selector).await?;
        let hostname = self.client.hostname().unwrap_or(chosen.hostname);
        Ok(ToolResult::json(&json!({
            "success": true,
            "message": format!("Successfully connected to {hostname}"),
            "hostname": hostname,
        })))
    }

    async fn upload_file(&self, arguments: Value) -> ToolOutcome {
        let args: UploadArgs = parse_args(arguments)?;
        let target = required(args.target, "target")?;
        let filename = required(args.filename, "filename")?;
        let outcome = self
            .client
            .upload_file(&target, &filename, args.url, args.image_data)
            .await?;
        Ok(ToolResult::json(&outcome))
    }

    async fn browse_files(&self, arguments: Value) -> ToolOutcome {
        let args: BrowseArgs = parse_args(arguments)?;
        let mut request = BrowseRequest::new(required(args.target, "target")?);
        if let Some(file_type) = non_empty(args.file_type) {
            request = request.with_type(file_type);
        }
        if let Some(extensions) = args.extensions {
            request = request.with_extensions(extensions);
        }
        let listing = self.client.browse_files(&request).await?;
        Ok(ToolResult::json(&listing))
    }

    async fn create_compendium(&self, arguments: Value) -> ToolOutcome {
        let args: CompendiumArgs = parse_args(arguments)?;
        let label = required(args.label, "label")?;
        let doc_type = required(args.doc_type, "type")?;
        let ack = self.client.create_compendium(&label, &doc_type).await?;
        Ok(ToolResult::json(&ack))
    }

    async fn delete_compendium(&self, arguments: Value) -> ToolOutcome {
        let args: CompendiumArgs = parse_args(arguments)?;
        let name = required(args.name, "name")?;
        let ack = self.client.delete_compendium(&name).await?;
        Ok(ToolResult::json(&ack))
    }
}
