//! Command line arguments

use std::path::PathBuf;

use clap::Parser;
use foundry_client::ClientConfig;
use foundry_client::config::CREDENTIALS_ENV;
use tracing::warn;

use crate::logging::LoggingConfig;

/// MCP server for Foundry VTT
#[derive(Parser, Debug, Clone, PartialEq, Eq)]
#[command(
    name = "foundry-mcp",
    version,
    about = "MCP server exposing a Foundry VTT world as tools over stdio",
    long_about = "Connects to the first Foundry VTT instance in the credential file that \
                  accepts its login, then serves MCP over stdin/stdout.\n\n\
                  Logs go to stderr. Set RUST_LOG to override --log-level."
)]
pub struct Cli {
    /// Credential file (JSON array of {_id, hostname, userid, password})
    #[arg(long, env = CREDENTIALS_ENV)]
    pub credentials: Option<PathBuf>,

    /// Directory for per-session websocket frame logs
    #[arg(long, env = "WEBSOCKETS_DIRECTORY")]
    pub websockets_directory: Option<PathBuf>,

    /// Default log filter, e.g. `info` or `foundry_client=debug`
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Log JSON lines instead of text
    #[arg(long)]
    pub log_json: bool,

    /// Use plain http/ws instead of https/wss (local testing only)
    #[arg(long)]
    pub insecure_transport: bool,

    /// Markdown advertised to MCP clients as server instructions
    #[arg(long, default_value = "INSTRUCTIONS.md")]
    pub instructions: PathBuf,
}

impl Cli {
    /// Client configuration implied by the flags.
    pub fn client_config(&self) -> ClientConfig {
        let config = ClientConfig::default().with_secure(!self.insecure_transport);
        match &self.credentials {
            Some(path) => config.with_credentials_path(path.clone()),
            None => config,
        }
    }

    /// Logging configuration implied by the flags.
    pub fn logging_config(&self) -> LoggingConfig {
        LoggingConfig {
            level: self.log_level.clone(),
            structured: self.log_json,
            frames_directory: self.websockets_directory.clone(),
        }
    }

    /// Contents of the instructions file; a missing file is only a warning.
    pub fn load_instructions(&self) -> Option<String> {
        match std::fs::read_to_string(&self.instructions) {
            Ok(text) => Some(text),
            Err(e) => {
                warn!("Could not load {}: {e}", self.instructions.display());
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::io::Write;

    #[test]
    fn flags_map_onto_client_and_logging_config() {
        let cli = Cli::try_parse_from([
            "foundry-mcp",
            "--credentials",
            "/etc/foundry/creds.json",
            "--websockets-directory",
            "/tmp/frames",
            "--log-level",
            "debug",
            "--insecure-transport",
        ])
        .unwrap();

        let config = cli.client_config();
        assert!(!config.secure);
        assert_eq!(config.credentials_path, Some(PathBuf::from("/etc/foundry/creds.json")));

        let logging = cli.logging_config();
        assert_eq!(logging.level, "debug");
        assert!(!logging.structured);
        assert_eq!(logging.frames_directory, Some(PathBuf::from("/tmp/frames")));
    }

    #[test]
    fn transport_is_secure_by_default() {
        let cli = Cli::try_parse_from(["foundry-mcp", "--log-json"]).unwrap();
        assert!(cli.client_config().secure);
        assert!(cli.logging_config().structured);
        assert_eq!(cli.log_level, "info");
        assert_eq!(cli.instructions, PathBuf::from("INSTRUCTIONS.md"));
    }

    #[test]
    fn instructions_are_optional() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "# Using this server").unwrap();

        let path = file.path().to_str().unwrap();
        let cli = Cli::try_parse_from(["foundry-mcp", "--instructions", path]).unwrap();
        assert_eq!(cli.load_instructions().as_deref(), Some("# Using this server"));

        let cli = Cli::try_parse_from(["foundry-mcp", "--instructions", "/nonexistent/INSTRUCTIONS.md"]).unwrap();
        assert_eq!(cli.load_instructions(), None);
    }
}
