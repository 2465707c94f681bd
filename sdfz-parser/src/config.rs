//! Parser configuration.
//!
//! A [`DemoParserConfig`] is built once and passed by reference to every
//! component. It can be loaded from JSON; missing fields take their
//! defaults.
//!
//! ```
//! use sdfz_parser::config::DemoParserConfig;
//! use sdfz_parser::packets::PacketId;
//!
//! let config: DemoParserConfig =
//!     serde_json::from_str(r#"{ "includePackets": ["CHAT", "STARTPOS"], "verbose": true }"#)
//!         .unwrap();
//! assert!(config.verbose);
//! assert_eq!(config.include_packets, vec![PacketId::Chat, PacketId::StartPos]);
//! assert_eq!(config.exclude_packets, vec![PacketId::NewFrame]);
//! ```

use std::fs;
use std::path::Path;

use serde::Deserialize;

use crate::error::{ParserError, Result};
use crate::packets::lua::LuaHandler;
use crate::packets::PacketId;

/// Options controlling what a parse decodes and keeps.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DemoParserConfig {
    /// Emit diagnostics for unknown packets and failed Lua messages.
    ///
    /// Default: `false`
    pub verbose: bool,

    /// If not empty, only packets of these types are decoded.
    ///
    /// Default: empty
    pub include_packets: Vec<PacketId>,

    /// Packets of these types are never decoded.
    ///
    /// Default: `[NEWFRAME]`
    pub exclude_packets: Vec<PacketId>,

    /// If not empty, packets sent by other players are dropped.
    ///
    /// Default: empty
    pub include_player_ids: Vec<u32>,

    /// Use the built-in Lua message handlers.
    ///
    /// Default: `true`
    pub include_standard_lua_handlers: bool,

    /// Extra Lua message handlers, tried after the built-in ones.
    #[serde(skip)]
    pub custom_lua_handlers: Vec<LuaHandler>,

    /// Names of Lua handlers to remove from the chain.
    ///
    /// Default: empty
    pub exclude_lua_handlers: Vec<String>,

    /// Stop after the header and script; statistics are not decoded.
    ///
    /// Default: `false`
    pub skip_packets: bool,

    /// Keep decoded packets in the result. When `false` packets are only
    /// passed to the callback.
    ///
    /// Default: `true`
    pub collect_packets: bool,
}

impl Default for DemoParserConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            include_packets: Vec::new(),
            exclude_packets: vec![PacketId::NewFrame],
            include_player_ids: Vec::new(),
            include_standard_lua_handlers: true,
            custom_lua_handlers: Vec::new(),
            exclude_lua_handlers: Vec::new(),
            skip_packets: false,
            collect_packets: true,
        }
    }
}

impl DemoParserConfig {
    /// Loads a configuration from a JSON file.
    ///
    /// # Errors
    ///
    /// - `ParserError::IoError` if the file cannot be read
    /// - `ParserError::InvalidConfig` if the JSON is malformed
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Parses a configuration from JSON text.
    ///
    /// # Errors
    ///
    /// Returns `ParserError::InvalidConfig` on malformed JSON.
    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| ParserError::InvalidConfig {
            reason: e.to_string(),
        })
    }

    /// Adds a custom Lua handler.
    #[must_use]
    pub fn with_lua_handler(mut self, handler: LuaHandler) -> Self {
        self.custom_lua_handlers.push(handler);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = DemoParserConfig::default();
        assert!(!config.verbose);
        assert!(config.include_packets.is_empty());
        assert_eq!(config.exclude_packets, vec![PacketId::NewFrame]);
        assert!(config.include_standard_lua_handlers);
        assert!(!config.skip_packets);
        assert!(config.collect_packets);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = DemoParserConfig::from_json(r#"{ "skipPackets": true }"#).unwrap();
        assert!(config.skip_packets);
        assert_eq!(config.exclude_packets, vec![PacketId::NewFrame]);
        assert!(config.include_standard_lua_handlers);
    }

    #[test]
    fn test_json_overrides_exclude_list() {
        let config =
            DemoParserConfig::from_json(r#"{ "excludePackets": [], "includePlayerIds": [1, 4] }"#)
                .unwrap();
        assert!(config.exclude_packets.is_empty());
        assert_eq!(config.include_player_ids, vec![1, 4]);
    }

    #[test]
    fn test_malformed_json() {
        let result = DemoParserConfig::from_json(r#"{ "verbose": "yes" }"#);
        assert!(matches!(result, Err(ParserError::InvalidConfig { .. })));
    }

    #[test]
    fn test_unknown_packet_name_rejected() {
        let result = DemoParserConfig::from_json(r#"{ "includePackets": ["NOPE"] }"#);
        assert!(result.is_err());
    }
}
