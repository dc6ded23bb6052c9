//! Gatehouse Registry — declarative tool definitions.
//!
//! Each trusted service ships a YAML tool file describing the tools it
//! exposes: argument schemas with optional regex validators, a signature
//! template for policy matching, and the HTTP request shape the dispatcher
//! executes. The [`ToolRegistry`] owns every [`ToolDefinition`] after load
//! and answers lookups for the rest of the gateway.
//!
//! All validation happens at load time: an invalid validator regex or a
//! tool name collision across services is a fatal configuration error, not
//! a runtime surprise.
//!
//! # Example
//!
//! ```
//! use gatehouse_registry::{loader, ToolRegistry};
//!
//! let doc = r#"
//! tools:
//!   ha_get_state:
//!     description: Read an entity state
//!     signature: "{entity_id}"
//!     args:
//!       entity_id:
//!         required: true
//!     request:
//!       method: GET
//!       path: /api/states/{entity_id}
//! "#;
//! let tools = loader::parse_tools_str(doc, "homeassistant").unwrap();
//! let registry = ToolRegistry::build(tools).unwrap();
//! assert!(registry.lookup("ha_get_state").is_some());
//! ```

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod definition;
pub mod loader;
pub mod registry;

mod error;

pub use definition::{ArgSpec, RequestSpec, ResponseSpec, ToolDefinition};
pub use error::{RegistryError, RegistryResult};
pub use registry::{stringify_arg, ToolRegistry};
