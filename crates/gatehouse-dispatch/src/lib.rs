//! Gatehouse Dispatch — execution of approved tool requests.
//!
//! The dispatcher turns an approved [`ToolRequest`](gatehouse_core::ToolRequest)
//! into an HTTP call against the owning service, entirely driven by the
//! tool's declarative definition: path template, body shaping, response
//! wrapping, and the service's auth scheme and error mappings. Service
//! credentials live here and never cross the agent channel.
//!
//! Services that cannot be expressed as declarative HTTP plug in through
//! the [`HandlerRegistry`]: the configuration names a factory, the factory
//! receives the parsed [`ServiceConfig`] and its owned tool definitions,
//! and the resulting handler satisfies the same [`ServiceHandler`]
//! contract as the built-in HTTP handler.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod config;
pub mod executor;
pub mod factory;
pub mod handler;
pub mod http;

mod error;

pub use config::{AuthScheme, ErrorMapping, HealthProbe, ServiceConfig};
pub use error::{DispatchError, DispatchResult};
pub use executor::Executor;
pub use factory::HandlerRegistry;
pub use handler::ServiceHandler;
pub use http::HttpHandler;
