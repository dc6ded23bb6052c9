//! Gatehouse Gateway — the session and request engine.
//!
//! This crate is the heart of the gateway: it owns the agent channel, the
//! request lifecycle state machine, and every piece of runtime
//! coordination the specification calls race-safe:
//!
//! - **Sessions** ([`session`]): one task per connection; auth-first
//!   handshake with a hard deadline, then a receive loop that spawns one
//!   task per frame. A single writer drains an outbound channel, so
//!   replies interleave across requests but never within a frame.
//! - **Request engine** ([`engine`]): validate → policy → allow / deny /
//!   ask. The ask path parks the request on a oneshot rendezvous that an
//!   approval callback and a timeout timer race through the store's
//!   idempotent `resolve_pending`; exactly one wins, the loser no-ops.
//! - **Offline delivery**: any reply whose session is gone becomes an
//!   offline result, drained exactly once by `get_pending_results`.
//! - **Sweeps** ([`server`]): a startup sweep times out expired persisted
//!   pendings before the listener binds; a background sweeper backstops
//!   lost timers at runtime.
//! - **Caps** ([`ratelimit`]): a token bucket over auto-allowed
//!   executions and a store-backed ceiling on concurrent pendings.
//!
//! # Locking design
//!
//! The engine is shared as one `Arc`; its interior state is three short
//! mutexes (rate bucket, waiter map, in-flight id set), none held across
//! an await. Cross-task synchronization between the approval and timeout
//! paths happens in the store's conditional update, nowhere else.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod engine;
pub mod health;
pub mod ratelimit;
pub mod server;
pub mod session;
pub mod transport;

mod pending;

pub use engine::{Completed, EngineParams, Outcome, RequestEngine};
pub use server::{Gateway, GatewayParams};
pub use session::{run_session, SessionContext, AUTH_DEADLINE};
pub use transport::{ChannelTransport, MessageTransport, TransportError, WsTransport};
