//! chainstream-core — provider lifecycle and stream plumbing for ChainStream.
//!
//! # Overview
//!
//! ChainStream turns an account address into a live stream of its
//! transactions. The core crate defines:
//!
//! - [`Provider`] — the listen/push/close contract every provider implements
//! - [`StreamProvider`] — the leaf provider around a pluggable [`Source`]
//! - [`Middleware`] — ordered, bounded-concurrency item transforms
//! - [`MultiProvider`] — fan-out/fan-in over several providers
//! - [`Streamer`] — one-stream-at-a-time entry point
//! - [`Subscription`] — the observable side of a stream
//! - [`policy`] module — request throttle and retry

pub mod context;
pub mod error;
pub mod middleware;
pub mod multi;
pub mod policy;
pub mod provider;
pub mod request;
pub mod settings;
pub mod source;
pub mod streamer;
pub mod sync;

pub use context::{StreamEvent, Subscription};
pub use error::StreamError;
pub use middleware::{action_fn, Action, ActionContext, ContextHook, FnAction, Middleware, DEFAULT_CONCURRENCY};
pub use multi::MultiProvider;
pub use provider::{Provider, StreamProvider};
pub use request::{item_position, Item, StreamRequest};
pub use settings::{Settings, CONCURRENCY_KEY};
pub use source::Source;
pub use streamer::Streamer;
