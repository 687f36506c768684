//! Agent-to-agent task runtime: protocol handling, task lifecycle,
//! pluggable persistence, scheduling, event distribution, and push
//! notifications.
//!
//! The crate is assembled around a few seams:
//!
//! - [`handler::ProtocolHandler`] is the front door a transport maps
//!   protocol requests onto.
//! - [`store::TaskStore`] is the persistence contract, with in-memory,
//!   distributed-cache, and Redis backends.
//! - [`runtime::AgentRuntime`] is the pluggable computation backend
//!   that actually executes tasks.
//! - [`queue::TaskQueue`] enforces single-flight execution per task and
//!   cooperative cancellation.
//! - [`broker::EventBroker`] fans ordered task events out to
//!   subscribers, the store, and webhook targets.
//!
//! ```no_run
//! use a2a_runtime::config::HandlerConfig;
//! use a2a_runtime::handler::{MessageSendOptions, ProtocolHandler};
//! use a2a_runtime::store::InMemoryTaskStore;
//! # use a2a_runtime::runtime::AgentRuntime;
//! # use std::sync::Arc;
//!
//! # async fn assemble(my_runtime: Arc<dyn AgentRuntime>) -> a2a_runtime::errors::A2AResult<()> {
//! let handler = ProtocolHandler::new(HandlerConfig::new(
//!     Arc::new(InMemoryTaskStore::new()),
//!     my_runtime,
//! ));
//! # Ok(())
//! # }
//! ```

pub mod broker;
pub mod config;
pub mod errors;
pub mod handler;
pub mod push;
pub mod queue;
pub mod runtime;
pub mod status;
pub mod store;
pub mod test_support;

pub use broker::{EventBroker, TaskEventReceiver, TaskEventStream};
pub use config::HandlerConfig;
pub use errors::{A2AError, A2AResult};
pub use handler::{MessageSendOptions, ProtocolHandler};
pub use push::{HttpPushNotificationSender, PushNotificationSender};
pub use queue::TaskQueue;
pub use runtime::{AgentRuntime, AgentUpdate, AgentUpdateStream, ExecutionContext};
pub use store::{
    CacheTaskStore, DistributedCache, InMemoryCache, InMemoryTaskStore, ListOptions, Page,
    RedisTaskStore, StoreConfig, TaskRecord, TaskStore,
};

// The protocol data model, re-exported for downstream convenience.
pub use a2a_types as types;
