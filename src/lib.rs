//! kernel-core: an in-process, message-driven subsystem kernel with
//! capability-composed facets.
//!
//! A tree of [`subsystem::Subsystem`] nodes, each built from a declarative
//! set of [`facet::Hook`]s into a concrete set of [`facet::Facet`]
//! capability objects. Messages addressed by [`path::Path`] are routed
//! through [`system::MessageSystem`] to the subsystem whose
//! [`facet::Accepter`] processes them — synchronously, or via its bounded
//! queue and cooperative [`facet::SchedulerCapability`].

pub mod builder;
pub mod channel;
pub mod contract;
pub mod depgraph;
pub mod error;
pub mod facet;
pub mod global_scheduler;
pub mod identity;
pub mod listener;
pub mod message;
pub mod messaging;
pub mod path;
pub mod processor;
pub mod queue;
pub mod request;
pub mod resource;
pub mod router;
pub mod scheduler;
pub mod subsystem;
pub mod system;

pub use builder::{Plan, SubsystemBuilder};
pub use channel::{Channel, ChannelManager, CreateChannelOptions};
pub use contract::{Contract, ContractRegistry};
pub use depgraph::{CachedPlan, DependencyGraphCache};
pub use error::{KernelError, KernelResult};
pub use facet::{
    AcceptOptions, AcceptOutcome, Accepter, BuildContext, ConfigValue, Facet, FacetKind,
    FacetManager, Hook, ProcessOutcome, SchedulerCapability, SchedulerRunResult, SubsystemHandle,
};
pub use global_scheduler::{GlobalScheduler, GlobalStrategy, TickResult};
pub use identity::{
    CheckOptions, Identity, Pkr, Principal, PrincipalKind, PrincipalRegistry, ReaderWriterSet,
};
pub use listener::{ListenerHandler, ListenerId, ListenerManager, RegistrationPolicy};
pub use message::{CorrelationId, HandlerResult, Message, MessageId, MessageKind, MessageMeta};
pub use messaging::{Commands, Events, Queries};
pub use path::{Params, Path, PathPattern};
pub use processor::ProcessorFacet;
pub use queue::{BoundedQueue, EnqueueOutcome, OverflowPolicy, PriorityBoundedQueue, QueueStatus};
pub use request::{Cancellation, ChannelRequest, Deadline, OneShotRequest, PendingResponseStore};
pub use resource::{Resource, ResourceArena, ResourceId};
pub use router::{RouteEntry, RouteHandler, RouteRegistry};
pub use scheduler::{SchedulerFacet, SchedulerStrategy};
pub use subsystem::Subsystem;
pub use system::MessageSystem;
