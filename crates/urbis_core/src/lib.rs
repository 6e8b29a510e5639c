pub mod access;
pub mod api;
pub mod error;
pub mod events;
pub mod filter;
pub mod geometry;
pub mod ids;
pub mod model;
pub mod overlay;

pub use access::{Access, AccessPolicy, OwnershipPolicy, TrustCaller};
pub use api::*;
pub use error::{UrbisError, UrbisResult};
pub use events::{ChangeEvent, ChangeKind, ChannelEventSink, EventScope, EventSink, NoopEventSink};
pub use filter::{ContextQuery, Direction, OrderBy, Predicate, ResolveQuery};
pub use geometry::{Geometry, GeometryKind};
pub use ids::*;
pub use model::*;
pub use overlay::*;
