//! Business logic services.

pub mod aggregation;
pub mod assembler;
pub mod catalog;
pub mod context;
pub mod duration;
pub mod engine;
pub mod interpolate;
pub mod layout;
pub mod peers;
pub mod registry;
pub mod search;
pub mod stream;
pub mod transform;
pub mod validator;

pub use catalog::Catalog;
pub use context::RequestContext;
pub use duration::{Clock, DurationResolver, FixedClock, SystemClock};
pub use engine::ReportEngine;
pub use layout::{InMemoryLayoutStore, LayoutService, LayoutStore};
pub use peers::{AccessControl, ComponentService, EndpointService, HttpPeerClient, OrganizationService};
pub use registry::Registry;
pub use search::{OpenSearchGateway, SearchBackend};
