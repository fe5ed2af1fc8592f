pub mod geometry;
pub mod id;
pub mod model;
pub mod placement;
pub mod session;
pub mod snapshot;
pub mod store;

pub use geometry::{collides_with_any, overlaps};
pub use id::{CanvasId, EdgeId, NodeId};
pub use model::*;
pub use placement::{Placement, PlacementConfig, PlacementTier, place};
pub use session::{Session, SessionError, SessionId, SessionRegistry};
pub use snapshot::{RegistrySnapshot, SessionSnapshot, SnapshotError};
pub use store::{Anchor, AnchorTarget, CanvasStore, Crumb, StoreError};

// Re-export kurbo geometry so downstream crates share one version
pub use kurbo;
