//! Configuration cache subsystem.
//!
//! # Data Flow
//! ```text
//! ConfigStore, or RouteStore + UpstreamStore (store.rs)
//!     → refresher.rs lists enabled routes + upstreams
//!     → snapshot.rs builds matcher, upstream map, clients
//!     → ArcSwap publish (single atomic pointer swap)
//!     → every request loads the current Arc<Snapshot>
//! ```
//!
//! # State Machine
//! ```text
//! Empty → Loading → Ready → Loading → Ready → ...
//! ```
//!
//! # Design Decisions
//! - Readers never lock; they see the whole old or the whole new snapshot
//! - Reloads are serialized; a scheduled reload skips if one is running
//! - Any reload failure keeps the previous snapshot
//! - Only the initial load is allowed to be fatal

pub mod clock;
pub mod refresher;
pub mod snapshot;
pub mod store;

pub use clock::{Clock, SystemClock};
pub use refresher::{
    CacheError, CacheSettings, CacheState, CacheStatus, ConfigCache, ReloadOutcome, ReloadTrigger,
};
pub use snapshot::{Snapshot, SnapshotError, SnapshotSource, StaticSnapshot};
pub use store::{ConfigStore, MemoryStore, RouteStore, StoreError, UpstreamStore};
