//! Mission-data routing core.
//!
//! `mdr` terminates five UDP endpoints that carry traffic between a
//! ground-side simulator, a K-Band downlink/uplink proxy, a mission-data
//! gateway simulator, and the Control/Data planes of a bus-switching
//! component. Downlink group messages are decoded and dispatched per packet;
//! uplink packets are held in a frame-keyed delay queue, released by an
//! external K-Frame timing signal, and re-batched into bounded group
//! messages.
//!
//! All socket I/O runs on one dedicated reactor worker (a mio poll loop).
//! The public [`Router`] handle posts commands into that worker and never
//! touches endpoint state directly.
//!
//! ```no_run
//! use mdr::{Router, RouterConfig};
//!
//! let router = Router::spawn(RouterConfig::default()).unwrap();
//! router.start();
//! // ... runs until the handle is dropped ...
//! ```

pub mod config;
pub mod net;
pub mod protocol;
pub mod router;
pub mod stats;

pub(crate) mod trace;

pub use config::RouterConfig;
pub use net::Endpoint;
pub use router::{ConfigUpdate, Router};
pub use trace::init_tracing;
