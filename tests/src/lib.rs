//! # Hyperbus Test Suite
//!
//! Scenarios that span several nodes, restarts and on-disk stores.
//!
//! ## Structure
//!
//! ```text
//! tests/
//! ├── fixtures/          # Schemas shared by the scenarios
//! └── src/integration/
//!     ├── support.rs     # Node construction and waiting helpers
//!     ├── local_bus.rs   # Single node: codecs, listeners, streams
//!     ├── replication.rs # Two and three nodes, restarts, reconnection
//!     └── discovery.rs   # Gossip announcements
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p hb-tests
//! cargo test -p hb-tests integration::replication
//! ```

pub mod integration;
