#![warn(missing_docs)]

//! Test utilities for muninn integration and unit tests
//!
//! This crate provides a mock transport with scripted responses, manually
//! driven network and app-state adapters, an in-memory SQLite setup, and
//! factory functions for operations and domain fixtures.
//!
//! # Typical test
//!
//! ```ignore
//! use muninn_test_utils::prelude::*;
//!
//! #[tokio::test]
//! async fn my_test() -> Result<(), TestError> {
//!     let _guard = engine_lock().await;
//!
//!     let transport = MockTransport::new();
//!     transport.stub_pulls(4200);
//!
//!     let network = MockNetwork::new(true);
//!     let app_state = MockAppState::new();
//!
//!     let engine = muninn::SyncEngine::initialize(
//!         test_config(),
//!         transport.clone(),
//!         network.clone(),
//!         app_state.clone(),
//!     )
//!     .await?;
//!
//!     // drive the engine ...
//!
//!     engine.shutdown().await?;
//!     Ok(())
//! }
//! ```
//!
//! The engine is a process-wide singleton; tests that call
//! `SyncEngine::initialize` must hold [`engine_lock`] so parallel test
//! threads take turns.

pub mod adapters;
pub mod constant;
pub mod error;
pub mod factory;
pub mod setup;
pub mod transport;

use std::sync::LazyLock;

use tokio::sync::{Mutex, MutexGuard};

pub use adapters::{MockAppState, MockNetwork};
pub use error::TestError;
pub use setup::{test_config, test_db};
pub use transport::MockTransport;

static ENGINE_LOCK: LazyLock<Mutex<()>> = LazyLock::new(|| Mutex::new(()));

/// Serializes tests that initialize the process-wide engine singleton.
pub async fn engine_lock() -> MutexGuard<'static, ()> {
    ENGINE_LOCK.lock().await
}

/// Prelude module containing commonly used imports for tests
///
/// # Usage
///
/// ```ignore
/// use muninn_test_utils::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{
        adapters::{MockAppState, MockNetwork},
        engine_lock,
        error::TestError,
        factory,
        setup::{test_config, test_db},
        transport::MockTransport,
    };
}
