//! TETRIS kiosk client.
//!
//! [`CommunicationManager`] ties together the JSON API client, the progress
//! event stream, the adaptive status poller and the recovery coordinator.
//! Everything the UI reacts to is published on the [`EventBus`]; event
//! names are in [`events`].
//!
//! ```no_run
//! use tetris_client::{CommunicationManager, TetrisConfig, events};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let manager = CommunicationManager::new(TetrisConfig::load(None)?)?;
//! manager.bus().on(events::PROGRESS_UPDATE, |update| {
//!     println!("progress: {update}");
//!     Ok(())
//! });
//! let session_id = manager.start_session(None).await?;
//! manager.trigger_hardware("start").await?;
//! # let _ = session_id;
//! # Ok(())
//! # }
//! ```

pub mod envelope;
pub mod error;
pub mod manager;
mod monitor;
mod session;

pub use error::ClientError;
pub use manager::{CommunicationManager, CommunicationManagerBuilder, ConnectionSnapshot};

pub use config_loader::TetrisConfig;
pub use event_bus::{EventBus, ListenerId, events};
pub use http_client::{ApiResponse, Diagnostics};
pub use poller::{CallbackId, PollState};
pub use streams::StateSnapshot;
