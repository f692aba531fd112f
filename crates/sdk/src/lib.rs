//! # start-defender SDK
//!
//! HTTP transport used by the scan gateway: direct calls to the vendor scan
//! API and delegated calls to a relay's manager endpoints.
//!
//! ```rust,no_run
//! use start_defender_core::gateway::ScanTransport;
//! use start_defender_core::ScanAction;
//! use start_defender_sdk::{ClientConfig, HttpTransport};
//!
//! # async fn example() -> start_defender_core::DefenderResult<()> {
//! let transport = HttpTransport::new(ClientConfig::default());
//! let status = transport
//!     .call_vendor("https://vendor.example.com/scan", "token", "PC-1", ScanAction::GetStatus)
//!     .await?;
//! println!("{status}");
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod transport;

pub use config::{ClientConfig, DEFAULT_USER_AGENT};
pub use error::{TransportError, TransportResult};
pub use transport::HttpTransport;
