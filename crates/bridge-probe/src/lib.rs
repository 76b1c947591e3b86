//! Bridge Probe: end-to-end test harness for cross-chain bridge UIs
//!
//! Drives a bridge web app and its wallet extension through one transfer,
//! watching the network traffic the UI produces and turning it into a
//! pass/fail record.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐   events   ┌──────────────┐  outcomes  ┌──────────────┐
//! │ BridgePage   │──────────►│ Traffic      │──────────►│ Monitor      │
//! │ (CDP/script) │           │ Recorder     │  (queue)  │ Registry     │
//! └──────▲───────┘           └──────────────┘           └──────┬───────┘
//!        │ clicks/fills                                       │ wait()
//!        │                  ┌──────────────┐           ┌──────▼───────┐
//!        └──────────────────│ Bridge       │◄──────────│ Response     │
//!                           │ Pipeline     │  verdicts │ Interpreter  │
//!                           └──────┬───────┘           └──────────────┘
//!                                  ▼
//!                      BridgeOperationResult (JSON)
//! ```

#![warn(missing_docs)]

#[cfg(feature = "browser")]
pub mod browser;
pub mod config;
pub mod har;
pub mod interpret;
pub mod matcher;
pub mod mock;
pub mod monitor;
pub mod network;
pub mod operation;
pub mod page;
pub mod pipeline;
pub mod recorder;
pub mod reporter;
mod result;

#[cfg(feature = "browser")]
pub use browser::{BrowserOptions, CdpPage};
pub use config::{EndpointConfig, HarnessConfig, TimeoutConfig};
pub use har::Har;
pub use interpret::{interpret, DomainOutcome, EndpointKind, MessagesPreview};
pub use matcher::{matches, MatchMode, MatchRule, RpcRule};
pub use monitor::{
    ApiResponseResult, Monitor, MonitorId, MonitorOptions, MonitorOutcome, MonitorRegistry,
    MonitorState, RegistryConfig, RejectReason,
};
pub use network::{CapturedEvent, DecodedBody, EventKind, HttpMethod, RpcEnvelope};
pub use operation::{
    BridgeOperationResult, BridgeRequest, OperationTiming, ResponseRecord, TestProgress,
};
pub use page::{BridgePage, Capability};
pub use pipeline::{BridgePipeline, Stage};
pub use recorder::TrafficRecorder;
pub use reporter::{load_results, ResultWriter, RunSummary};
pub use result::{ProbeError, ProbeResult};

/// Common imports
pub mod prelude {
    #[cfg(feature = "browser")]
    pub use super::browser::*;
    pub use super::config::*;
    pub use super::interpret::*;
    pub use super::matcher::*;
    pub use super::mock::*;
    pub use super::monitor::*;
    pub use super::network::*;
    pub use super::operation::*;
    pub use super::page::*;
    pub use super::pipeline::*;
    pub use super::recorder::*;
    pub use super::reporter::*;
    pub use super::result::*;
}
