//! Page capabilities consumed by the pipeline.
//!
//! The pipeline never sees selectors. It asks a [`BridgePage`] to act on a
//! named [`Capability`] and gets booleans or strings back; the page decides
//! how that maps onto the DOM or the wallet extension.

use crate::result::ProbeResult;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Named UI elements the bridge flow interacts with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Capability {
    /// Button opening the wallet chooser
    ConnectWallet,
    /// Wallet entry in the chooser
    WalletOption,
    /// Approve button in the wallet extension's connect prompt
    WalletConnectApprove,
    /// Indicator shown once a wallet is connected
    WalletConnected,
    /// Source chain picker
    SourceChain,
    /// Source token picker
    SourceToken,
    /// Destination chain picker
    DestinationChain,
    /// Destination token picker
    DestinationToken,
    /// Route preference picker
    RouteType,
    /// Amount input
    AmountInput,
    /// Recipient address input
    TargetAddress,
    /// Banner showing route errors
    RouteError,
    /// Button submitting the transfer
    SubmitButton,
    /// Approve button in the wallet extension's signing prompt
    SignApprove,
}

impl Capability {
    /// Every capability, in flow order
    pub const ALL: [Self; 14] = [
        Self::ConnectWallet,
        Self::WalletOption,
        Self::WalletConnectApprove,
        Self::WalletConnected,
        Self::SourceChain,
        Self::SourceToken,
        Self::DestinationChain,
        Self::DestinationToken,
        Self::RouteType,
        Self::AmountInput,
        Self::TargetAddress,
        Self::RouteError,
        Self::SubmitButton,
        Self::SignApprove,
    ];

    /// Stable name used in logs and selector maps
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ConnectWallet => "connect-wallet",
            Self::WalletOption => "wallet-option",
            Self::WalletConnectApprove => "wallet-connect-approve",
            Self::WalletConnected => "wallet-connected",
            Self::SourceChain => "source-chain",
            Self::SourceToken => "source-token",
            Self::DestinationChain => "destination-chain",
            Self::DestinationToken => "destination-token",
            Self::RouteType => "route-type",
            Self::AmountInput => "amount-input",
            Self::TargetAddress => "target-address",
            Self::RouteError => "route-error",
            Self::SubmitButton => "submit-button",
            Self::SignApprove => "sign-approve",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Page-object collaborator driven by the pipeline.
///
/// Ordinary misses (element absent, click refused) come back as `false` or
/// `None`. `Err` is reserved for conditions the page cannot recover from,
/// such as a dead browser session.
#[async_trait]
pub trait BridgePage: Send {
    /// Navigate to a URL
    async fn navigate(&mut self, url: &str) -> ProbeResult<()>;

    /// Wait for the current document to finish loading
    async fn wait_for_load(&mut self, timeout_ms: u64) -> ProbeResult<()>;

    /// Click a capability; `false` if it could not be clicked
    async fn click(&mut self, capability: Capability) -> ProbeResult<bool>;

    /// Whether a capability becomes visible within `timeout_ms`
    async fn is_visible(&mut self, capability: Capability, timeout_ms: u64) -> ProbeResult<bool>;

    /// Fill or choose a value; `false` if the input was not accepted
    async fn fill_input(&mut self, capability: Capability, value: &str) -> ProbeResult<bool>;

    /// Visible text of a capability, if present
    async fn text_of(&mut self, capability: Capability) -> ProbeResult<Option<String>>;

    /// Whether a capability is present and enabled
    async fn is_enabled(&mut self, capability: Capability) -> ProbeResult<bool>;

    /// Capture a PNG screenshot
    async fn screenshot(&mut self, name: &str) -> ProbeResult<Vec<u8>>;
}
