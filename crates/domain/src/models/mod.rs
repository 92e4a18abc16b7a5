//! Domain models for Cribble.

pub mod account;
pub mod device;
pub mod event;
pub mod leaderboard;
pub mod score;
pub mod sync;

pub use account::{Account, AccountSummary, SubscriptionTier};
pub use device::{
    BrowserInfo, Device, DeviceRegistration, DeviceState, DeviceSummary, RegisterDeviceRequest,
    RemoveDeviceRequest,
};
pub use event::{EventKey, NewUsageEvent, RawEvent, UsageEvent, EXTENSION_CLIENT_VERSION};
pub use leaderboard::{LeaderboardEntry, TopTool};
pub use score::{
    AccountStats, ActivityDay, ActivityReport, ActivitySummary, ActivityTotals, ScoreWindow,
    WindowStats,
};
pub use sync::{SyncRequest, SyncResponse};
