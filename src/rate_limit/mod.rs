//! Lead Trigger Rate Limiting
//!
//! Keeps repeated "engagement started" signals from the same visitor from
//! flooding the lead webhook.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────┐
//! │            LeadTriggerLimiter            │
//! │   should_trigger(client_id, now) -> bool │
//! ├──────────────────────────────────────────┤
//! │   Mutex<Box<dyn TriggerStore>>           │
//! │   (MemoryTriggerStore by default)        │
//! └──────────────────────────────────────────┘
//! ```

pub mod limiter;
pub mod store;

pub use limiter::{LeadTriggerLimiter, DEFAULT_LEAD_COOLDOWN};
pub use store::{MemoryTriggerStore, TriggerStore};
