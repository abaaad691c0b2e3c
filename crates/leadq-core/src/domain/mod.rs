//! Domain model (ids, lead record, status machine, policy, errors).

pub mod errors;
pub mod ids;
pub mod lead;
pub mod policy;
pub mod status;

pub use self::errors::{ErrorKind, QueueError, StoreError};
pub use self::ids::{ClaimToken, Id, IdMarker, LeadId, ParseIdError};
pub use self::lead::{Claim, ClaimedLead, Lead, OVERFLOW_DROP_REASON, TenantId, Transition};
pub use self::policy::{Bounds, OverflowPolicy, TenantQueueConfig, TunableBounds, keys};
pub use self::status::LeadStatus;
