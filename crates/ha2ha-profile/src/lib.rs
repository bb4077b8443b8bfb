pub mod availability;
pub mod enforcer;
pub mod fatigue;
pub mod pretrust;
pub mod profile;

pub use availability::{check_availability, AvailabilityDecision};
pub use enforcer::{ApprovalGate, ProfileEnforcer};
pub use fatigue::{FatigueStatus, FatigueTracker};
pub use pretrust::{apply_first_contact, resolve};
pub use profile::{
    ApproverProfile, Availability, Enforcement, OffHoursBehavior, PreTrustLevel,
    PreTrustedEntity, RecoveryPolicy, RecoveryTimeoutAction, ScheduleWindow,
};
