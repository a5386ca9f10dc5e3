//! Pure decision logic: completion transitions, view filtering and
//! category membership.

pub mod completion;
pub mod membership;
pub mod view_filter;

pub use completion::{Classification, classify};
pub use membership::{DefaultMembership, MembershipPolicy, MembershipRule};
pub use view_filter::{is_pending_for_viewer, pending_view};
