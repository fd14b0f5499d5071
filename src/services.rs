//! Business rules that sit between the handlers and the `Repository`.
//!
//! Handlers never talk to the store directly for mutations: every owner-only
//! write goes through `PostOwnershipGuard`, every reaction through
//! `ReactionService`.

pub mod ownership;
pub mod posts;
pub mod reactions;
pub mod users;

pub use ownership::PostOwnershipGuard;
pub use posts::PostService;
pub use reactions::{ReactionService, TOP_LIKED_LIMIT, transition};
pub use users::UserService;
