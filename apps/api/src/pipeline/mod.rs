// Hiring pipeline reconciliation engine.
// Upload → match against training roster → per-round eligibility → selections
// → finalization into the placed directory. Store access goes through
// `PlacementStore`; nothing in here talks to Postgres directly.

pub mod directory;
pub mod eligibility;
pub mod error;
pub mod finalize;
pub mod handlers;
pub mod identity;
pub mod matcher;
pub mod rounds;
pub mod service;
