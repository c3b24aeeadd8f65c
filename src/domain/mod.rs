// ============================================================================
// Domain Layer - Business Logic
// ============================================================================
//
// - order     - order aggregate, processors and the command handler
// - inventory - product stock, validation and reservation/release
//
// Persistence is injected through `crate::store`; nothing here knows which
// backend is running.
//
// ============================================================================

pub mod order;
pub mod inventory;
