// ============================================================================
// Order Domain - Business Logic for the Order Aggregate
// ============================================================================
//
// This module contains ALL Order-specific code:
// - Value objects (SalesChannel, OrderItem, OrderItemRequest)
// - Commands (NewOrder, OrderPatch, OrderFilter)
// - Errors (OrderError enum)
// - Aggregate (Order with its total invariant)
// - Processors (entry, mutation, removal, statistics)
// - Command Handler (OrderCommandHandler)
//
// Storage is reached only through the collaborator traits in `crate::store`.
//
// ============================================================================

pub mod value_objects;
pub mod commands;
pub mod errors;
pub mod aggregate;
pub mod entry;
pub mod mutation;
pub mod removal;
pub mod statistics;
pub mod command_handler;

// Re-export for convenience
pub use value_objects::*;
pub use commands::*;
pub use errors::*;
pub use aggregate::*;
pub use entry::*;
pub use mutation::*;
pub use removal::*;
pub use statistics::*;
pub use command_handler::*;
