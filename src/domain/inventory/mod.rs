// ============================================================================
// Inventory Domain - product stock and its reservation rules
// ============================================================================

pub mod product;
pub mod reservation;
pub mod validator;

pub use product::*;
pub use reservation::{lock_products, release, reserve, total_units, StockMovement};
pub use validator::*;
