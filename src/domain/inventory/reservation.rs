use std::collections::BTreeSet;
use uuid::Uuid;

use super::validator::ResolvedStock;
use crate::domain::order::{OrderError, OrderItem};
use crate::store::ProductStockStore;

// ============================================================================
// Stock Movements - reservation (decrement) and release (increment)
// ============================================================================
//
// Both run inside the caller's unit of work. Each product is written once per
// call through the store's conditional save.
//
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StockMovement {
    pub product_id: Uuid,
    pub quantity: i32,
    pub remaining: i32,
}

pub fn total_units(movements: &[StockMovement]) -> u64 {
    movements.iter().map(|m| m.quantity.unsigned_abs() as u64).sum()
}

/// Read every product in `ids` once, ascending by id. On a locking backend
/// this takes all row locks up front in a global order; later reads in the
/// same unit of work find the rows already held. Missing ids are ignored here
/// and reported by whoever needs them.
pub async fn lock_products<S>(store: &mut S, ids: impl IntoIterator<Item = Uuid>) -> Result<usize, OrderError>
where
    S: ProductStockStore + ?Sized,
{
    let ids: BTreeSet<Uuid> = ids.into_iter().collect();
    let mut found = 0;
    for id in &ids {
        if store.product_by_id(*id).await?.is_some() {
            found += 1;
        }
    }
    tracing::debug!(requested = ids.len(), found, "Locked products");
    Ok(found)
}

/// Decrement stock for products the validator already confirmed.
pub async fn reserve<S>(store: &mut S, resolved: Vec<ResolvedStock>) -> Result<Vec<StockMovement>, OrderError>
where
    S: ProductStockStore + ?Sized,
{
    let mut movements = Vec::with_capacity(resolved.len());

    for ResolvedStock { mut product, requested } in resolved {
        product.reserve(requested)?;
        let saved = store.save_product(&product).await?;

        tracing::debug!(
            product_id = %saved.id,
            reserved = requested,
            remaining = saved.quantity,
            "Reserved stock"
        );

        movements.push(StockMovement {
            product_id: saved.id,
            quantity: requested,
            remaining: saved.quantity,
        });
    }

    Ok(movements)
}

/// Give back the stock held by `items`.
pub async fn release<S>(store: &mut S, items: &[OrderItem]) -> Result<Vec<StockMovement>, OrderError>
where
    S: ProductStockStore + ?Sized,
{
    let mut per_product: Vec<(Uuid, i32)> = Vec::with_capacity(items.len());
    for item in items {
        match per_product.iter_mut().find(|(id, _)| *id == item.product_id) {
            Some((_, quantity)) => {
                *quantity = quantity
                    .checked_add(item.quantity)
                    .ok_or_else(|| OrderError::validation("released quantity overflows"))?;
            }
            None => per_product.push((item.product_id, item.quantity)),
        }
    }
    per_product.sort_by_key(|(id, _)| *id);

    let mut movements = Vec::with_capacity(per_product.len());

    for (product_id, quantity) in per_product {
        let Some(mut product) = store.product_by_id(product_id).await? else {
            tracing::warn!(product_id = %product_id, quantity, "Product no longer exists, skipping stock release");
            continue;
        };

        product.release(quantity)?;
        let saved = store.save_product(&product).await?;

        tracing::debug!(
            product_id = %saved.id,
            released = quantity,
            remaining = saved.quantity,
            "Released stock"
        );

        movements.push(StockMovement {
            product_id: saved.id,
            quantity,
            remaining: saved.quantity,
        });
    }

    Ok(movements)
}
