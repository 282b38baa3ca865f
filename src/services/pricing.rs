use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::sync::Arc;
use tracing::{info, instrument, warn};

use crate::clients::cart::CartItem;
use crate::clients::catalog::ProductCatalogClient;
use crate::clients::promotions::{DiscountKind, PromoDiscount, PromotionClient};
use crate::errors::ServiceError;

/// A cart line with its unit price captured from the live catalog.
#[derive(Debug, Clone)]
pub struct PricedLine {
    pub product_id: i64,
    pub quantity: i32,
    pub unit_price: Decimal,
    pub size: String,
}

#[derive(Debug, Clone)]
pub struct PricedCart {
    pub lines: Vec<PricedLine>,
    /// Post-discount total. Computed once here; the persisted order never
    /// recalculates it.
    pub total: Decimal,
}

/// Prices a cart against the live catalog and applies an optional promo
/// code. Stock shortfalls abort the whole operation (no partial order);
/// promotion failures never do.
#[derive(Clone)]
pub struct PricingResolver {
    catalog: Arc<dyn ProductCatalogClient>,
    promotions: Arc<dyn PromotionClient>,
}

impl PricingResolver {
    pub fn new(
        catalog: Arc<dyn ProductCatalogClient>,
        promotions: Arc<dyn PromotionClient>,
    ) -> Self {
        Self {
            catalog,
            promotions,
        }
    }

    #[instrument(skip(self, items, email), fields(line_count = items.len()))]
    pub async fn price_cart(
        &self,
        items: &[CartItem],
        promo_code: Option<&str>,
        email: &str,
    ) -> Result<PricedCart, ServiceError> {
        let mut lines = Vec::with_capacity(items.len());
        let mut total = Decimal::ZERO;

        for item in items {
            let product = self.catalog.get_product(item.product_id).await?;

            if product.stock < item.quantity {
                return Err(ServiceError::InsufficientStock(format!(
                    "Insufficient stock for product {}: requested {}, available {}",
                    product.id, item.quantity, product.stock
                )));
            }

            total += product.price * Decimal::from(item.quantity);
            lines.push(PricedLine {
                product_id: product.id,
                quantity: item.quantity,
                unit_price: product.price,
                size: item.size.clone(),
            });
        }

        if let Some(code) = promo_code.map(str::trim).filter(|code| !code.is_empty()) {
            match self.promotions.validate(email, code).await {
                Ok(discount) => {
                    let discounted = apply_discount(total, &discount);
                    info!(code, %total, %discounted, "Promo code applied");
                    total = discounted;
                }
                Err(err) => {
                    // Promotion validation is best-effort; the order proceeds
                    // at the undiscounted total.
                    warn!(code, error = %err, "Promo code validation failed; continuing without discount");
                }
            }
        }

        Ok(PricedCart { lines, total })
    }
}

/// Fixed discounts larger than the subtotal drive the total negative; this
/// mirrors upstream billing behavior and is asserted by tests rather than
/// clamped here.
fn apply_discount(total: Decimal, discount: &PromoDiscount) -> Decimal {
    match discount.kind {
        DiscountKind::Percentage => total - total * discount.value / dec!(100),
        DiscountKind::Fixed => total - discount.value,
    }
}
