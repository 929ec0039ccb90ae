//! Discount code redemption ledger.

use rusqlite::{Connection, TransactionBehavior};

use crate::db::queries;
use crate::error::Result;
use crate::models::{
    AppliedDiscount, DiscountCode, DiscountInfo, DiscountKind, discount_amount, round_cents,
};

#[derive(Debug, Clone, PartialEq)]
pub enum UsageOutcome {
    /// New usage entry written and count incremented
    Recorded { usage_count: i64 },
    /// This purchase already used the code; nothing changed
    AlreadyRecorded,
    /// No code with that name exists
    UnknownCode,
}

/// Human-readable summary stored on purchases: "CODE (-20%)" or "CODE (-500)".
pub fn summary(code: &str, kind: DiscountKind, value: f64) -> String {
    match kind {
        DiscountKind::Percentage => format!("{} (-{}%)", code, value),
        DiscountKind::Fixed => format!("{} (-{})", code, value),
    }
}

/// Resolve the discount recorded on a purchase from its metadata.
pub fn applied(info: &DiscountInfo, original_price: f64, price: f64) -> AppliedDiscount {
    let code = info.code.trim().to_uppercase();
    AppliedDiscount {
        summary: summary(&code, info.kind, info.value),
        amount: round_cents((original_price - price).max(0.0)),
        code,
        kind: info.kind,
        value: info.value,
    }
}

/// Price after applying `code` to `original_price`, floored at zero.
pub fn discounted_price(code: &DiscountCode, original_price: f64) -> f64 {
    round_cents((original_price - discount_amount(code.kind, code.value, original_price)).max(0.0))
}

/// Price quoted for a new purchase, or `None` when `code` is inactive or expired.
///
/// The usage limit is a soft limit: a code past it still applies and the
/// overuse is logged for manual audit.
pub fn quote(code: &DiscountCode, original_price: f64, now: i64) -> Option<f64> {
    if !code.is_redeemable(now) {
        return None;
    }
    if let Some(limit) = code.usage_limit.filter(|limit| code.usage_count >= *limit) {
        tracing::warn!(
            code = %code.code,
            usage_count = code.usage_count,
            limit,
            "Discount code quoted past its usage limit"
        );
    }
    Some(discounted_price(code, original_price))
}

/// Record that `purchase_id` redeemed `code`.
///
/// The usage entry and the count increment commit together, and only the
/// first call per (code, purchase) changes anything, so gateway redelivery
/// never double-counts. A payment that already went through is always
/// recorded; an over-limit count is only logged.
pub fn record_usage(
    conn: &mut Connection,
    code: &str,
    buyer_email: &str,
    purchase_id: &str,
    amount: f64,
) -> Result<UsageOutcome> {
    let normalized = code.trim().to_uppercase();

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

    let Some(discount) = queries::get_discount_code_by_code(&tx, &normalized)? else {
        tracing::warn!(code = %normalized, purchase_id, "Discount code not found, usage not recorded");
        return Ok(UsageOutcome::UnknownCode);
    };

    if !queries::try_insert_discount_usage(&tx, &discount.id, buyer_email, purchase_id, amount)? {
        return Ok(UsageOutcome::AlreadyRecorded);
    }

    let usage_count = queries::increment_discount_usage(&tx, &discount.id)?;
    tx.commit()?;

    if let Some(limit) = discount.usage_limit.filter(|limit| usage_count > *limit) {
        tracing::warn!(
            code = %normalized,
            usage_count,
            limit,
            "Discount code used beyond its usage limit"
        );
    }

    tracing::info!(code = %normalized, purchase_id, usage_count, "Discount usage recorded");
    Ok(UsageOutcome::Recorded { usage_count })
}
