//! Order draft validation
//!
//! Checked once at checkout, before anything is written.

use rust_decimal::Decimal;
use shared::order::OrderDraft;
use shared::order::types::ShippingAddress;

use super::manager::{ManagerError, ManagerResult};

// ── Text length limits ──────────────────────────────────────────────

/// Customer and product names
pub const MAX_NAME_LEN: usize = 200;

/// Email addresses (RFC 5321)
pub const MAX_EMAIL_LEN: usize = 254;

/// Address fields
pub const MAX_ADDRESS_LEN: usize = 500;

/// Short identifiers: phone, postal code, product id
pub const MAX_SHORT_TEXT_LEN: usize = 100;

/// Timeline descriptions and locations
pub const MAX_NOTE_LEN: usize = 500;

// ── Helpers ─────────────────────────────────────────────────────────

/// Validate that a required string is non-empty and within the length limit.
pub fn validate_required_text(value: &str, field: &str, max_len: usize) -> ManagerResult<()> {
    if value.trim().is_empty() {
        return Err(ManagerError::Validation(format!("{field} must not be empty")));
    }
    if value.len() > max_len {
        return Err(ManagerError::Validation(format!(
            "{field} is too long ({} chars, max {max_len})",
            value.len()
        )));
    }
    Ok(())
}

/// Validate that an optional string, if present, is within the length limit.
pub fn validate_optional_text(
    value: &Option<String>,
    field: &str,
    max_len: usize,
) -> ManagerResult<()> {
    if let Some(v) = value
        && v.len() > max_len
    {
        return Err(ManagerError::Validation(format!(
            "{field} is too long ({} chars, max {max_len})",
            v.len()
        )));
    }
    Ok(())
}

fn validate_amount(value: Decimal, field: &str) -> ManagerResult<()> {
    if value.is_sign_negative() && !value.is_zero() {
        return Err(ManagerError::Validation(format!(
            "{field} must not be negative (got {value})"
        )));
    }
    Ok(())
}

fn validate_address(address: &ShippingAddress) -> ManagerResult<()> {
    validate_required_text(&address.name, "shipping_address.name", MAX_NAME_LEN)?;
    validate_required_text(
        &address.address_line1,
        "shipping_address.address_line1",
        MAX_ADDRESS_LEN,
    )?;
    validate_optional_text(
        &address.address_line2,
        "shipping_address.address_line2",
        MAX_ADDRESS_LEN,
    )?;
    validate_required_text(&address.city, "shipping_address.city", MAX_ADDRESS_LEN)?;
    validate_optional_text(&address.region, "shipping_address.region", MAX_ADDRESS_LEN)?;
    validate_required_text(
        &address.postal_code,
        "shipping_address.postal_code",
        MAX_SHORT_TEXT_LEN,
    )?;
    validate_required_text(&address.country, "shipping_address.country", MAX_ADDRESS_LEN)?;
    validate_required_text(&address.phone, "shipping_address.phone", MAX_SHORT_TEXT_LEN)?;
    validate_optional_text(&address.email, "shipping_address.email", MAX_EMAIL_LEN)?;
    Ok(())
}

/// Validate a checkout draft
pub fn validate_draft(draft: &OrderDraft) -> ManagerResult<()> {
    validate_required_text(&draft.customer_name, "customer_name", MAX_NAME_LEN)?;
    validate_required_text(&draft.customer_email, "customer_email", MAX_EMAIL_LEN)?;
    if !draft.customer_email.contains('@') {
        return Err(ManagerError::Validation(format!(
            "customer_email is not a valid address: {}",
            draft.customer_email
        )));
    }

    if draft.items.is_empty() {
        return Err(ManagerError::Validation(
            "Order must contain at least one item".to_string(),
        ));
    }
    for (i, item) in draft.items.iter().enumerate() {
        validate_required_text(
            &item.product_id,
            &format!("items[{i}].product_id"),
            MAX_SHORT_TEXT_LEN,
        )?;
        validate_required_text(&item.name, &format!("items[{i}].name"), MAX_NAME_LEN)?;
        if item.quantity == 0 {
            return Err(ManagerError::Validation(format!(
                "items[{i}].quantity must be at least 1"
            )));
        }
        validate_amount(item.unit_price, &format!("items[{i}].unit_price"))?;
    }

    validate_amount(draft.subtotal, "subtotal")?;
    validate_amount(draft.shipping_cost, "shipping_cost")?;
    validate_amount(draft.tax, "tax")?;
    validate_amount(draft.total, "total")?;

    let expected = draft.subtotal + draft.shipping_cost + draft.tax;
    if draft.total != expected {
        return Err(ManagerError::Validation(format!(
            "total {} does not equal subtotal + shipping_cost + tax ({expected})",
            draft.total
        )));
    }

    validate_address(&draft.shipping_address)
}
