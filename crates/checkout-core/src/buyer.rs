//! Buyer Details & Validation
//!
//! Contact details collected on the checkout form and the rules applied
//! before an order is submitted.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern compiles"));

static PHONE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[0-9]{10}$").expect("phone pattern compiles"));

/// Buyer contact details for one checkout attempt
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuyerDetails {
    pub name: String,
    pub email: String,
    pub phone: String,
}

/// Form field identifiers
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BuyerField {
    Name,
    Email,
    Phone,
}

impl BuyerDetails {
    pub fn new(name: impl Into<String>, email: impl Into<String>, phone: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            phone: phone.into(),
        }
    }

    /// Update a single field as the buyer types
    pub fn set(&mut self, field: BuyerField, value: impl Into<String>) {
        let value = value.into();
        match field {
            BuyerField::Name => self.name = value,
            BuyerField::Email => self.email = value,
            BuyerField::Phone => self.phone = value,
        }
    }

    pub fn get(&self, field: BuyerField) -> &str {
        match field {
            BuyerField::Name => &self.name,
            BuyerField::Email => &self.email,
            BuyerField::Phone => &self.phone,
        }
    }

    /// Reset every field to an empty string
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn is_empty(&self) -> bool {
        self.name.is_empty() && self.email.is_empty() && self.phone.is_empty()
    }
}

/// Reasons a checkout form is rejected
///
/// The display strings are shown to the buyer as-is.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Please fill in all fields.")]
    MissingFields,

    #[error("Please enter a valid email.")]
    InvalidEmail,

    #[error("Please enter a valid 10-digit phone number.")]
    InvalidPhone,
}

/// Validate buyer details
///
/// Rules run in order and stop at the first failure: presence, email shape,
/// then phone shape.
pub fn validate(details: &BuyerDetails) -> Result<(), ValidationError> {
    let missing = [&details.name, &details.email, &details.phone]
        .iter()
        .any(|field| field.trim().is_empty());
    if missing {
        return Err(ValidationError::MissingFields);
    }

    if !is_valid_email(&details.email) {
        return Err(ValidationError::InvalidEmail);
    }

    if !is_valid_phone(&details.phone) {
        return Err(ValidationError::InvalidPhone);
    }

    Ok(())
}

/// `local@domain.tld`, no whitespace, exactly one `@`
pub fn is_valid_email(email: &str) -> bool {
    EMAIL.is_match(email)
}

/// Exactly ten ASCII digits
pub fn is_valid_phone(phone: &str) -> bool {
    PHONE.is_match(phone)
}
