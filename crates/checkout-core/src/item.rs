//! Purchasable Items
//!
//! Courses and products share one checkout; only the wire framing and the
//! unlocked destination differ.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::error::{CheckoutError, Result};

/// Kind of purchasable item
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Course,
    Product,
}

impl ItemKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Course => "course",
            Self::Product => "product",
        }
    }

    /// Query parameter carrying the item id on the success return URL
    pub const fn return_param(self) -> &'static str {
        match self {
            Self::Course => "course_id",
            Self::Product => "product_id",
        }
    }
}

/// A course or product offered for sale
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub kind: ItemKind,
    pub id: String,
    pub name: String,
    #[serde(with = "crate::amount")]
    pub price: Decimal,
    /// Community link handed over after purchase (products only)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub telegram_link: Option<String>,
}

impl Item {
    pub fn course(id: impl Into<String>, name: impl Into<String>, price: Decimal) -> Self {
        Self {
            kind: ItemKind::Course,
            id: id.into(),
            name: name.into(),
            price,
            telegram_link: None,
        }
    }

    pub fn product(id: impl Into<String>, name: impl Into<String>, price: Decimal) -> Self {
        Self {
            kind: ItemKind::Product,
            id: id.into(),
            name: name.into(),
            price,
            telegram_link: None,
        }
    }

    #[must_use]
    pub fn with_telegram_link(mut self, link: impl Into<String>) -> Self {
        self.telegram_link = Some(link.into());
        self
    }

    /// Build an item from checkout page query parameters
    ///
    /// Accepts the course framing (`courseId`, `courseName`, `amount`) or the
    /// product framing (`productId`, `productName`, `amount`, `telegramLink`).
    pub fn from_query<I, K, V>(pairs: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut kind = None;
        let mut id = None;
        let mut name = None;
        let mut amount = None;
        let mut telegram_link = None;

        for (key, value) in pairs {
            let value = value.as_ref().trim().to_string();
            match key.as_ref() {
                "courseId" => {
                    kind = Some(ItemKind::Course);
                    id = Some(value);
                }
                "productId" => {
                    kind.get_or_insert(ItemKind::Product);
                    id.get_or_insert(value);
                }
                "courseName" | "productName" => name = Some(value),
                "amount" => amount = Some(value),
                "telegramLink" if !value.is_empty() => telegram_link = Some(value),
                _ => {}
            }
        }

        let kind = kind.ok_or_else(|| CheckoutError::InvalidItem("no item selected".into()))?;
        let price = amount
            .as_deref()
            .ok_or_else(|| CheckoutError::InvalidItem("missing amount".into()))?
            .parse::<Decimal>()
            .map_err(|_| CheckoutError::InvalidItem("amount is not a number".into()))?;

        let item = Self {
            kind,
            id: id.unwrap_or_default(),
            name: name.unwrap_or_default(),
            price,
            telegram_link,
        };
        item.ensure_purchasable()?;
        Ok(item)
    }

    /// Items need an id, a name and a positive price
    pub fn ensure_purchasable(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(CheckoutError::InvalidItem("missing item id".into()));
        }
        if self.name.trim().is_empty() {
            return Err(CheckoutError::InvalidItem(format!("item {} has no name", self.id)));
        }
        if self.price <= Decimal::ZERO {
            return Err(CheckoutError::InvalidItem(format!(
                "item {} has non-positive price {}",
                self.id, self.price
            )));
        }
        Ok(())
    }

    /// Where the buyer goes once the item is unlocked
    pub fn content_location(&self, buyer_key: &str) -> String {
        match (self.kind, &self.telegram_link) {
            (ItemKind::Product, Some(link)) => link.clone(),
            (ItemKind::Product, None) => format!("/products/{}", self.id),
            (ItemKind::Course, _) => format!("/my-courses/{buyer_key}/{}", self.id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_course_from_query() {
        let item = Item::from_query([
            ("courseId", "42"),
            ("courseName", "Algebra I"),
            ("amount", "499"),
        ])
        .unwrap();
        assert_eq!(item, Item::course("42", "Algebra I", dec!(499)));
    }

    #[test]
    fn test_product_from_query_keeps_link() {
        let item = Item::from_query([
            ("productId", "7"),
            ("productName", "NEET Notes"),
            ("amount", "10.5"),
            ("telegramLink", "https://t.me/notes"),
        ])
        .unwrap();
        assert_eq!(item.kind, ItemKind::Product);
        assert_eq!(item.price, dec!(10.5));
        assert_eq!(item.content_location("u1"), "https://t.me/notes");
    }

    #[test]
    fn test_non_positive_price_rejected() {
        let err = Item::from_query([("courseId", "1"), ("courseName", "Free"), ("amount", "0")])
            .unwrap_err();
        assert!(matches!(err, CheckoutError::InvalidItem(_)));
    }

    #[test]
    fn test_missing_item_rejected() {
        let err = Item::from_query([("amount", "10")]).unwrap_err();
        assert!(matches!(err, CheckoutError::InvalidItem(_)));
    }

    #[test]
    fn test_course_unlocks_under_my_courses() {
        let item = Item::course("42", "Algebra I", dec!(499));
        assert_eq!(item.content_location("u1"), "/my-courses/u1/42");
    }
}
