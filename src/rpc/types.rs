//! Request and response messages of the backend services.
//!
//! Field names follow the protobuf JSON mapping (lowerCamelCase) and every
//! field tolerates being omitted, as proto3 JSON drops default values.

use std::fmt;

use serde::{Deserialize, Serialize};

const NANOS_PER_UNIT: i64 = 1_000_000_000;

/// An amount of money in one currency.
///
/// `nanos` is the fractional part in billionths and always lies in
/// `[0, 1_000_000_000)`. Decoding goes through [`Money::new`], so a backend
/// answer outside that range is a decode error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", try_from = "RawMoney")]
pub struct Money {
    pub currency_code: String,
    pub units: i64,
    pub nanos: i32,
}

/// Wire shape of [`Money`] before validation.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawMoney {
    #[serde(default)]
    currency_code: String,
    #[serde(default)]
    units: i64,
    #[serde(default)]
    nanos: i32,
}

impl TryFrom<RawMoney> for Money {
    type Error = MoneyError;

    fn try_from(raw: RawMoney) -> Result<Self, Self::Error> {
        Money::new(raw.currency_code, raw.units, raw.nanos)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MoneyError {
    #[error("nanos {0} out of range [0, 1000000000)")]
    NanosOutOfRange(i64),
    #[error("currency mismatch: {0} vs {1}")]
    CurrencyMismatch(String, String),
    #[error("amount overflows")]
    Overflow,
}

impl Money {
    pub fn new(currency_code: impl Into<String>, units: i64, nanos: i32) -> Result<Self, MoneyError> {
        if !(0..NANOS_PER_UNIT).contains(&i64::from(nanos)) {
            return Err(MoneyError::NanosOutOfRange(i64::from(nanos)));
        }
        Ok(Self {
            currency_code: currency_code.into(),
            units,
            nanos,
        })
    }

    pub fn zero(currency_code: impl Into<String>) -> Self {
        Self {
            currency_code: currency_code.into(),
            units: 0,
            nanos: 0,
        }
    }

    /// Add two amounts of the same currency.
    pub fn sum(&self, other: &Money) -> Result<Money, MoneyError> {
        if self.currency_code != other.currency_code {
            return Err(MoneyError::CurrencyMismatch(
                self.currency_code.clone(),
                other.currency_code.clone(),
            ));
        }
        Self::from_total_nanos(
            &self.currency_code,
            self.total_nanos() + other.total_nanos(),
        )
    }

    /// Multiply by a whole quantity, e.g. a line item price by its count.
    pub fn multiply(&self, factor: u32) -> Result<Money, MoneyError> {
        Self::from_total_nanos(&self.currency_code, self.total_nanos() * i128::from(factor))
    }

    fn total_nanos(&self) -> i128 {
        i128::from(self.units) * i128::from(NANOS_PER_UNIT) + i128::from(self.nanos)
    }

    fn from_total_nanos(code: &str, total: i128) -> Result<Money, MoneyError> {
        let per = i128::from(NANOS_PER_UNIT);
        let units = i64::try_from(total.div_euclid(per)).map_err(|_| MoneyError::Overflow)?;
        // rem_euclid keeps nanos non-negative even for negative totals.
        let nanos = total.rem_euclid(per) as i32;
        Ok(Money {
            currency_code: code.to_owned(),
            units,
            nanos,
        })
    }
}

impl fmt::Display for Money {
    /// `USD 5.99`: two decimals, truncated.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {}.{:02}",
            self.currency_code,
            self.units,
            self.nanos / 10_000_000
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    #[serde(default)]
    pub product_id: String,
    #[serde(default)]
    pub quantity: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub picture: String,
    pub price_usd: Option<Money>,
    #[serde(default)]
    pub categories: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Ad {
    #[serde(default)]
    pub redirect_url: String,
    #[serde(default)]
    pub text: String,
}

// ---------------------------------------------------------------------------
// Wire messages
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Empty {}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetSupportedCurrenciesResponse {
    #[serde(default)]
    pub currency_codes: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ListProductsResponse {
    #[serde(default)]
    pub products: Vec<Product>,
}

#[derive(Debug, Serialize)]
pub struct GetProductRequest<'a> {
    pub id: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserRequest<'a> {
    pub user_id: &'a str,
}

#[derive(Debug, Deserialize)]
pub struct Cart {
    #[serde(default)]
    pub items: Vec<CartItem>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AddItemRequest<'a> {
    pub user_id: &'a str,
    pub item: CartItem,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurrencyConversionRequest<'a> {
    pub from: &'a Money,
    pub to_code: &'a str,
}

#[derive(Debug, Serialize)]
pub struct GetQuoteRequest<'a> {
    /// The frontend never knows the address at quote time.
    pub address: Option<()>,
    pub items: &'a [CartItem],
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetQuoteResponse {
    pub cost_usd: Option<Money>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListRecommendationsRequest<'a> {
    pub user_id: &'a str,
    pub product_ids: &'a [String],
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListRecommendationsResponse {
    #[serde(default)]
    pub product_ids: Vec<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AdRequest<'a> {
    pub context_keys: &'a [String],
}

#[derive(Debug, Deserialize)]
pub struct AdResponse {
    #[serde(default)]
    pub ads: Vec<Ad>,
}
