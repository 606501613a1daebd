use std::{
    fmt::Display,
    iter::Sum,
    ops::{Add, AddAssign, Div, Neg, Sub, SubAssign},
    str::FromStr,
};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sqlx::{
    encode::IsNull,
    error::BoxDynError,
    sqlite::{SqliteArgumentValue, SqliteTypeInfo, SqliteValueRef},
    Decode, Encode, Sqlite, Type,
};
use thiserror::Error;

pub const EVR_ASSET_NAME: &str = "EVR";
pub const EVR_ASSET_NAME_LOWER: &str = "evr";

//--------------------------------------    AssetAmount     ----------------------------------------------------------
/// An arbitrary-precision quantity of some on-chain asset.
///
/// Amounts are stored in the database as canonical decimal text, so they round-trip without any loss of precision.
/// The SQLite driver has no native decimal type, which is why the [`Type`]/[`Encode`]/[`Decode`] implementations are
/// written out by hand rather than derived.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssetAmount(Decimal);

impl AssetAmount {
    pub fn value(&self) -> Decimal {
        self.0
    }

    pub fn zero() -> Self {
        Self(Decimal::ZERO)
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    pub fn is_negative(&self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    /// Clamp negative values to zero, leaving non-negative values untouched.
    pub fn clamp_non_negative(self) -> Self {
        if self.is_negative() {
            Self::zero()
        } else {
            self
        }
    }
}

#[derive(Debug, Clone, Error)]
#[error("Value cannot be represented as an asset amount: {0}")]
pub struct AssetAmountConversionError(String);

impl From<Decimal> for AssetAmount {
    fn from(value: Decimal) -> Self {
        Self(value)
    }
}

impl From<i64> for AssetAmount {
    fn from(value: i64) -> Self {
        Self(Decimal::from(value))
    }
}

impl FromStr for AssetAmount {
    type Err = AssetAmountConversionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value = Decimal::from_str(s.trim()).map_err(|e| AssetAmountConversionError(format!("{s}: {e}")))?;
        Ok(Self(value))
    }
}

impl Display for AssetAmount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0.normalize())
    }
}

impl Add for AssetAmount {
    type Output = Self;

    fn add(self, rhs: Self) -> Self::Output {
        Self(self.0 + rhs.0)
    }
}

impl Sub for AssetAmount {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self(self.0 - rhs.0)
    }
}

impl AddAssign for AssetAmount {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl SubAssign for AssetAmount {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 -= rhs.0;
    }
}

impl Neg for AssetAmount {
    type Output = Self;

    fn neg(self) -> Self::Output {
        Self(-self.0)
    }
}

impl Div<i64> for AssetAmount {
    type Output = Self;

    fn div(self, rhs: i64) -> Self::Output {
        Self(self.0 / Decimal::from(rhs))
    }
}

impl Sum for AssetAmount {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Self::default(), Add::add)
    }
}

impl Type<Sqlite> for AssetAmount {
    fn type_info() -> SqliteTypeInfo {
        <String as Type<Sqlite>>::type_info()
    }

    fn compatible(ty: &SqliteTypeInfo) -> bool {
        <String as Type<Sqlite>>::compatible(ty)
    }
}

impl<'q> Encode<'q, Sqlite> for AssetAmount {
    fn encode_by_ref(&self, args: &mut Vec<SqliteArgumentValue<'q>>) -> IsNull {
        args.push(SqliteArgumentValue::Text(std::borrow::Cow::Owned(self.0.to_string())));
        IsNull::No
    }
}

impl<'r> Decode<'r, Sqlite> for AssetAmount {
    fn decode(value: SqliteValueRef<'r>) -> Result<Self, BoxDynError> {
        let text = <&str as Decode<Sqlite>>::decode(value)?;
        let value = Decimal::from_str(text)?;
        Ok(Self(value))
    }
}
