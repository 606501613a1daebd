mod amount;

pub use amount::{AssetAmount, AssetAmountConversionError, EVR_ASSET_NAME, EVR_ASSET_NAME_LOWER};
