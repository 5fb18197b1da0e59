use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ProviderDescriptor;

/// Response layout of a provider, and how to pull `(price, volume)` out of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuoteSchema {
    /// `{"bitcoin":{"usd":..,"usd_24h_vol":..}}`
    CoingeckoSimple,
    /// `{"lastPrice":"..","quoteVolume":".."}`
    #[serde(rename = "binance_ticker_24h")]
    BinanceTicker24h,
    /// `{"data":{"priceUsd":"..","volumeUsd24Hr":".."}}`
    CoincapAsset,
}

impl QuoteSchema {
    /// Extract finite `(price_usd, volume_usd_24h)`, or `None` if the body does
    /// not match.
    pub fn extract(self, body: &Value) -> Option<(f64, f64)> {
        let (price, volume) = match self {
            Self::CoingeckoSimple => {
                let coin = body.get("bitcoin")?;
                (coin.get("usd")?, coin.get("usd_24h_vol")?)
            }
            Self::BinanceTicker24h => (body.get("lastPrice")?, body.get("quoteVolume")?),
            Self::CoincapAsset => {
                let data = body.get("data")?;
                (data.get("priceUsd")?, data.get("volumeUsd24Hr")?)
            }
        };
        let price = number(price)?;
        let volume = number(volume)?;
        (price > 0.0 && volume >= 0.0).then_some((price, volume))
    }
}

impl fmt::Display for QuoteSchema {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::CoingeckoSimple => "coingecko_simple",
            Self::BinanceTicker24h => "binance_ticker_24h",
            Self::CoincapAsset => "coincap_asset",
        })
    }
}

/// Numbers may arrive as JSON numbers or numeric strings.
fn number(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    parsed.is_finite().then_some(parsed)
}

/// Built-in chain: CoinGecko, then Binance, then CoinCap.
pub fn default_providers() -> Vec<ProviderDescriptor> {
    vec![
        ProviderDescriptor {
            name: "coingecko".to_string(),
            url: "https://api.coingecko.com/api/v3/simple/price?ids=bitcoin&vs_currencies=usd&include_24hr_vol=true"
                .to_string(),
            schema: QuoteSchema::CoingeckoSimple,
        },
        ProviderDescriptor {
            name: "binance".to_string(),
            url: "https://api.binance.com/api/v3/ticker/24hr?symbol=BTCUSDT".to_string(),
            schema: QuoteSchema::BinanceTicker24h,
        },
        ProviderDescriptor {
            name: "coincap".to_string(),
            url: "https://api.coincap.io/v2/assets/bitcoin".to_string(),
            schema: QuoteSchema::CoincapAsset,
        },
    ]
}
