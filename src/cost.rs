//! Token cost accounting.

use std::sync::LazyLock;
use tiktoken_rs::CoreBPE;
use tracing::{error, warn};

use crate::config::DEFAULT_OPENAI_MODEL;
use crate::error::CostError;
use crate::schema::TokenCostInfo;

/// Both priced models (and the fallback for unknown ones) use `o200k_base`.
static ENCODER: LazyLock<Option<CoreBPE>> = LazyLock::new(|| match tiktoken_rs::o200k_base() {
    Ok(bpe) => Some(bpe),
    Err(e) => {
        error!("Failed to load o200k_base tokenizer: {}", e);
        None
    }
});

/// USD per 1000 tokens.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelPrice {
    pub input: f64,
    pub output: f64,
}

const PRICES: &[(&str, ModelPrice)] = &[
    ("gpt-4o-mini", ModelPrice { input: 0.15, output: 0.6 }),
    ("gpt-4o", ModelPrice { input: 5.0, output: 15.0 }),
];

pub fn model_price(model: &str) -> Option<ModelPrice> {
    PRICES
        .iter()
        .find(|(name, _)| *name == model)
        .map(|(_, price)| *price)
}

/// Number of tokens `text` encodes to.
pub fn count_tokens(text: &str) -> Result<u64, CostError> {
    let encoder = ENCODER.as_ref().ok_or(CostError::TokenizerUnavailable)?;
    Ok(encoder.encode_ordinary(text).len() as u64)
}

/// Tokenize both texts and price the result.
pub fn estimate_token_cost(
    input_text: &str,
    output_text: &str,
    model: &str,
    exchange_rate: f64,
) -> Result<TokenCostInfo, CostError> {
    calculate_token_cost(
        count_tokens(input_text)?,
        count_tokens(output_text)?,
        model,
        exchange_rate,
    )
}

/// Compute usage and cost. Unknown models are billed (and reported) as the
/// default model. `cost_krw` is derived from the already rounded `cost_usd`.
pub fn calculate_token_cost(
    input_tokens: u64,
    output_tokens: u64,
    model: &str,
    exchange_rate: f64,
) -> Result<TokenCostInfo, CostError> {
    let total_tokens = input_tokens
        .checked_add(output_tokens)
        .ok_or(CostError::Overflow {
            input: input_tokens,
            output: output_tokens,
        })?;

    let (model, price) = match model_price(model) {
        Some(price) => (model, price),
        None => {
            warn!(
                "Unknown model {:?}, using {} pricing",
                model, DEFAULT_OPENAI_MODEL
            );
            let price = model_price(DEFAULT_OPENAI_MODEL).unwrap_or(PRICES[0].1);
            (DEFAULT_OPENAI_MODEL, price)
        }
    };

    let cost_usd = round_to(
        (input_tokens as f64 / 1000.0) * price.input
            + (output_tokens as f64 / 1000.0) * price.output,
        6,
    );

    Ok(TokenCostInfo {
        input_tokens,
        output_tokens,
        total_tokens,
        cost_usd,
        cost_krw: round_to(cost_usd * exchange_rate, 2),
        model: model.to_string(),
    })
}

fn round_to(value: f64, digits: i32) -> f64 {
    let factor = 10f64.powi(digits);
    (value * factor).round() / factor
}
