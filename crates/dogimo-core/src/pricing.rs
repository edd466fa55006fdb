//! Static per-model price table.
//!
//! Prices are USD per million tokens. The table is read-only once the bot is
//! running; an unknown model is rejected when the config is loaded.

use std::{collections::BTreeMap, fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::{errors::Error, Result};

/// Price of one model, per million tokens.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelPrice {
    #[serde(rename = "in")]
    pub input: f64,
    #[serde(rename = "out")]
    pub output: f64,
}

impl ModelPrice {
    pub const fn new(input: f64, output: f64) -> Self {
        Self { input, output }
    }

    /// Cost in USD of a call with the given token counts.
    pub fn cost(&self, input_tokens: u64, output_tokens: u64) -> f64 {
        let input_cost = (input_tokens as f64 / 1_000_000.0) * self.input;
        let output_cost = (output_tokens as f64 / 1_000_000.0) * self.output;
        input_cost + output_cost
    }
}

const BUILTIN: &[(&str, ModelPrice)] = &[
    ("gpt-3.5-turbo-0125", ModelPrice::new(0.5, 1.5)),
    ("gpt-3.5-turbo", ModelPrice::new(0.5, 1.5)),
    ("gpt-4-turbo", ModelPrice::new(10.0, 30.0)),
    ("gpt-4o", ModelPrice::new(5.0, 15.0)),
    ("gpt-4o-mini", ModelPrice::new(0.15, 0.6)),
];

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PricingTable {
    models: BTreeMap<String, ModelPrice>,
}

impl PricingTable {
    /// Prices for the OpenAI chat models the bot knows about.
    pub fn builtin() -> Self {
        BUILTIN.iter().map(|(m, p)| (m.to_string(), *p)).collect()
    }

    /// Parse a JSON object of the form `{"model": {"in": 0.5, "out": 1.5}}`.
    pub fn from_json(json: &str) -> Result<Self> {
        let table: Self = serde_json::from_str(json)?;
        if table.models.is_empty() {
            return Err(Error::Config("pricing table is empty".to_string()));
        }
        if let Some((model, _)) = table
            .models
            .iter()
            .find(|(_, p)| !(p.input >= 0.0 && p.output >= 0.0))
        {
            return Err(Error::Config(format!(
                "pricing for {model} must be non-negative"
            )));
        }
        Ok(table)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)?;
        Self::from_json(&raw)
    }

    pub fn insert(&mut self, model: impl Into<String>, price: ModelPrice) {
        self.models.insert(model.into(), price);
    }

    pub fn price_for(&self, model: &str) -> Result<ModelPrice> {
        self.models.get(model).copied().ok_or_else(|| {
            Error::Config(format!(
                "unknown model {model}. Valid models: {}",
                self.models().collect::<Vec<_>>().join(", ")
            ))
        })
    }

    pub fn models(&self) -> impl Iterator<Item = &str> {
        self.models.keys().map(String::as_str)
    }
}

impl FromIterator<(String, ModelPrice)> for PricingTable {
    fn from_iter<I: IntoIterator<Item = (String, ModelPrice)>>(iter: I) -> Self {
        Self {
            models: iter.into_iter().collect(),
        }
    }
}
