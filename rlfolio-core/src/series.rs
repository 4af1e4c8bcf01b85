//! Time series of returns and mean-reverting factors driving the environment.
use crate::error::RlfolioError;
use anyhow::{Context, Result};
use std::path::Path;

/// Returns of the traded asset and the factors predicting them.
///
/// `factors[t]` holds one value per half-life and is paired with `returns[t]`.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketSeries {
    returns: Vec<f64>,
    factors: Vec<Vec<f64>>,
    half_lives: Vec<f64>,
    f_speed: Vec<f64>,
}

impl MarketSeries {
    /// Builds a series, checking that every factor row has one value per half-life.
    ///
    /// The mean-reversion speed of each factor is `ln(2) / half_life`.
    pub fn new(
        returns: Vec<f64>,
        factors: Vec<Vec<f64>>,
        half_lives: Vec<f64>,
    ) -> Result<Self, RlfolioError> {
        if returns.len() < 2 {
            return Err(RlfolioError::SeriesShape(format!(
                "at least 2 returns are required, got {}",
                returns.len()
            )));
        }
        if returns.len() != factors.len() {
            return Err(RlfolioError::SeriesShape(format!(
                "{} returns but {} factor rows",
                returns.len(),
                factors.len()
            )));
        }
        if let Some((t, row)) = factors
            .iter()
            .enumerate()
            .find(|(_, row)| row.len() != half_lives.len())
        {
            return Err(RlfolioError::SeriesShape(format!(
                "factor row {} has {} values, expected {}",
                t,
                row.len(),
                half_lives.len()
            )));
        }
        if half_lives.iter().any(|hl| !(*hl > 0.0)) {
            return Err(RlfolioError::SeriesShape(
                "half-lives must be positive".into(),
            ));
        }

        let f_speed = half_lives.iter().map(|hl| 2f64.ln() / hl).collect();

        Ok(Self {
            returns,
            factors,
            half_lives,
            f_speed,
        })
    }

    /// Loads a series from a CSV file.
    ///
    /// The file must have a `returns` column and one `factor_<half_life>`
    /// column per factor; other columns (e.g. dates) are ignored.
    pub fn from_csv(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut rdr = csv::Reader::from_path(path)
            .with_context(|| format!("failed to open series {:?}", path))?;
        let headers = rdr.headers()?.clone();

        let ret_ix = headers
            .iter()
            .position(|h| h == "returns")
            .ok_or_else(|| RlfolioError::SeriesShape("missing `returns` column".into()))?;
        let mut factor_ix = vec![];
        let mut half_lives = vec![];
        for (i, h) in headers.iter().enumerate() {
            if let Some(hl) = h.strip_prefix("factor_") {
                let hl: f64 = hl
                    .parse()
                    .with_context(|| format!("invalid half-life in column {}", h))?;
                factor_ix.push(i);
                half_lives.push(hl);
            }
        }

        let mut returns = vec![];
        let mut factors = vec![];
        for row in rdr.records() {
            let row = row?;
            returns.push(row[ret_ix].trim().parse::<f64>()?);
            factors.push(
                factor_ix
                    .iter()
                    .map(|i| row[*i].trim().parse::<f64>())
                    .collect::<Result<Vec<_>, _>>()?,
            );
        }

        Ok(Self::new(returns, factors, half_lives)?)
    }

    /// Returns of the asset.
    pub fn returns(&self) -> &[f64] {
        &self.returns
    }

    /// Factor rows, one per time index.
    pub fn factors(&self) -> &[Vec<f64>] {
        &self.factors
    }

    /// Half-lives of the factors.
    pub fn half_lives(&self) -> &[f64] {
        &self.half_lives
    }

    /// Mean-reversion speeds of the factors.
    pub fn f_speed(&self) -> &[f64] {
        &self.f_speed
    }

    /// Length of the series.
    pub fn len(&self) -> usize {
        self.returns.len()
    }

    /// Always `false`, a series has at least two elements.
    pub fn is_empty(&self) -> bool {
        self.returns.is_empty()
    }

    /// Drops the first `n` time indices.
    pub(crate) fn skip(&self, n: usize) -> Self {
        Self {
            returns: self.returns[n..].to_vec(),
            factors: self.factors[n..].to_vec(),
            half_lives: self.half_lives.clone(),
            f_speed: self.f_speed.clone(),
        }
    }
}
