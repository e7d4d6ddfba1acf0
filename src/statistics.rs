use crate::consts::BUSINESS_DAYS;
use crate::evolution::EvolutionError;
use statrs::statistics::Statistics;

/// Annualized expected returns and covariance from a price history.
///
/// `prices` holds one row per period and one column per asset. Expected
/// returns are the geometric mean of simple returns compounded over
/// [`BUSINESS_DAYS`]; the covariance is the sample covariance of the simple
/// returns scaled by the same factor.
pub fn annualized_statistics(
    prices: &[Vec<f64>],
) -> Result<(Vec<f64>, Vec<Vec<f64>>), EvolutionError> {
    if prices.len() < 3 {
        return Err(EvolutionError::Configuration(format!(
            "Need at least 3 price rows to estimate a covariance, got {}",
            prices.len()
        )));
    }
    let assets = prices[0].len();
    if assets == 0 || prices.iter().any(|row| row.len() != assets) {
        return Err(EvolutionError::Configuration(
            "Price history must be a non-empty rectangular matrix".into(),
        ));
    }
    if prices.iter().flatten().any(|p| !p.is_finite() || *p <= 0.) {
        return Err(EvolutionError::Configuration(
            "Prices must be finite and strictly positive".into(),
        ));
    }

    // one column of simple returns per asset
    let returns: Vec<Vec<f64>> = (0..assets)
        .map(|asset| {
            prices
                .windows(2)
                .map(|pair| pair[1][asset] / pair[0][asset] - 1.)
                .collect()
        })
        .collect();
    let periods = returns[0].len() as f64;

    let mu = returns
        .iter()
        .map(|column| {
            let growth = column.iter().map(|r| 1. + r).product::<f64>();
            growth.powf(BUSINESS_DAYS / periods) - 1.
        })
        .collect::<Vec<f64>>();

    let mut cov = vec![vec![0.; assets]; assets];
    for i in 0..assets {
        for j in i..assets {
            let value = returns[i].iter().covariance(returns[j].iter()) * BUSINESS_DAYS;
            cov[i][j] = value;
            cov[j][i] = value;
        }
    }

    Ok((mu, cov))
}
