/// Tolerance used wherever two floats are compared for "sameness".
pub const FLOAT_COMPARISON_EPSILON: f64 = 1e-9;

/// Weights below this value are considered noise and zeroed by the repair step.
pub const REPAIR_THRESHOLD: f64 = 1e-3;

/// Trading days used to annualize daily statistics.
pub const BUSINESS_DAYS: f64 = 252.;

pub const DEFAULT_RISK_FREE_RATE: f64 = 0.02;

// Gene bounds for the variation operators
pub const GENE_LOWER_BOUND: f64 = 0.;
pub const GENE_UPPER_BOUND: f64 = 1.;

/// Max per-gene distance under which two genomes are treated as duplicates.
pub const DUPLICATE_TOLERANCE: f64 = 1e-8;
