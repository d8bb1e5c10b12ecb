// src/utils/constants.rs

/// Metadata priority used when no explicit ranking is configured, highest first.
pub const DEFAULT_SOURCE_PRIORITY: [&str; 6] = [
    "site_data",
    "chemical_data",
    "fish_data",
    "updated_chemical_data",
    "macro_data",
    "habitat_data",
];

/// Coordinate-cluster preference, highest first. Recent chemical monitoring
/// wins over legacy chemical; everything else ranks below both.
pub const DEFAULT_CLUSTER_RANKING: [&str; 2] = ["updated_chemical_data", "chemical_data"];

/// Decimal places of the coordinate grid (~110 m at 3).
pub const DEFAULT_COORDINATE_PRECISION: u32 = 3;
pub const MAX_COORDINATE_PRECISION: u32 = 8;

/// Years searched on each side of a fish group's nominal year.
pub const DEFAULT_REPLICATE_YEAR_WINDOW: i32 = 1;

pub const DEFAULT_CHUNK_SIZE: usize = 500;

// --- Chemical ---

pub const NEUTRAL_PH: f64 = 7.0;
pub const PH_MIN: f64 = 0.0;
pub const PH_MAX: f64 = 14.0;

/// Below-detection-limit substitutes for the soluble nitrogen sum.
pub const NITRATE_BDL: f64 = 0.3;
pub const NITRITE_BDL: f64 = 0.03;
pub const AMMONIA_BDL: f64 = 0.03;

// --- Biological ---

/// Placeholder values used by field sheets for "not measured".
pub const BIOLOGICAL_SENTINELS: [f64; 2] = [-999.0, -99.0];

/// Habitat grade lower bounds on the rounded total score.
pub const HABITAT_GRADE_BANDS: [(f64, &str); 4] = [(90.0, "A"), (80.0, "B"), (70.0, "C"), (60.0, "D")];
pub const HABITAT_GRADE_FLOOR: &str = "F";

/// Fish integrity class lower bounds on comparison-to-reference percent.
pub const FISH_INTEGRITY_BANDS: [(f64, &str); 4] = [
    (97.0, "Excellent"),
    (76.0, "Good"),
    (60.0, "Fair"),
    (47.0, "Poor"),
];
pub const FISH_INTEGRITY_FLOOR: &str = "Very Poor";
