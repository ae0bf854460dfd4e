use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};

use crate::errors::PipelineError;

/// Geographic granularity of aggregation and display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Resolution {
    Postcode,
    StateElectorate,
    FederalElectorate,
    State,
}

impl Resolution {
    pub const ALL: [Resolution; 4] = [
        Resolution::Postcode,
        Resolution::StateElectorate,
        Resolution::FederalElectorate,
        Resolution::State,
    ];

    pub fn valid_names() -> Vec<String> {
        Self::ALL.iter().map(|r| r.to_string()).collect()
    }
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Resolution::Postcode => "Postcode",
            Resolution::StateElectorate => "StateElectorate",
            Resolution::FederalElectorate => "FederalElectorate",
            Resolution::State => "State",
        };
        write!(f, "{name}")
    }
}

impl FromStr for Resolution {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Postcode" => Ok(Resolution::Postcode),
            "StateElectorate" => Ok(Resolution::StateElectorate),
            "FederalElectorate" => Ok(Resolution::FederalElectorate),
            "State" => Ok(Resolution::State),
            other => Err(PipelineError::UnsupportedResolution {
                resolution: other.to_string(),
                valid: Resolution::valid_names(),
            }),
        }
    }
}

/// Calendar bucket used for the aggregation axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeGranularity {
    Month,
    Quarter,
    Year,
}

impl TimeGranularity {
    /// Longest window supported per granularity, in periods.
    pub fn max_periods(&self) -> u32 {
        match self {
            TimeGranularity::Month => 6,
            TimeGranularity::Quarter => 8,
            TimeGranularity::Year => 5,
        }
    }

    /// Truncate a date to the first day of its period.
    pub fn truncate(&self, date: NaiveDate) -> NaiveDate {
        match self {
            TimeGranularity::Month => {
                NaiveDate::from_ymd_opt(date.year(), date.month(), 1).unwrap_or(date)
            }
            TimeGranularity::Quarter => {
                let quarter_month = ((date.month() - 1) / 3) * 3 + 1;
                NaiveDate::from_ymd_opt(date.year(), quarter_month, 1).unwrap_or(date)
            }
            TimeGranularity::Year => NaiveDate::from_ymd_opt(date.year(), 1, 1).unwrap_or(date),
        }
    }
}

impl fmt::Display for TimeGranularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TimeGranularity::Month => "Month",
            TimeGranularity::Quarter => "Quarter",
            TimeGranularity::Year => "Year",
        };
        write!(f, "{name}")
    }
}

/// Column mapping for one geometry resolution, mirroring the source
/// boundary files' attribute names.
#[derive(Debug, Clone)]
pub struct ResolutionConfig {
    pub id_column: &'static str,
    pub name_column: &'static str,
    pub state_column: Option<&'static str>,
}

/// Inclusive postcode ranges for one jurisdiction. Ranges must be disjoint
/// across jurisdictions; this is a data invariant checked in tests, not at
/// runtime.
pub type PostcodeRanges = &'static [(u32, u32)];

/// Static per-country configuration: the resolution -> column map and the
/// single shared jurisdiction -> postcode-range table consumed by both the
/// geography resolver and the geometry provider's postcode filtering.
#[derive(Debug, Clone)]
pub struct CountryConfig {
    pub country: &'static str,
    resolutions: HashMap<Resolution, ResolutionConfig>,
    postcode_ranges: &'static [(&'static str, PostcodeRanges)],
}

pub const SUPPORTED_COUNTRIES: [&str; 1] = ["Australia"];

/// Jurisdiction -> inclusive postcode ranges, ordered; the first matching
/// jurisdiction wins when resolving.
pub const AUSTRALIA_POSTCODE_RANGES: &[(&str, PostcodeRanges)] = &[
    ("New South Wales", &[(1000, 2599), (2619, 2899), (2921, 2999)]),
    ("Australian Capital Territory", &[(2600, 2618), (2900, 2920)]),
    ("Victoria", &[(3000, 3999)]),
    ("Queensland", &[(4000, 4999), (9000, 9999)]),
    ("South Australia", &[(5000, 5999)]),
    ("Western Australia", &[(6000, 6797), (6800, 6999)]),
    ("Tasmania", &[(7000, 7999)]),
    ("Northern Territory", &[(800, 899)]),
];

impl CountryConfig {
    /// Configuration for Australian boundary data (ABS 2021/2024 editions).
    pub fn australia() -> Self {
        let mut resolutions = HashMap::new();
        resolutions.insert(
            Resolution::Postcode,
            ResolutionConfig {
                id_column: "POA_CODE21",
                name_column: "POA_NAME21",
                state_column: Some("STE_NAME21"),
            },
        );
        resolutions.insert(
            Resolution::StateElectorate,
            ResolutionConfig {
                id_column: "SED_CODE24",
                name_column: "SED_NAME24",
                state_column: Some("STE_NAME21"),
            },
        );
        resolutions.insert(
            Resolution::FederalElectorate,
            ResolutionConfig {
                id_column: "CED_CODE21",
                name_column: "CED_NAME21",
                state_column: Some("STE_NAME21"),
            },
        );
        resolutions.insert(
            Resolution::State,
            ResolutionConfig {
                id_column: "STE_CODE21",
                name_column: "STE_NAME21",
                state_column: None,
            },
        );
        CountryConfig {
            country: "Australia",
            resolutions,
            postcode_ranges: AUSTRALIA_POSTCODE_RANGES,
        }
    }

    /// Look up the config for a country, failing with the list of supported
    /// countries when it is unknown.
    pub fn for_country(country: &str) -> Result<Self, PipelineError> {
        match country {
            "Australia" => Ok(Self::australia()),
            other => Err(PipelineError::UnsupportedCountry {
                country: other.to_string(),
                supported: SUPPORTED_COUNTRIES.iter().map(|s| s.to_string()).collect(),
            }),
        }
    }

    pub fn resolution(&self, resolution: Resolution) -> Result<&ResolutionConfig, PipelineError> {
        self.resolutions
            .get(&resolution)
            .ok_or(PipelineError::MissingConfiguration {
                resolution: resolution.to_string(),
            })
    }

    pub fn postcode_ranges(&self) -> &'static [(&'static str, PostcodeRanges)] {
        self.postcode_ranges
    }
}
