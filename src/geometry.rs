use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use crate::config::{CountryConfig, Resolution, ResolutionConfig};
use crate::errors::PipelineError;
use crate::geography;

/// Opaque boundary geometry, carried as a GeoJSON geometry value. The
/// pipeline never inspects coordinates beyond the emptiness check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Geometry(pub serde_json::Value);

impl Geometry {
    pub fn is_empty(&self) -> bool {
        if self.0.is_null() {
            return true;
        }
        match self.0.get("coordinates") {
            Some(serde_json::Value::Array(coords)) => coords.is_empty(),
            _ => match self.0.get("geometries") {
                Some(serde_json::Value::Array(geoms)) => geoms.is_empty(),
                _ => true,
            },
        }
    }
}

/// One boundary record at a given resolution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeographicUnit {
    /// Resolution-specific identifier (postcode, electorate code, ...),
    /// unique within a resolution level.
    pub id: String,
    /// Human-readable name from the boundary data's name column.
    pub name: String,
    /// Jurisdiction the unit belongs to, when the resolution carries one.
    pub state: Option<String>,
    pub geometry: Option<Geometry>,
}

impl GeographicUnit {
    /// Logical field access used by the merge's join-key validation.
    pub fn field(&self, name: &str) -> Option<&str> {
        match name {
            "id" => Some(&self.id),
            "name" => Some(&self.name),
            "state" => self.state.as_deref(),
            _ => None,
        }
    }
}

/// Supplies boundary records per resolution, already filtered to the
/// requested jurisdictions with empty geometries dropped.
pub trait GeometryProvider {
    fn units(
        &self,
        country: &str,
        resolution: Resolution,
        included_jurisdictions: &[String],
    ) -> Result<Vec<GeographicUnit>, PipelineError>;
}

/// In-memory geometry provider backed by pre-parsed boundary layers.
///
/// Postcode layers are filtered through the shared postcode-range table so
/// the filtering stays in lockstep with the geography resolver; other
/// resolutions filter on the unit's state (or name, for the State layer).
pub struct StaticGeometryProvider {
    config: CountryConfig,
    layers: HashMap<Resolution, Vec<GeographicUnit>>,
}

impl StaticGeometryProvider {
    pub fn new(config: CountryConfig) -> Self {
        Self {
            config,
            layers: HashMap::new(),
        }
    }

    pub fn with_layer(mut self, resolution: Resolution, units: Vec<GeographicUnit>) -> Self {
        self.layers.insert(resolution, units);
        self
    }

    fn keep_unit(
        &self,
        resolution: Resolution,
        unit: &GeographicUnit,
        included: &[String],
    ) -> bool {
        if included.is_empty() {
            return true;
        }
        match resolution {
            Resolution::Postcode => {
                let postcode = geography::normalize_postcode(&unit.id);
                geography::postcode_in_jurisdictions(&self.config, &postcode, included)
            }
            Resolution::State => included.iter().any(|j| *j == unit.name),
            _ => match &unit.state {
                Some(state) => included.iter().any(|j| j == state),
                None => false,
            },
        }
    }
}

impl GeometryProvider for StaticGeometryProvider {
    #[instrument(skip(self, included_jurisdictions), fields(country = %country, resolution = %resolution))]
    fn units(
        &self,
        country: &str,
        resolution: Resolution,
        included_jurisdictions: &[String],
    ) -> Result<Vec<GeographicUnit>, PipelineError> {
        if country != self.config.country {
            return Err(PipelineError::UnsupportedCountry {
                country: country.to_string(),
                supported: vec![self.config.country.to_string()],
            });
        }
        // Resolution must be configured even when a layer happens to exist.
        self.config.resolution(resolution)?;

        let layer = self
            .layers
            .get(&resolution)
            .ok_or(PipelineError::UnsupportedResolution {
                resolution: resolution.to_string(),
                valid: self
                    .layers
                    .keys()
                    .map(|r| r.to_string())
                    .collect(),
            })?;

        let mut units = Vec::new();
        let mut dropped_empty = 0usize;
        for unit in layer {
            if !self.keep_unit(resolution, unit, included_jurisdictions) {
                continue;
            }
            match &unit.geometry {
                Some(geometry) if !geometry.is_empty() => units.push(unit.clone()),
                _ => dropped_empty += 1,
            }
        }
        if dropped_empty > 0 {
            warn!(dropped_empty, "dropped units with empty geometry");
        }
        debug!(kept = units.len(), "geometry layer filtered");
        Ok(units)
    }
}

/// Parse a GeoJSON FeatureCollection into boundary records using the
/// resolution's configured property columns. Features without the id
/// property are skipped with a warning; geometry emptiness is not checked
/// here, the provider filters it on request.
pub fn units_from_feature_collection(
    collection: &serde_json::Value,
    config: &ResolutionConfig,
) -> Vec<GeographicUnit> {
    let features = collection
        .get("features")
        .and_then(|f| f.as_array())
        .cloned()
        .unwrap_or_default();
    let mut units = Vec::with_capacity(features.len());
    for feature in &features {
        let properties = feature.get("properties").cloned().unwrap_or_default();
        let id = match property_string(&properties, config.id_column) {
            Some(id) => id,
            None => {
                warn!(id_column = config.id_column, "feature missing id property, skipping");
                continue;
            }
        };
        let name = property_string(&properties, config.name_column).unwrap_or_else(|| id.clone());
        let state = config
            .state_column
            .and_then(|column| property_string(&properties, column));
        let geometry = feature
            .get("geometry")
            .filter(|g| !g.is_null())
            .map(|g| Geometry(g.clone()));
        units.push(GeographicUnit {
            id,
            name,
            state,
            geometry,
        });
    }
    units
}

fn property_string(properties: &serde_json::Value, column: &str) -> Option<String> {
    match properties.get(column) {
        Some(serde_json::Value::String(s)) => Some(s.clone()),
        Some(serde_json::Value::Number(n)) => Some(n.to_string()),
        _ => None,
    }
}
