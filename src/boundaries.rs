use crate::config::BoundariesConfig;
use crate::error::{MapperError, Result};
use geojson::FeatureCollection;
use std::time::Duration;
use tracing::{info, instrument, warn};

/// Boundary geometry for one county, keyed by the same 5-character FIPS
/// convention the pipeline emits.
#[derive(Debug, Clone)]
pub struct CountyShape {
    pub fips: String,
    pub polygons: Vec<geo::Polygon<f64>>,
}

#[derive(Debug, Clone)]
pub struct CountyBoundaries {
    pub shapes: Vec<CountyShape>,
}

/// Fetches the county boundary GeoJSON. The fetch gets a timeout and a
/// single bounded retry; exhaustion is a distinct error from a document
/// that arrives but will not parse.
#[instrument(skip(config), fields(url = %config.url))]
pub async fn fetch_county_boundaries(config: &BoundariesConfig) -> Result<CountyBoundaries> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(config.timeout_seconds))
        .build()?;

    let mut last_err = String::new();
    for attempt in 0..2 {
        match fetch_once(&client, &config.url).await {
            Ok(body) => {
                let boundaries = parse_boundaries(&body)?;
                info!(
                    "Fetched boundary geometry for {} counties",
                    boundaries.shapes.len()
                );
                return Ok(boundaries);
            }
            Err(e) => {
                warn!("Boundary fetch attempt {} failed: {}", attempt + 1, e);
                last_err = e;
            }
        }
    }
    Err(MapperError::BoundaryFetch(last_err))
}

async fn fetch_once(client: &reqwest::Client, url: &str) -> std::result::Result<String, String> {
    let response = client.get(url).send().await.map_err(|e| e.to_string())?;
    let status = response.status();
    if !status.is_success() {
        return Err(format!("server responded with status {}", status.as_u16()));
    }
    response.text().await.map_err(|e| e.to_string())
}

/// Parses the GeoJSON document into per-county polygon lists. Features
/// without a usable FIPS id or with non-areal geometry are dropped rather
/// than failing the run; a document with no usable features at all is
/// malformed.
pub fn parse_boundaries(body: &str) -> Result<CountyBoundaries> {
    let collection: FeatureCollection = body
        .parse()
        .map_err(|e| MapperError::BoundaryParse(format!("not a feature collection: {}", e)))?;

    let mut shapes = Vec::new();
    for feature in collection.features {
        let Some(fips) = feature_fips(&feature) else {
            continue;
        };
        let Some(geometry) = feature.geometry else {
            continue;
        };
        let polygons = match geometry.value {
            value @ geojson::Value::Polygon(_) => {
                let polygon: geo::Polygon<f64> = value
                    .try_into()
                    .map_err(|e| MapperError::BoundaryParse(format!("county {}: {}", fips, e)))?;
                vec![polygon]
            }
            value @ geojson::Value::MultiPolygon(_) => {
                let multi: geo::MultiPolygon<f64> = value
                    .try_into()
                    .map_err(|e| MapperError::BoundaryParse(format!("county {}: {}", fips, e)))?;
                multi.into_iter().collect()
            }
            _ => continue,
        };
        shapes.push(CountyShape { fips, polygons });
    }

    if shapes.is_empty() {
        return Err(MapperError::BoundaryParse(
            "document contains no county features".to_string(),
        ));
    }
    Ok(CountyBoundaries { shapes })
}

/// The plotly counties dataset carries the FIPS code as the feature `id`,
/// usually a string but occasionally numeric. Numeric ids are re-padded so
/// the join key matches the pipeline's convention.
fn feature_fips(feature: &geojson::Feature) -> Option<String> {
    match feature.id.as_ref()? {
        geojson::feature::Id::String(s) => Some(crate::pipeline::pad_fips(s)),
        geojson::feature::Id::Number(n) => Some(crate::pipeline::pad_fips(&n.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_COUNTY_DOC: &str = r#"{
        "type": "FeatureCollection",
        "features": [
            {
                "type": "Feature",
                "id": "01001",
                "properties": {},
                "geometry": {
                    "type": "Polygon",
                    "coordinates": [[[-86.9, 32.7], [-86.7, 32.7], [-86.7, 32.3], [-86.9, 32.3], [-86.9, 32.7]]]
                }
            },
            {
                "type": "Feature",
                "id": 6037,
                "properties": {},
                "geometry": {
                    "type": "MultiPolygon",
                    "coordinates": [[[[-118.9, 34.8], [-117.6, 34.8], [-117.6, 33.7], [-118.9, 33.7], [-118.9, 34.8]]]]
                }
            }
        ]
    }"#;

    #[test]
    fn parses_string_and_numeric_fips_ids() {
        let boundaries = parse_boundaries(TWO_COUNTY_DOC).unwrap();
        let ids: Vec<&str> = boundaries.shapes.iter().map(|s| s.fips.as_str()).collect();
        assert_eq!(ids, vec!["01001", "06037"]);
        assert_eq!(boundaries.shapes[0].polygons.len(), 1);
        assert_eq!(boundaries.shapes[1].polygons.len(), 1);
    }

    #[test]
    fn malformed_document_is_a_parse_error() {
        assert!(matches!(
            parse_boundaries("{\"not\": \"geojson\"}"),
            Err(MapperError::BoundaryParse(_))
        ));
    }

    #[test]
    fn document_without_features_is_a_parse_error() {
        let empty = r#"{"type": "FeatureCollection", "features": []}"#;
        assert!(matches!(
            parse_boundaries(empty),
            Err(MapperError::BoundaryParse(_))
        ));
    }
}
