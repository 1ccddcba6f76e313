use crate::config::WarehouseConfig;
use crate::error::{MapperError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, instrument};

/// The fixed aggregation query. The zip-to-county join happens
/// warehouse-side: rider zips are zero-padded to 5 characters before the
/// join, null zips never match, and only counties with at least one
/// response come back.
const RESPONSES_BY_COUNTY_SQL: &str = "\
select
    z.county_fips,
    left(z.county_fips, 2) as state_fips,
    count(*) as responses
from dfp_analytics.dfp_surveys_wide w
join dfp_analytics_staging.dfp_zip_to_county z
    on z.zip_code = lpad(w.rider_zip, 5, '0')
    and w.rider_zip is not null
group by 1";

/// One pre-aggregated row from the warehouse. `county_fips` may arrive
/// un-padded; the pipeline canonicalizes it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountyResponseRow {
    pub county_fips: String,
    pub state_fips: String,
    pub responses: u64,
}

/// Source of per-county response counts. A trait seam so tests can
/// substitute canned rows for the remote warehouse.
#[async_trait::async_trait]
pub trait ResponseSource: Send + Sync {
    async fn fetch_county_counts(&self) -> Result<Vec<CountyResponseRow>>;
}

#[derive(Serialize)]
struct QueryRequest<'a> {
    database: &'a str,
    sql: &'a str,
}

/// Executes the aggregation query against the analytics warehouse over its
/// HTTP query API. One shot, no retry: if the warehouse is unreachable or
/// rejects the key, the whole run aborts.
pub struct WarehouseClient {
    client: reqwest::Client,
    base_url: String,
    database: String,
    api_key: String,
}

impl WarehouseClient {
    pub fn new(config: &WarehouseConfig, api_key: String) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            database: config.database.clone(),
            api_key,
        })
    }
}

#[async_trait::async_trait]
impl ResponseSource for WarehouseClient {
    #[instrument(skip(self))]
    async fn fetch_county_counts(&self) -> Result<Vec<CountyResponseRow>> {
        let url = format!("{}/queries", self.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&QueryRequest {
                database: &self.database,
                sql: RESPONSES_BY_COUNTY_SQL,
            })
            .send()
            .await
            .map_err(|e| MapperError::Query(format!("warehouse unreachable: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(MapperError::Query(format!(
                "warehouse responded with status {}",
                status.as_u16()
            )));
        }

        let rows: Vec<CountyResponseRow> = response
            .json()
            .await
            .map_err(|e| MapperError::Query(format!("malformed result set: {}", e)))?;

        info!("Fetched {} county rows from warehouse", rows.len());
        Ok(rows)
    }
}
