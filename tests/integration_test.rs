use county_mapper::error::{MapperError, Result};
use county_mapper::pipeline::{MapView, NormalizedAggregate};
use county_mapper::warehouse::{CountyResponseRow, ResponseSource};

/// Canned warehouse rows so the whole normalization path can run without a
/// live warehouse.
struct CannedSource {
    rows: Vec<CountyResponseRow>,
}

#[async_trait::async_trait]
impl ResponseSource for CannedSource {
    async fn fetch_county_counts(&self) -> Result<Vec<CountyResponseRow>> {
        Ok(self.rows.clone())
    }
}

fn row(county_fips: &str, responses: u64) -> CountyResponseRow {
    CountyResponseRow {
        county_fips: county_fips.to_string(),
        state_fips: format!("{:0>5}", county_fips)[0..2].to_string(),
        responses,
    }
}

#[tokio::test]
async fn two_state_result_set_renders_national_view() -> Result<()> {
    let source = CannedSource {
        rows: vec![row("1001", 3), row("06037", 7)],
    };

    let rows = source.fetch_county_counts().await?;
    let aggregate = NormalizedAggregate::from_rows(&rows)?;

    let logs = aggregate.log_responses();
    assert_eq!(logs.len(), 2);
    assert!((logs["01001"] - 3f64.log10()).abs() < 1e-12);
    assert!((logs["06037"] - 7f64.log10()).abs() < 1e-12);

    let (min, max) = aggregate.range();
    assert!((min - 3f64.log10()).abs() < 1e-12);
    assert!((max - 7f64.log10()).abs() < 1e-12);

    assert_eq!(aggregate.map_view(), MapView::National);
    Ok(())
}

#[tokio::test]
async fn single_state_result_set_tightens_the_view() -> Result<()> {
    let source = CannedSource {
        rows: vec![row("53033", 41), row("53061", 5), row("53035", 2)],
    };

    let aggregate = NormalizedAggregate::from_rows(&source.fetch_county_counts().await?)?;
    assert_eq!(
        aggregate.map_view(),
        MapView::SingleState("53".to_string())
    );
    Ok(())
}

#[tokio::test]
async fn empty_result_set_fails_before_any_range_math() {
    let source = CannedSource { rows: Vec::new() };

    let rows = source.fetch_county_counts().await.unwrap();
    assert!(matches!(
        NormalizedAggregate::from_rows(&rows),
        Err(MapperError::EmptyResult)
    ));
}

#[tokio::test]
async fn unpadded_fips_never_loses_its_leading_zero() -> Result<()> {
    let source = CannedSource {
        rows: vec![row("1", 1), row("37", 5)],
    };

    let aggregate = NormalizedAggregate::from_rows(&source.fetch_county_counts().await?)?;
    let keys: Vec<&String> = aggregate.log_responses().keys().collect();
    assert_eq!(keys, vec!["00001", "00037"]);
    assert_eq!(
        aggregate.map_view(),
        MapView::SingleState("00".to_string())
    );
    Ok(())
}
