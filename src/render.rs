use crate::boundaries::CountyBoundaries;
use crate::config::OutputConfig;
use crate::error::{MapperError, Result};
use crate::pipeline::{MapView, NormalizedAggregate};
use plotters::prelude::*;
use tracing::{info, instrument};

/// Albers equal-area conic projection. Output is in unit-sphere projected
/// coordinates with y increasing northward.
struct AlbersConic {
    n: f64,
    c: f64,
    rho0: f64,
    lambda0: f64,
}

impl AlbersConic {
    fn new(phi1_deg: f64, phi2_deg: f64, phi0_deg: f64, lambda0_deg: f64) -> Self {
        let phi1 = phi1_deg.to_radians();
        let phi2 = phi2_deg.to_radians();
        let phi0 = phi0_deg.to_radians();
        let n = (phi1.sin() + phi2.sin()) / 2.0;
        let c = phi1.cos().powi(2) + 2.0 * n * phi1.sin();
        let rho0 = (c - 2.0 * n * phi0.sin()).sqrt() / n;
        Self {
            n,
            c,
            rho0,
            lambda0: lambda0_deg.to_radians(),
        }
    }

    fn project(&self, lon_deg: f64, lat_deg: f64) -> (f64, f64) {
        let lat = lat_deg.to_radians();
        // Normalize the longitude delta so the Aleutians, across the
        // antimeridian, land on the correct side of the cone.
        let mut dlon = lon_deg.to_radians() - self.lambda0;
        while dlon > std::f64::consts::PI {
            dlon -= 2.0 * std::f64::consts::PI;
        }
        while dlon < -std::f64::consts::PI {
            dlon += 2.0 * std::f64::consts::PI;
        }
        let rho = (self.c - 2.0 * self.n * lat.sin()).sqrt() / self.n;
        let theta = self.n * dlon;
        (rho * theta.sin(), self.rho0 - rho * theta.cos())
    }
}

/// The classic composite US layout: an Albers cone over the lower 48 with
/// Alaska and Hawaii rescaled and parked to the southwest. Territories
/// outside that layout are not drawn.
fn project_point(state_fips: &str, lon: f64, lat: f64) -> Option<(f64, f64)> {
    let lower48 = AlbersConic::new(29.5, 45.5, 23.0, -96.0);
    match state_fips {
        "02" => {
            let alaska = AlbersConic::new(55.0, 65.0, 50.0, -154.0);
            let (x, y) = alaska.project(lon, lat);
            Some((x * 0.35 - 0.34, y * 0.35 - 0.15))
        }
        "15" => {
            let hawaii = AlbersConic::new(8.0, 18.0, 13.0, -157.0);
            let (x, y) = hawaii.project(lon, lat);
            Some((x - 0.18, y - 0.23))
        }
        // American Samoa, Guam, Northern Marianas, Puerto Rico, Virgin
        // Islands fall outside the composite layout.
        "60" | "66" | "69" | "72" | "78" => None,
        _ => Some(lower48.project(lon, lat)),
    }
}

/// Plasma control points, interpolated linearly. Matches the color scale
/// the map has always used; the drawing crate ships no plasma ramp of its
/// own.
const PLASMA_ANCHORS: [(u8, u8, u8); 5] = [
    (13, 8, 135),
    (126, 3, 168),
    (204, 71, 120),
    (248, 149, 64),
    (240, 249, 33),
];

fn plasma(t: f64) -> RGBColor {
    let t = t.clamp(0.0, 1.0) * (PLASMA_ANCHORS.len() - 1) as f64;
    let i = (t.floor() as usize).min(PLASMA_ANCHORS.len() - 2);
    let frac = t - i as f64;
    let (r0, g0, b0) = PLASMA_ANCHORS[i];
    let (r1, g1, b1) = PLASMA_ANCHORS[i + 1];
    let lerp = |a: u8, b: u8| (a as f64 + (b as f64 - a as f64) * frac).round() as u8;
    RGBColor(lerp(r0, r1), lerp(g0, g1), lerp(b0, b1))
}

#[derive(Debug, Clone, Copy)]
struct Extent {
    min_x: f64,
    min_y: f64,
    max_x: f64,
    max_y: f64,
}

impl Extent {
    fn empty() -> Self {
        Self {
            min_x: f64::INFINITY,
            min_y: f64::INFINITY,
            max_x: f64::NEG_INFINITY,
            max_y: f64::NEG_INFINITY,
        }
    }

    fn include(&mut self, (x, y): (f64, f64)) {
        self.min_x = self.min_x.min(x);
        self.min_y = self.min_y.min(y);
        self.max_x = self.max_x.max(x);
        self.max_y = self.max_y.max(y);
    }

    fn is_empty(&self) -> bool {
        self.min_x > self.max_x
    }

    fn pad(&mut self, fraction: f64) {
        let dx = (self.max_x - self.min_x).max(1e-9) * fraction;
        let dy = (self.max_y - self.min_y).max(1e-9) * fraction;
        self.min_x -= dx;
        self.max_x += dx;
        self.min_y -= dy;
        self.max_y += dy;
    }
}

/// Affine map from projected coordinates into a pixel rectangle, aspect
/// preserved, y flipped.
struct PixelMap {
    scale: f64,
    offset_x: f64,
    offset_y: f64,
    extent: Extent,
}

impl PixelMap {
    fn fit(extent: Extent, left: i32, top: i32, width: i32, height: i32) -> Self {
        let span_x = (extent.max_x - extent.min_x).max(1e-9);
        let span_y = (extent.max_y - extent.min_y).max(1e-9);
        let scale = (width as f64 / span_x).min(height as f64 / span_y);
        // Center the fitted map inside the rectangle.
        let offset_x = left as f64 + (width as f64 - span_x * scale) / 2.0;
        let offset_y = top as f64 + (height as f64 - span_y * scale) / 2.0;
        Self {
            scale,
            offset_x,
            offset_y,
            extent,
        }
    }

    fn to_pixel(&self, (x, y): (f64, f64)) -> (i32, i32) {
        let px = self.offset_x + (x - self.extent.min_x) * self.scale;
        let py = self.offset_y + (self.extent.max_y - y) * self.scale;
        (px.round() as i32, py.round() as i32)
    }
}

/// One county outline already projected, ready to rasterize.
struct ProjectedShape {
    fips: String,
    rings: Vec<Vec<(f64, f64)>>,
}

fn project_shapes(boundaries: &CountyBoundaries) -> Vec<ProjectedShape> {
    let mut shapes = Vec::with_capacity(boundaries.shapes.len());
    for shape in &boundaries.shapes {
        let state = &shape.fips[0..2];
        let mut rings = Vec::new();
        for polygon in &shape.polygons {
            let ring: Vec<(f64, f64)> = polygon
                .exterior()
                .coords()
                .filter_map(|coord| project_point(state, coord.x, coord.y))
                .collect();
            if ring.len() >= 3 {
                rings.push(ring);
            }
        }
        if !rings.is_empty() {
            shapes.push(ProjectedShape {
                fips: shape.fips.clone(),
                rings,
            });
        }
    }
    shapes
}

const MARGIN: i32 = 10;
const COLORBAR_WIDTH: i32 = 70;

/// Rasterizes the choropleth to the configured PNG path. Counties present
/// in the aggregate are filled from the plasma ramp over the global log
/// range; the rest of the country is drawn as light-gray context. A
/// single-state view tightens the viewport to the located counties, the
/// way the interactive original fit its bounds.
#[instrument(skip_all, fields(output = %output.path))]
pub fn render_choropleth(
    aggregate: &NormalizedAggregate,
    boundaries: &CountyBoundaries,
    view: &MapView,
    output: &OutputConfig,
) -> Result<()> {
    let shapes = project_shapes(boundaries);
    if shapes.is_empty() {
        return Err(MapperError::Render(
            "no county shapes survived projection".to_string(),
        ));
    }

    let mut viewport = Extent::empty();
    for shape in &shapes {
        let in_view = match view {
            MapView::National => true,
            // Fit to the located counties only.
            MapView::SingleState(state) => {
                shape.fips.starts_with(state.as_str())
                    && aggregate.log_responses().contains_key(&shape.fips)
            }
        };
        if in_view {
            for ring in &shape.rings {
                for &point in ring {
                    viewport.include(point);
                }
            }
        }
    }
    if viewport.is_empty() {
        return Err(MapperError::Render(
            "no located county matches the boundary document".to_string(),
        ));
    }
    viewport.pad(0.02);

    let root = BitMapBackend::new(&output.path, (output.width, output.height)).into_drawing_area();
    root.fill(&WHITE)
        .map_err(|e| MapperError::Render(e.to_string()))?;

    let map_width = output.width as i32 - 2 * MARGIN - COLORBAR_WIDTH;
    let map_height = output.height as i32 - 2 * MARGIN;
    let pixels = PixelMap::fit(viewport, MARGIN, MARGIN, map_width, map_height);

    let (range_min, range_max) = aggregate.range();
    let span = range_max - range_min;

    for shape in &shapes {
        let fill = match aggregate.log_responses().get(&shape.fips) {
            Some(&value) => {
                // A single distinct count collapses the range; use the
                // ramp midpoint instead of dividing by zero.
                let t = if span > 0.0 {
                    (value - range_min) / span
                } else {
                    0.5
                };
                plasma(t)
            }
            None => RGBColor(224, 224, 224),
        };
        for ring in &shape.rings {
            let pixel_ring: Vec<(i32, i32)> =
                ring.iter().map(|&point| pixels.to_pixel(point)).collect();
            root.draw(&Polygon::new(pixel_ring.clone(), fill.filled()))
                .map_err(|e| MapperError::Render(e.to_string()))?;
            root.draw(&PathElement::new(pixel_ring, ShapeStyle::from(&WHITE).stroke_width(1)))
                .map_err(|e| MapperError::Render(e.to_string()))?;
        }
    }

    draw_colorbar(&root, output, range_min, range_max)?;

    root.present()
        .map_err(|e| MapperError::Render(e.to_string()))?;
    info!("Wrote choropleth to {}", output.path);
    Ok(())
}

fn draw_colorbar(
    root: &DrawingArea<BitMapBackend<'_>, plotters::coord::Shift>,
    output: &OutputConfig,
    range_min: f64,
    range_max: f64,
) -> Result<()> {
    let bar_left = output.width as i32 - MARGIN - COLORBAR_WIDTH + 10;
    let bar_right = bar_left + 16;
    let bar_top = MARGIN + 60;
    let bar_bottom = output.height as i32 - MARGIN - 30;

    for y in bar_top..bar_bottom {
        let t = 1.0 - (y - bar_top) as f64 / (bar_bottom - bar_top) as f64;
        root.draw(&Rectangle::new(
            [(bar_left, y), (bar_right, y + 1)],
            plasma(t).filled(),
        ))
        .map_err(|e| MapperError::Render(e.to_string()))?;
    }

    let label_style = TextStyle::from(("sans-serif", 13).into_font()).color(&BLACK);
    let labels = [
        ((bar_left - 10, MARGIN + 20), "Survey Responses".to_string()),
        ((bar_left - 10, MARGIN + 36), "(Log Scale)".to_string()),
        ((bar_right + 4, bar_top - 6), format!("{:.2}", range_max)),
        ((bar_right + 4, bar_bottom - 6), format!("{:.2}", range_min)),
    ];
    for (pos, text) in labels {
        root.draw(&Text::new(text, pos, label_style.clone()))
            .map_err(|e| MapperError::Render(e.to_string()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plasma_endpoints_match_the_anchor_table() {
        assert_eq!(plasma(0.0), RGBColor(13, 8, 135));
        assert_eq!(plasma(1.0), RGBColor(240, 249, 33));
        // Out-of-range inputs clamp rather than wrap.
        assert_eq!(plasma(-1.0), plasma(0.0));
        assert_eq!(plasma(2.0), plasma(1.0));
    }

    #[test]
    fn lower48_projection_keeps_north_above_south() {
        let (_, y_south) = project_point("48", -97.0, 25.8).unwrap();
        let (_, y_north) = project_point("38", -96.0, 49.0).unwrap();
        assert!(y_north > y_south);
    }

    #[test]
    fn alaska_and_hawaii_sit_southwest_of_the_lower48() {
        let (x_ak, y_ak) = project_point("02", -149.9, 61.2).unwrap();
        let (x_hi, y_hi) = project_point("15", -157.8, 21.3).unwrap();
        let (x_tx, y_tx) = project_point("48", -97.0, 25.8).unwrap();
        assert!(x_ak < x_tx && y_ak < y_tx);
        assert!(x_hi < x_tx && y_hi < y_tx);
    }

    #[test]
    fn territories_are_not_projected() {
        assert!(project_point("72", -66.5, 18.2).is_none());
    }

    #[test]
    fn aleutians_project_west_of_anchorage() {
        let (x_aleutian, _) = project_point("02", 172.0, 52.5).unwrap();
        let (x_anchorage, _) = project_point("02", -149.9, 61.2).unwrap();
        assert!(x_aleutian < x_anchorage);
    }

    #[test]
    fn pixel_map_flips_y_and_preserves_aspect() {
        let mut extent = Extent::empty();
        extent.include((0.0, 0.0));
        extent.include((2.0, 1.0));
        let pixels = PixelMap::fit(extent, 0, 0, 200, 200);

        let (_, py_low) = pixels.to_pixel((0.0, 0.0));
        let (_, py_high) = pixels.to_pixel((0.0, 1.0));
        assert!(py_high < py_low);

        let (px0, _) = pixels.to_pixel((0.0, 0.0));
        let (px1, _) = pixels.to_pixel((2.0, 0.0));
        assert_eq!(px1 - px0, 200);
    }
}
