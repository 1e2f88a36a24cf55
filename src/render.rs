use std::path::Path;

use log::{debug, info};
use plotters::prelude::*;

use crate::analysis::partition::Partition;
use crate::color::{ColorMap, Normalize};
use crate::config::RenderConfig;
use crate::data::model::{FieldBundle, Grid};
use crate::error::{PipelineError, Result};

/// Blank border inside each panel, in pixels.
const PANEL_MARGIN: i32 = 8;
const FRAME_WIDTH: i32 = 8;

// ---------------------------------------------------------------------------
// Panels
// ---------------------------------------------------------------------------

/// How quiver arrows are scaled from field units to grid cells.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ArrowScale {
    /// Multiply the field value by this factor.
    Fixed(f64),
    /// Longest sampled arrow spans 0.9 sampling steps.
    Normalized,
}

/// One sub-plot. Grids are drawn with row 0 at the bottom.
pub enum Panel<'a> {
    Heatmap {
        grid: &'a Grid,
        cmap: ColorMap,
    },
    Quiver {
        u: &'a Grid,
        v: &'a Grid,
        color_by: &'a Grid,
        scale: ArrowScale,
    },
}

// ---------------------------------------------------------------------------
// Figures
// ---------------------------------------------------------------------------

/// 2×2 overview of a freshly ingested bundle: intensity, V1/V2 quiver, V3,
/// phase.
pub fn render_overview(path: &Path, bundle: &FieldBundle, phase: &Grid, cfg: &RenderConfig) -> Result<()> {
    let panels = [
        Panel::Heatmap {
            grid: &bundle.intensity,
            cmap: ColorMap::Jet,
        },
        Panel::Quiver {
            u: &bundle.v1,
            v: &bundle.v2,
            color_by: &bundle.intensity,
            scale: ArrowScale::Normalized,
        },
        Panel::Heatmap {
            grid: &bundle.v3,
            cmap: ColorMap::Jet,
        },
        Panel::Heatmap {
            grid: phase,
            cmap: ColorMap::Hsv,
        },
    ];
    render_figure(path, cfg, (2, 2), &panels, None)
}

/// 2×3 comparison: original / noise / denoised magnitudes on top, matching
/// V1/V2 quivers below. Synthetic data gets a coloured frame.
pub fn render_analysis(
    path: &Path,
    total: &Grid,
    original: &FieldBundle,
    partition: &Partition,
    synthetic: bool,
    cfg: &RenderConfig,
) -> Result<()> {
    let scale = ArrowScale::Fixed(cfg.arrow_scale);
    let noise = &partition.noise;
    let denoised = &partition.denoised;
    let panels = [
        Panel::Heatmap {
            grid: total,
            cmap: ColorMap::Jet,
        },
        Panel::Heatmap {
            grid: &noise.magnitude,
            cmap: ColorMap::Jet,
        },
        Panel::Heatmap {
            grid: &denoised.magnitude,
            cmap: ColorMap::Jet,
        },
        Panel::Quiver {
            u: &original.v1,
            v: &original.v2,
            color_by: total,
            scale,
        },
        Panel::Quiver {
            u: &noise.components[0],
            v: &noise.components[1],
            color_by: &noise.magnitude,
            scale,
        },
        Panel::Quiver {
            u: &denoised.components[0],
            v: &denoised.components[1],
            color_by: &denoised.magnitude,
            scale,
        },
    ];
    let frame = synthetic.then(|| {
        let [r, g, b] = cfg.synthetic_frame;
        RGBColor(r, g, b)
    });
    render_figure(path, cfg, (2, 3), &panels, frame)
}

/// Draw `panels` row by row into a `rows × cols` layout and save as PNG.
pub fn render_figure(
    path: &Path,
    cfg: &RenderConfig,
    (rows, cols): (usize, usize),
    panels: &[Panel<'_>],
    frame: Option<RGBColor>,
) -> Result<()> {
    let width = cfg.panel_size * cols as u32;
    let height = cfg.panel_size * rows as u32;
    let mut buf = vec![0u8; width as usize * height as usize * 3];
    {
        let root = BitMapBackend::with_buffer(&mut buf, (width, height)).into_drawing_area();
        root.fill(&WHITE).map_err(|e| draw_error(path, e))?;

        let areas = root.split_evenly((rows, cols));
        for (area, panel) in areas.iter().zip(panels) {
            match panel {
                Panel::Heatmap { grid, cmap } => draw_heatmap(area, grid, *cmap),
                Panel::Quiver {
                    u,
                    v,
                    color_by,
                    scale,
                } => draw_quiver(area, u, v, color_by, *scale, cfg.quiver_step),
            }
            .map_err(|e| draw_error(path, e))?;
        }

        if let Some(color) = frame {
            let (w, h, f) = (width as i32, height as i32, FRAME_WIDTH);
            let strips = [
                [(0, 0), (w, f)],
                [(0, h - f), (w, h)],
                [(0, 0), (f, h)],
                [(w - f, 0), (w, h)],
            ];
            for strip in strips {
                root.draw(&Rectangle::new(strip, color.filled()))
                    .map_err(|e| draw_error(path, e))?;
            }
        }
        root.present().map_err(|e| draw_error(path, e))?;
    }

    let image = image::RgbImage::from_raw(width, height, buf).ok_or_else(|| {
        PipelineError::io(path, std::io::Error::other("pixel buffer size mismatch"))
    })?;
    image
        .save(path)
        .map_err(|e| PipelineError::io(path, std::io::Error::other(e.to_string())))?;
    info!("Figure saved: {}", path.display());
    Ok(())
}

fn draw_error(path: &Path, e: impl std::fmt::Display) -> PipelineError {
    PipelineError::io(path, std::io::Error::other(format!("drawing failed: {e}")))
}

type Area<'b> = DrawingArea<BitMapBackend<'b>, plotters::coord::Shift>;
type DrawResult<'b> = std::result::Result<(), plotters::drawing::DrawingAreaErrorKind<<BitMapBackend<'b> as DrawingBackend>::ErrorType>>;

/// Pixel box available for the plot inside a panel.
fn plot_box(area: &Area<'_>) -> (i32, i32, i32, i32) {
    let (w, h) = area.dim_in_pixel();
    let x0 = PANEL_MARGIN;
    let y0 = PANEL_MARGIN;
    let pw = (w as i32 - 2 * PANEL_MARGIN).max(1);
    let ph = (h as i32 - 2 * PANEL_MARGIN).max(1);
    (x0, y0, pw, ph)
}

fn draw_heatmap<'b>(area: &Area<'b>, grid: &Grid, cmap: ColorMap) -> DrawResult<'b> {
    if grid.is_empty() {
        return Ok(());
    }
    let (x0, y0, pw, ph) = plot_box(area);
    let norm = Normalize::new(grid.min_max());
    let (rows, cols) = grid.shape();

    for py in 0..ph {
        // origin at the bottom
        let row = rows - 1 - (py as usize * rows / ph as usize).min(rows - 1);
        for px in 0..pw {
            let col = (px as usize * cols / pw as usize).min(cols - 1);
            let color = cmap.at(norm.apply(grid.get(row, col)));
            area.draw_pixel((x0 + px, y0 + py), &color)?;
        }
    }
    area.draw(&Rectangle::new(
        [(x0 - 1, y0 - 1), (x0 + pw, y0 + ph)],
        BLACK.stroke_width(1),
    ))
}

fn draw_quiver<'b>(
    area: &Area<'b>,
    u: &Grid,
    v: &Grid,
    color_by: &Grid,
    scale: ArrowScale,
    step: usize,
) -> DrawResult<'b> {
    let (x0, y0, pw, ph) = plot_box(area);
    area.draw(&Rectangle::new(
        [(x0 - 1, y0 - 1), (x0 + pw, y0 + ph)],
        BLACK.stroke_width(1),
    ))?;
    if u.is_empty() || u.shape() != v.shape() || u.shape() != color_by.shape() {
        debug!("quiver skipped: component shapes {:?} / {:?}", u.shape(), v.shape());
        return Ok(());
    }

    let (rows, cols) = u.shape();
    let cell_w = pw as f64 / cols as f64;
    let cell_h = ph as f64 / rows as f64;
    let samples = u.subsample(step);

    let factor = match scale {
        ArrowScale::Fixed(f) => f,
        ArrowScale::Normalized => {
            let longest = samples
                .iter()
                .map(|&(r, c, du)| du.hypot(v.get(r, c)))
                .filter(|m| m.is_finite())
                .fold(0.0, f64::max);
            if longest > 0.0 {
                0.9 * step as f64 / longest
            } else {
                0.0
            }
        }
    };
    let norm = Normalize::new(color_by.min_max());

    for (r, c, du) in samples {
        let dv = v.get(r, c);
        let dx = du * factor * cell_w;
        let dy = -dv * factor * cell_h;
        if !(dx.is_finite() && dy.is_finite()) || dx.hypot(dy) < 0.5 {
            continue;
        }
        let sx = x0 as f64 + (c as f64 + 0.5) * cell_w;
        let sy = y0 as f64 + ph as f64 - (r as f64 + 0.5) * cell_h;
        let color = ColorMap::Reds.at(0.35 + 0.65 * norm.apply(color_by.get(r, c)));
        draw_arrow(area, (sx, sy), (sx + dx, sy + dy), color)?;
    }
    Ok(())
}

fn draw_arrow<'b>(area: &Area<'b>, from: (f64, f64), to: (f64, f64), color: RGBColor) -> DrawResult<'b> {
    let pt = |(x, y): (f64, f64)| (x.round() as i32, y.round() as i32);
    let style = color.stroke_width(1);
    area.draw(&PathElement::new(vec![pt(from), pt(to)], style))?;

    let (dx, dy) = (to.0 - from.0, to.1 - from.1);
    let len = dx.hypot(dy);
    let head = (len * 0.3).clamp(1.5, 6.0);
    let angle = dy.atan2(dx);
    for side in [-0.45f64, 0.45] {
        let a = angle + std::f64::consts::PI + side;
        let tip = (to.0 + head * a.cos(), to.1 + head * a.sin());
        area.draw(&PathElement::new(vec![pt(to), pt(tip)], style))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::partition::Band;

    fn small_cfg() -> RenderConfig {
        RenderConfig {
            panel_size: 64,
            quiver_step: 2,
            ..RenderConfig::default()
        }
    }

    fn bundle() -> FieldBundle {
        FieldBundle::from_components(
            Grid::from_fn(10, 10, |r, _| r as f64 - 4.5),
            Grid::from_fn(10, 10, |_, c| 4.5 - c as f64),
            Grid::zeros(10, 10),
        )
        .unwrap()
    }

    #[test]
    fn overview_png_has_expected_size() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("overview.png");
        let b = bundle();
        let phase = crate::analysis::derived::phase(&b.v1, &b.v2).unwrap();
        render_overview(&path, &b, &phase, &small_cfg()).unwrap();
        let img = image::open(&path).unwrap();
        assert_eq!((img.width(), img.height()), (128, 128));
    }

    #[test]
    fn synthetic_analysis_is_framed() {
        let dir = tempfile::tempdir().unwrap();
        let b = bundle();
        let total = b.total_field().unwrap();
        let band = Band::new([b.v1.clone(), b.v2.clone(), b.v3.clone()]).unwrap();
        let partition = Partition {
            noise: band.clone(),
            denoised: band,
        };
        let cfg = small_cfg();

        let real = dir.path().join("real.png");
        let fake = dir.path().join("fake.png");
        render_analysis(&real, &total, &b, &partition, false, &cfg).unwrap();
        render_analysis(&fake, &total, &b, &partition, true, &cfg).unwrap();

        let real = image::open(&real).unwrap().to_rgb8();
        let fake = image::open(&fake).unwrap().to_rgb8();
        assert_eq!(real.dimensions(), (192, 128));
        assert_eq!(real.get_pixel(1, 1).0, [255, 255, 255]);
        assert_eq!(fake.get_pixel(1, 1).0, cfg.synthetic_frame);
    }
}
