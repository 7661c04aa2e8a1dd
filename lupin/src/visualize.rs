use crate::lupin_common::*;
use crate::model_selection::BicCurve;
use plotters::prelude::*;
use std::ops::Range;

const FIGURE_SIZE: (u32, u32) = (800, 640);
const POINT_SIZE: u32 = 3;

/// Range covering the finite values with a small margin
fn finite_range<I>(values: I) -> Range<f64>
where
    I: IntoIterator<Item = f64>,
{
    let (lo, hi) = values
        .into_iter()
        .filter(|x| x.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), x| {
            (lo.min(x), hi.max(x))
        });

    if lo > hi {
        return -1.0..1.0;
    }
    if lo == hi {
        return (lo - 0.5)..(hi + 0.5);
    }
    let pad = (hi - lo) * 0.05;
    (lo - pad)..(hi + pad)
}

/// Colors cycle after `Palette99` runs out
fn cluster_style(k: usize) -> ShapeStyle {
    Palette99::pick(k).mix(0.8).filled()
}

fn point_styles(n: usize, labels: Option<&[usize]>) -> Vec<ShapeStyle> {
    match labels {
        Some(labels) => labels.iter().map(|&k| cluster_style(k)).collect(),
        None => vec![BLUE.mix(0.6).filled(); n],
    }
}

fn draw_scatter_2d(file: &str, caption: &str, latent: &Mat, styles: &[ShapeStyle]) -> anyhow::Result<()> {
    let xs = latent.column(0);
    let ys = latent.column(1);
    let xr = finite_range(xs.iter().map(|&x| x as f64));
    let yr = finite_range(ys.iter().map(|&y| y as f64));

    let root = SVGBackend::new(file, FIGURE_SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(caption, ("sans-serif", 20))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(50)
        .build_cartesian_2d(xr, yr)?;

    chart.configure_mesh().x_desc("z0").y_desc("z1").draw()?;

    chart.draw_series(
        xs.iter()
            .zip(ys.iter())
            .zip(styles.iter())
            .filter(|((x, y), _)| x.is_finite() && y.is_finite())
            .map(|((&x, &y), &style)| Circle::new((x as f64, y as f64), POINT_SIZE, style)),
    )?;

    root.present()?;
    Ok(())
}

fn draw_scatter_3d(file: &str, caption: &str, latent: &Mat, styles: &[ShapeStyle]) -> anyhow::Result<()> {
    let axis_range = |j: usize| finite_range(latent.column(j).iter().map(|&x| x as f64));

    let root = SVGBackend::new(file, FIGURE_SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(caption, ("sans-serif", 20))
        .margin(10)
        .build_cartesian_3d(axis_range(0), axis_range(1), axis_range(2))?;

    chart.configure_axes().draw()?;

    chart.draw_series(
        latent
            .row_iter()
            .zip(styles.iter())
            .filter(|(z, _)| z.iter().take(3).all(|x| x.is_finite()))
            .map(|(z, &style)| {
                Circle::new(
                    (z[0] as f64, z[1] as f64, z[2] as f64),
                    POINT_SIZE - 1,
                    style,
                )
            }),
    )?;

    root.present()?;
    Ok(())
}

/// Scatter plot of the first two or three latent axes
///
/// Returns `false` without drawing when the embedding has a single
/// dimension.
fn draw_embedding(file: &str, caption: &str, latent: &Mat, labels: Option<&[usize]>) -> anyhow::Result<bool> {
    let styles = point_styles(latent.nrows(), labels);
    match latent.ncols() {
        0 | 1 => {
            warn!("{}-dimensional embedding; skipped {}", latent.ncols(), file);
            return Ok(false);
        }
        2 => draw_scatter_2d(file, caption, latent, &styles),
        _ => draw_scatter_3d(file, caption, latent, &styles),
    }
    .context(LupinError::Output(file.to_string()))?;
    info!("Wrote {}", file);
    Ok(true)
}

/// `{out}.fig_projection.svg`
pub fn plot_projection(out: &str, latent: &Mat) -> anyhow::Result<bool> {
    let file = out.to_string() + ".fig_projection.svg";
    draw_embedding(&file, "latent embedding", latent, None)
}

/// `{out}.fig_cluster.svg`: cells colored by cluster
pub fn plot_clusters(out: &str, latent: &Mat, labels: &[usize]) -> anyhow::Result<bool> {
    let file = out.to_string() + ".fig_cluster.svg";
    let num_clusters = labels.iter().max().map(|&k| k + 1).unwrap_or(0);
    if num_clusters > Palette99::COLORS.len() {
        warn!(
            "{} clusters; colors repeat after cluster {}",
            num_clusters,
            Palette99::COLORS.len() - 1
        );
    }
    draw_embedding(&file, "clusters", latent, Some(labels))
}

/// `{out}.fig_bic.svg`: adjusted BIC vs. the number of components
pub fn plot_bic_curve(out: &str, curve: &BicCurve) -> anyhow::Result<bool> {
    let file = out.to_string() + ".fig_bic.svg";

    let points: Vec<(f64, f64)> = curve
        .components
        .iter()
        .zip(curve.adjusted_bic.iter())
        .filter(|(_, b)| b.is_finite())
        .map(|(&k, &b)| (k as f64, b))
        .collect();

    if points.is_empty() {
        warn!("no finite adjusted BIC; skipped {}", file);
        return Ok(false);
    }

    let draw = || -> anyhow::Result<()> {
        let kmax = curve.components.last().copied().unwrap_or(1) as f64;
        let yr = finite_range(points.iter().map(|&(_, b)| b));

        let root = SVGBackend::new(&file, FIGURE_SIZE).into_drawing_area();
        root.fill(&WHITE)?;

        let mut chart = ChartBuilder::on(&root)
            .caption("model selection", ("sans-serif", 20))
            .margin(10)
            .x_label_area_size(40)
            .y_label_area_size(80)
            .build_cartesian_2d(0.5..(kmax + 0.5), yr)?;

        chart
            .configure_mesh()
            .x_desc("number of components")
            .y_desc("adjusted BIC")
            .draw()?;

        chart.draw_series(LineSeries::new(points.iter().copied(), &BLACK))?;
        chart.draw_series(
            points
                .iter()
                .map(|&p| Circle::new(p, POINT_SIZE, RED.filled())),
        )?;

        root.present()?;
        Ok(())
    };

    draw().context(LupinError::Output(file.clone()))?;
    info!("Wrote {}", file);
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use matrix_util::common_io::create_temp_dir_file;

    fn temp_prefix() -> anyhow::Result<String> {
        let dir = create_temp_dir_file("")?;
        std::fs::create_dir_all(&dir)?;
        Ok(dir.to_string_lossy().into_owned() + "/plot")
    }

    #[test]
    fn ranges_handle_degenerate_values() {
        assert_eq!(finite_range(vec![f64::NAN]), -1.0..1.0);
        assert_eq!(finite_range(vec![2., 2.]), 1.5..2.5);
        let r = finite_range(vec![0., f64::INFINITY, 10.]);
        assert!(r.start < 0. && r.end > 10. && r.end < 11.);
    }

    #[test]
    fn figures_are_written() -> anyhow::Result<()> {
        let out = temp_prefix()?;
        let labels: Vec<usize> = (0..30).map(|i| i % 3).collect();

        let latent_2d = Mat::from_fn(30, 2, |i, j| (i % 3) as f32 + j as f32 * 0.1);
        assert!(plot_projection(&out, &latent_2d)?);
        assert!(std::path::Path::new(&(out.clone() + ".fig_projection.svg")).exists());

        let latent_3d = Mat::from_fn(30, 4, |i, j| ((i + j) % 5) as f32);
        assert!(plot_clusters(&out, &latent_3d, &labels)?);
        assert!(std::path::Path::new(&(out.clone() + ".fig_cluster.svg")).exists());

        let latent_1d = Mat::from_fn(30, 1, |i, _| i as f32);
        assert!(!plot_projection(&(out.clone() + "_1d"), &latent_1d)?);

        let curve = BicCurve {
            components: vec![1, 2, 3],
            bic: vec![30., 10., f64::INFINITY],
            adjusted_bic: vec![31., 12., f64::INFINITY],
        };
        assert!(plot_bic_curve(&out, &curve)?);
        assert!(std::path::Path::new(&(out + ".fig_bic.svg")).exists());
        Ok(())
    }

    #[test]
    fn many_clusters_cycle_colors() {
        assert_eq!(cluster_style(3).color, cluster_style(3 + Palette99::COLORS.len()).color);
    }
}
