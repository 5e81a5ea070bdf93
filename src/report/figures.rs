use colorous::{Color, TABLEAU10, VIRIDIS};
use plotters::{coord::Shift, prelude::*};
use std::{error::Error, path::Path};

use super::{HistogramPage, Page, PtcPage, TimeSeriesPage};

type Result<T> = std::result::Result<T, Box<dyn Error>>;

const SIZE: (u32, u32) = (1536, 768);

/// Draws the figure of a page into `path`
///
/// Returns `false` for the pages without a figure.
pub fn draw(page: &Page, path: &Path) -> Result<bool> {
    match page {
        Page::Title(_) | Page::Summary(_) => Ok(false),
        Page::Histogram(page) => histogram(page, path).map(|_| true),
        Page::TimeSeries(page) => time_series(page, path).map(|_| true),
        Page::Ptc(page) => ptc(page, path).map(|_| true),
    }
}

fn rgb(color: Color) -> RGBColor {
    RGBColor(color.r, color.g, color.b)
}

/// Value at percentile `q` of sorted values
fn percentile(sorted: &[f64], q: f64) -> f64 {
    if sorted.is_empty() {
        return f64::NAN;
    }
    let i = ((q / 100.) * (sorted.len() - 1) as f64).round() as usize;
    sorted[i.min(sorted.len() - 1)]
}

fn bars(
    area: &DrawingArea<BitMapBackend, Shift>,
    values: &[f64],
    range: (f64, f64),
    n_bin: usize,
    caption: &str,
) -> Result<()> {
    let (lo, hi) = range;
    let n_bin = n_bin.max(1);
    let width = if hi > lo { (hi - lo) / n_bin as f64 } else { 1. };
    let mut counts = vec![0usize; n_bin];
    for &x in values.iter().filter(|&&x| x >= lo && x <= hi) {
        let i = (((x - lo) / width) as usize).min(n_bin - 1);
        counts[i] += 1;
    }
    let max_count = counts.iter().cloned().max().unwrap_or(0).max(1) as f64;
    let mut chart = ChartBuilder::on(area)
        .caption(caption, ("sans-serif", 20))
        .margin(10)
        .set_label_area_size(LabelAreaPosition::Left, 60)
        .set_label_area_size(LabelAreaPosition::Bottom, 40)
        .build_cartesian_2d(lo..lo + width * n_bin as f64, 0f64..max_count * 1.05)?;
    chart
        .configure_mesh()
        .x_desc("Pixel value [ADU]")
        .y_desc("Pixel count")
        .draw()?;
    let color = rgb(TABLEAU10[0]);
    chart.draw_series(
        counts
            .iter()
            .enumerate()
            .filter(|(_, &count)| count > 0)
            .map(|(i, &count)| {
                let x0 = lo + i as f64 * width;
                Rectangle::new([(x0, 0.), (x0 + width, count as f64)], color.filled())
            }),
    )?;
    Ok(())
}

/// Median frame image, whole range histogram and clipped unit bin histogram
fn histogram(page: &HistogramPage, path: &Path) -> Result<()> {
    let root = BitMapBackend::new(path, SIZE).into_drawing_area();
    root.fill(&WHITE)?;
    let (image, histograms) = root.split_horizontally((SIZE.0 / 2) as i32);
    let (full, clipped) = histograms.split_vertically((SIZE.1 / 2) as i32);

    let data = &page.data;
    let mut sorted: Vec<f64> = data.iter().cloned().filter(|x| x.is_finite()).collect();
    sorted.sort_by(|a, b| a.total_cmp(b));
    if sorted.is_empty() {
        root.present()?;
        return Ok(());
    }

    let (nrows, ncols) = data.shape();
    let step = (nrows.max(ncols) / 256).max(1);
    let vmax = percentile(&sorted, 99.9);
    let scale = |x: f64| {
        if vmax > 0. {
            (x / vmax).clamp(0., 1.)
        } else {
            0.
        }
    };
    let mut chart = ChartBuilder::on(&image)
        .margin(10)
        .set_label_area_size(LabelAreaPosition::Left, 50)
        .set_label_area_size(LabelAreaPosition::Bottom, 40)
        .build_cartesian_2d(0..ncols, 0..nrows)?;
    chart
        .configure_mesh()
        .disable_mesh()
        .x_desc("Column")
        .y_desc("Row")
        .draw()?;
    chart.draw_series(
        (0..nrows)
            .step_by(step)
            .flat_map(|row| (0..ncols).step_by(step).map(move |col| (row, col)))
            .map(|(row, col)| {
                let color = rgb(VIRIDIS.eval_continuous(scale(data[(row, col)])));
                Rectangle::new(
                    [(col, row), ((col + step).min(ncols), (row + step).min(nrows))],
                    color.filled(),
                )
            }),
    )?;

    let range = (sorted[0], sorted[sorted.len() - 1]);
    bars(&full, &sorted, range, 100, "Full range")?;
    let lo = percentile(&sorted, 0.01).floor();
    let hi = percentile(&sorted, 99.99).ceil();
    let n_bin = ((hi - lo) as usize).clamp(1, 10_000);
    bars(&clipped, &sorted, (lo, hi), n_bin, "0.01 to 99.99 percentiles")?;

    root.present()?;
    Ok(())
}

/// Whole chip and column segment mean signals versus time
fn time_series(page: &TimeSeriesPage, path: &Path) -> Result<()> {
    let root = BitMapBackend::new(path, SIZE).into_drawing_area();
    root.fill(&WHITE)?;
    let areas = root.split_evenly((2, 2));
    for (area, panel) in areas.iter().zip(&page.panels) {
        let series = std::iter::once(&panel.whole_chip).chain(&panel.segments);
        let (min, max) = series
            .flatten()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(a, b), &x| (a.min(x), b.max(x)));
        if !(min.is_finite() && max.is_finite()) {
            continue;
        }
        let pad = ((max - min) * 0.05).max(1e-3);
        let t_max = panel.times.iter().cloned().fold(0f64, f64::max).max(1.);
        let mut chart = ChartBuilder::on(area)
            .caption(&panel.name, ("sans-serif", 20))
            .margin(10)
            .set_label_area_size(LabelAreaPosition::Left, 60)
            .set_label_area_size(LabelAreaPosition::Bottom, 40)
            .build_cartesian_2d(0f64..t_max, min - pad..max + pad)?;
        chart
            .configure_mesh()
            .x_desc("Time before last acquisition [s]")
            .y_desc("Mean signal [ADU]")
            .draw()?;
        let mut colors = TABLEAU10.iter().cycle();
        for segment in &panel.segments {
            let color = colors.next().map(|&c| rgb(c)).unwrap_or(BLACK);
            chart.draw_series(LineSeries::new(
                panel.times.iter().cloned().zip(segment.iter().cloned()),
                &color,
            ))?;
        }
        chart
            .draw_series(LineSeries::new(
                panel.times.iter().cloned().zip(panel.whole_chip.iter().cloned()),
                BLACK.stroke_width(2),
            ))?
            .label("whole chip")
            .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &BLACK));
        chart
            .configure_series_labels()
            .border_style(&BLACK)
            .background_style(&WHITE.mix(0.8))
            .position(SeriesLabelPosition::UpperRight)
            .draw()?;
    }
    root.present()?;
    Ok(())
}

/// Signal versus exposure time and variance versus signal with the fitted model
fn ptc(page: &PtcPage, path: &Path) -> Result<()> {
    let root = BitMapBackend::new(path, SIZE).into_drawing_area();
    root.fill(&WHITE)?;
    let (linearity, transfer) = root.split_horizontally((SIZE.0 / 2) as i32);
    let colors: Vec<_> = TABLEAU10.iter().cycle().take(page.curves.len()).map(|&c| rgb(c)).collect();

    let ramps: Vec<_> = page.curves.iter().map(|curve| curve.sample.linearity()).collect();
    let (t_max, s_max) = ramps
        .iter()
        .flatten()
        .fold((0f64, 0f64), |(t, s), &(x, y)| (t.max(x), s.max(y)));
    let mut chart = ChartBuilder::on(&linearity)
        .caption("Linearity", ("sans-serif", 20))
        .margin(10)
        .set_label_area_size(LabelAreaPosition::Left, 60)
        .set_label_area_size(LabelAreaPosition::Bottom, 40)
        .build_cartesian_2d(0f64..t_max.max(1.) * 1.05, 0f64..s_max.max(1.) * 1.05)?;
    chart
        .configure_mesh()
        .x_desc("Exposure time [s]")
        .y_desc("Median signal [ADU]")
        .draw()?;
    for ((curve, ramp), &color) in page.curves.iter().zip(&ramps).zip(&colors) {
        chart
            .draw_series(LineSeries::new(ramp.iter().cloned(), &color))?
            .label(curve.label.as_str())
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &color));
        chart.draw_series(ramp.iter().map(|&p| Circle::new(p, 3, color.filled())))?;
    }
    chart
        .configure_series_labels()
        .border_style(&BLACK)
        .background_style(&WHITE.mix(0.8))
        .position(SeriesLabelPosition::UpperLeft)
        .draw()?;

    let model_x: Vec<f64> = (0..100).map(|i| 10f64.powf(1. + 3. * i as f64 / 99.)).collect();
    let points: Vec<Vec<(f64, f64)>> = page
        .curves
        .iter()
        .map(|curve| {
            curve
                .sample
                .points()
                .iter()
                .filter(|p| p.exp_time > 0. && p.signal > 0. && p.variance > 0.)
                .map(|p| (p.signal, p.variance))
                .collect()
        })
        .collect();
    let (x_max, y_min, y_max) = points.iter().flatten().fold(
        (1e4f64, f64::INFINITY, 1f64),
        |(x_max, y_min, y_max), &(x, y)| (x_max.max(x), y_min.min(y), y_max.max(y)),
    );
    let y_min = if y_min.is_finite() { y_min.min(1.) } else { 1e-1 };
    let mut chart = ChartBuilder::on(&transfer)
        .caption("Photon transfer curve", ("sans-serif", 20))
        .margin(10)
        .set_label_area_size(LabelAreaPosition::Left, 60)
        .set_label_area_size(LabelAreaPosition::Bottom, 40)
        .build_cartesian_2d(
            (1f64..x_max * 2.).log_scale(),
            (y_min * 0.5..y_max * 2.).log_scale(),
        )?;
    chart
        .configure_mesh()
        .x_desc("Median signal [ADU]")
        .y_desc("Variance [ADU^2]")
        .draw()?;
    for ((curve, points), &color) in page.curves.iter().zip(&points).zip(&colors) {
        chart.draw_series(points.iter().map(|&p| Circle::new(p, 3, color.filled())))?;
        chart
            .draw_series(LineSeries::new(
                model_x.iter().map(|&x| (x, curve.fit.eval(x))),
                color.stroke_width(2),
            ))?
            .label(format!("{} gain: {:.2} e-/ADU", curve.label, curve.fit.gain))
            .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &color));
        if curve.fit.noise_floor > 0. {
            chart.draw_series(LineSeries::new(
                [1., x_max * 2.].map(|x| (x, curve.fit.noise_floor)),
                color.mix(0.5),
            ))?;
        }
    }
    chart
        .configure_series_labels()
        .border_style(&BLACK)
        .background_style(&WHITE.mix(0.8))
        .position(SeriesLabelPosition::UpperLeft)
        .draw()?;

    root.present()?;
    Ok(())
}
