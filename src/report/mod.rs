//! Collection of routines to build the characterization report
//!
//! The analyses describe the report as a sequence of [Page]s; the pages are
//! turned into figures and a LaTeX document, compiled into a PDF file when the
//! `pdf` feature is enabled.

use nalgebra::DMatrix;
use std::{
    fmt::Write as _,
    fs::{self, File},
    io::{self, Write},
    path::{Path, PathBuf},
    time::Instant,
};

use crate::{measurements::SummaryRow, ptc::PtcFit, ptc::PtcSample};

#[cfg(feature = "plot")]
mod figures;
mod latex;

#[derive(Debug, thiserror::Error)]
pub enum ReportError {
    #[error("failed to create report folder {0:?}")]
    ReportPath(PathBuf, #[source] io::Error),
    #[error("failed to write {0:?}")]
    Write(PathBuf, #[source] io::Error),
    #[error("failed to draw figure {0:?}: {1}")]
    Figure(PathBuf, String),
    #[error("failed to compile the LaTeX report: {0}")]
    Compile(String),
}
type Result<T> = std::result::Result<T, ReportError>;

/// Report first page: device and test summary
#[derive(Debug, Clone, Default)]
pub struct TitlePage {
    pub camera: String,
    pub device_id: String,
    /// (width, height)
    pub dev_size: (usize, usize),
    pub date: String,
    pub firmware: Option<String>,
    /// sensor temperature [K]
    pub temperature: Option<f64>,
    /// report creation time
    pub generated: String,
    pub bias: bool,
    pub dark: bool,
    pub flat: bool,
}
impl TitlePage {
    /// Device and test summary text
    pub fn text(&self) -> String {
        let temperature = match self.temperature {
            Some(t) if t > 0. => format!("{t:.2} K (measured)"),
            _ => String::from("140 K (assumed)"),
        };
        let mut text = format!("Cosmetic report for DeviceID: {}\n", self.device_id);
        let _ = writeln!(text, "Device size: {} x {}\n", self.dev_size.0, self.dev_size.1);
        let _ = writeln!(
            text,
            "Standard analysis exposures taken {} using {} camera",
            self.date, self.camera
        );
        let _ = writeln!(
            text,
            "with firmware: {}",
            self.firmware.as_deref().unwrap_or("unknown")
        );
        let _ = writeln!(text, "at temperature {temperature}\n");
        let _ = writeln!(
            text,
            "Report generated {}; {} v{}\n",
            self.generated,
            env!("CARGO_PKG_NAME"),
            env!("CARGO_PKG_VERSION")
        );
        text.push_str("Contents:\n");
        if self.bias {
            text.push_str("- Bias frames\n");
        }
        if self.dark {
            text.push_str("- Standard operating dark frames\n");
        }
        if self.flat {
            text.push_str("- Flat fields vs exposure time\n");
        }
        text
    }
}

/// Frame image with its histograms and a summary text
#[derive(Debug, Clone)]
pub struct HistogramPage {
    pub title: String,
    pub caption: String,
    pub data: DMatrix<f64>,
}

/// One panel of the dark frames time series
#[derive(Debug, Clone, Default)]
pub struct TimeSeriesPanel {
    pub name: String,
    /// seconds before the most recent acquisition
    pub times: Vec<f64>,
    /// whole chip mean per acquisition [ADU]
    pub whole_chip: Vec<f64>,
    /// column segment means, per segment then per acquisition [ADU]
    pub segments: Vec<Vec<f64>>,
}

/// Mean dark signal versus time
#[derive(Debug, Clone)]
pub struct TimeSeriesPage {
    pub title: String,
    pub panels: Vec<TimeSeriesPanel>,
}

/// Photon transfer curve of a channel and its fit
#[derive(Debug, Clone)]
pub struct PtcCurve {
    pub label: String,
    pub sample: PtcSample,
    pub fit: PtcFit,
}

/// Linearity and photon transfer curves of all the channels
#[derive(Debug, Clone)]
pub struct PtcPage {
    pub title: String,
    pub curves: Vec<PtcCurve>,
}

#[derive(Debug, Clone)]
pub enum Page {
    Title(TitlePage),
    Histogram(HistogramPage),
    TimeSeries(TimeSeriesPage),
    Ptc(PtcPage),
    Summary(Vec<SummaryRow>),
}
impl Page {
    pub fn title(&self) -> &str {
        match self {
            Page::Title(_) => "Summary",
            Page::Histogram(page) => &page.title,
            Page::TimeSeries(page) => &page.title,
            Page::Ptc(page) => &page.title,
            Page::Summary(_) => "Summary table",
        }
    }
    pub fn is_histogram(&self) -> bool {
        matches!(self, Page::Histogram(_))
    }
}

/// Ordered pages of the report
#[derive(Debug, Clone, Default)]
pub struct Report {
    pages: Vec<Page>,
}
impl Report {
    pub fn new() -> Self {
        Default::default()
    }
    pub fn push(&mut self, page: Page) {
        self.pages.push(page);
    }
    pub fn extend<I: IntoIterator<Item = Page>>(&mut self, pages: I) {
        self.pages.extend(pages);
    }
    pub fn pages(&self) -> &[Page] {
        &self.pages
    }
    pub fn len(&self) -> usize {
        self.pages.len()
    }
    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }
    /// Pages which title starts with `prefix`
    pub fn pages_titled<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a Page> + 'a {
        self.pages
            .iter()
            .filter(move |page| page.title().starts_with(prefix))
    }
    /// Writes the figures and the LaTeX source of the report into `folder`
    ///
    /// Returns the LaTeX source.
    pub fn render<P: AsRef<Path>>(&self, folder: P, name: &str) -> Result<String> {
        let folder = folder.as_ref();
        if !folder.exists() {
            fs::create_dir_all(folder)
                .map_err(|e| ReportError::ReportPath(folder.to_path_buf(), e))?;
        }
        let now = Instant::now();
        let mut figures = Vec::with_capacity(self.pages.len());
        for (i, page) in self.pages.iter().enumerate() {
            let path = folder.join(format!("page{:03}.png", i + 1));
            figures.push(self.figure(page, path)?);
        }
        log::info!("... figures drawn in {}s", now.elapsed().as_secs());
        let source = latex::document(&self.pages, &figures);
        let path = folder.join(name).with_extension("tex");
        let mut file = File::create(&path).map_err(|e| ReportError::Write(path.clone(), e))?;
        file.write_all(source.as_bytes())
            .map_err(|e| ReportError::Write(path.clone(), e))?;
        Ok(source)
    }
    #[cfg(feature = "plot")]
    fn figure(&self, page: &Page, path: PathBuf) -> Result<Option<PathBuf>> {
        figures::draw(page, &path)
            .map_err(|e| ReportError::Figure(path.clone(), e.to_string()))
            .map(|drawn| drawn.then_some(path))
    }
    #[cfg(not(feature = "plot"))]
    fn figure(&self, _page: &Page, _path: PathBuf) -> Result<Option<PathBuf>> {
        Ok(None)
    }
    /// Renders the report and compiles it into the PDF file `path`
    ///
    /// The figures and the LaTeX source are written into a `report` folder next to `path`.
    pub fn write_pdf<P: AsRef<Path>>(&self, path: P) -> Result<PathBuf> {
        let path = path.as_ref();
        let folder = path
            .parent()
            .map(|parent| parent.join("report"))
            .unwrap_or_else(|| PathBuf::from("report"));
        let name = path
            .file_stem()
            .map(|stem| stem.to_string_lossy().to_string())
            .unwrap_or_else(|| String::from("analysis_report"));
        let source = self.render(&folder, &name)?;
        compile(source, path)
    }
}

#[cfg(feature = "pdf")]
fn compile(source: String, path: &Path) -> Result<PathBuf> {
    let now = Instant::now();
    log::info!("Compiling the report ...");
    let pdf_data: Vec<u8> =
        tectonic::latex_to_pdf(source).map_err(|e| ReportError::Compile(e.to_string()))?;
    let mut doc = File::create(path).map_err(|e| ReportError::Write(path.to_path_buf(), e))?;
    doc.write_all(&pdf_data)
        .map_err(|e| ReportError::Write(path.to_path_buf(), e))?;
    log::info!(" ... report compiled in {}s", now.elapsed().as_secs());
    Ok(path.to_path_buf())
}
#[cfg(not(feature = "pdf"))]
fn compile(_source: String, path: &Path) -> Result<PathBuf> {
    let tex = path
        .parent()
        .map(|parent| parent.join("report"))
        .unwrap_or_else(|| PathBuf::from("report"))
        .join(path.file_name().unwrap_or_default())
        .with_extension("tex");
    log::warn!(
        "PDF compilation requires the `pdf` feature, the report LaTeX source is {:?}",
        tex
    );
    Ok(tex)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn title_page_lists_present_conditions() {
        let page = TitlePage {
            camera: "cmost".into(),
            device_id: "d42".into(),
            dev_size: (4096, 4096),
            date: "2024-04-13".into(),
            bias: true,
            flat: true,
            ..Default::default()
        };
        let text = page.text();
        assert!(text.starts_with("Cosmetic report for DeviceID: d42\n"));
        assert!(text.contains("Device size: 4096 x 4096\n"));
        assert!(text.contains("taken 2024-04-13 using cmost camera"));
        assert!(text.contains("at temperature 140 K (assumed)"));
        assert!(text.contains("- Bias frames\n"));
        assert!(!text.contains("- Standard operating dark frames"));
        assert!(text.ends_with("- Flat fields vs exposure time\n"));
    }

    #[test]
    fn measured_temperature() {
        let page = TitlePage {
            temperature: Some(141.5),
            ..Default::default()
        };
        assert!(page.text().contains("at temperature 141.50 K (measured)"));
    }

    #[test]
    fn render_writes_latex_source() {
        let dir = std::env::temp_dir().join("sensor-report-render");
        let mut report = Report::new();
        report.push(Page::Title(TitlePage::default()));
        report.push(Page::Histogram(HistogramPage {
            title: "Bias frames - gain: high".into(),
            caption: "Read noise: 1.00 ADU".into(),
            data: DMatrix::from_element(2, 2, 1.),
        }));
        let source = report.render(&dir, "test_report").unwrap();
        assert!(dir.join("test_report.tex").exists());
        assert!(source.contains(r"\begin{document}"));
        assert_eq!(report.pages_titled("Bias frames").count(), 1);
    }

    #[cfg(not(feature = "pdf"))]
    #[test]
    fn latex_source_stands_for_the_pdf() {
        let dir = std::env::temp_dir().join("sensor-report-no-pdf");
        let mut report = Report::new();
        report.push(Page::Title(TitlePage::default()));
        let written = report
            .write_pdf(dir.join("cmost_d42_analysis_report.pdf"))
            .unwrap();
        assert_eq!(written, dir.join("report").join("cmost_d42_analysis_report.tex"));
        assert!(written.exists());
    }
}
