use itertools::Itertools;
use std::path::PathBuf;

use super::Page;
use crate::measurements::SummaryRow;

/// Escapes the LaTeX special characters of a plain text
pub fn escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '_' | '%' | '&' | '#' | '$' | '{' | '}' => {
                escaped.push('\\');
                escaped.push(c);
            }
            '<' => escaped.push_str(r"\textless{}"),
            '>' => escaped.push_str(r"\textgreater{}"),
            '~' => escaped.push_str(r"\textasciitilde{}"),
            '^' => escaped.push_str(r"\textasciicircum{}"),
            '\\' => escaped.push_str(r"\textbackslash{}"),
            _ => escaped.push(c),
        }
    }
    escaped
}

/// Multi-line text as LaTeX paragraphs, blank lines separating paragraphs
fn lines(text: &str) -> String {
    text.lines()
        .map(|line| {
            if line.is_empty() {
                String::from(r"\medskip")
            } else {
                format!(r"\noindent {}\\", escape(line))
            }
        })
        .join("\n")
}

fn figure(path: &Option<PathBuf>) -> String {
    match path {
        Some(path) => format!(
            r#"
\begin{{center}}
\includegraphics[width=0.95\textwidth]{{{}}}
\end{{center}}
"#,
            path.display()
        ),
        None => String::new(),
    }
}

/// Summary table of the measurements
pub fn summary_table(rows: &[SummaryRow]) -> String {
    let data = rows
        .iter()
        .map(|row| {
            let cells = row.cells();
            format!(
                " {} & {} & {} & {} & {} \\\\",
                escape(&cells[0]),
                cells[1],
                cells[2],
                cells[3],
                cells[4]
            )
        })
        .join("\n");
    format!(
        r#"
\begin{{tabular}}{{lrrrr}}\toprule
 Gain & Gain (e-/ADU) & Read Noise (e-) & Dark Current (me-/s) & Well depth (e-) \\\midrule
{}
\bottomrule
\end{{tabular}}
"#,
        data
    )
}

fn page(page: &Page, figure_path: &Option<PathBuf>) -> String {
    match page {
        Page::Title(title) => format!(
            r#"
\section*{{Summary}}
{}
"#,
            lines(&title.text())
        ),
        Page::Histogram(histogram) => format!(
            r#"
\section*{{{}}}
{}
{}
"#,
            escape(&histogram.title),
            figure(figure_path),
            lines(&histogram.caption)
        ),
        Page::TimeSeries(series) => format!(
            r#"
\section*{{{}}}
{}
"#,
            escape(&series.title),
            figure(figure_path)
        ),
        Page::Ptc(ptc) => {
            let legend = ptc
                .curves
                .iter()
                .map(|curve| format!("{} gain: {:.2} e-/ADU", curve.label, curve.fit.gain))
                .join("\n");
            format!(
                r#"
\section*{{{}}}
{}
{}
"#,
                escape(&ptc.title),
                figure(figure_path),
                lines(&legend)
            )
        }
        Page::Summary(rows) => format!(
            r#"
\section*{{Summary table}}
\begin{{center}}
{}
\end{{center}}
"#,
            summary_table(rows)
        ),
    }
}

/// Complete LaTeX document, one page per report page
pub fn document(pages: &[Page], figures: &[Option<PathBuf>]) -> String {
    let body = pages
        .iter()
        .zip(figures.iter().chain(std::iter::repeat(&None)))
        .map(|(p, f)| page(p, f))
        .join("\n\\clearpage\n");
    format!(
        r#"
\documentclass{{article}}
\usepackage[margin=1.5cm]{{geometry}}
\usepackage{{graphicx}}
\usepackage{{booktabs}}
\pagestyle{{plain}}

\begin{{document}}
{}
\end{{document}}
"#,
        body
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::measurements::MeasurementSet;
    use crate::gain::Channel;

    #[test]
    fn special_characters() {
        assert_eq!(escape("Pixels > 50 ADU: 3, 0.1%"), r"Pixels \textgreater{} 50 ADU: 3, 0.1\%");
        assert_eq!(escape("cmost_d42"), r"cmost\_d42");
    }

    #[test]
    fn table_rows_with_blank_cells() {
        let rows = MeasurementSet::new()
            .with_read_noise(Channel::DualHigh, 2.)
            .with_gain(Channel::DualHigh, 1.5)
            .with_well_depth(Channel::Low, 30000.)
            .summary();
        let table = summary_table(&rows);
        assert!(table.contains(r" high (dual-gain) & 1.50 & 3.00 &  &  \\"));
        assert!(table.contains(r" low &  &  &  & 30000 \\"));
        assert!(table.contains(r"\toprule"));
    }

    #[test]
    fn one_page_per_report_page() {
        let rows = MeasurementSet::new().with_read_noise(Channel::Low, 1.).summary();
        let pages = vec![Page::Summary(rows.clone()), Page::Summary(rows)];
        let source = document(&pages, &[]);
        assert_eq!(source.matches(r"\section*{Summary table}").count(), 2);
        assert_eq!(source.matches(r"\clearpage").count(), 1);
    }
}
