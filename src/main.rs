use std::{
    io::{self, Write},
    path::PathBuf,
};

use anyhow::Context;
use sensor_report::{NpzLoader, StandardAnalysis};
use structopt::StructOpt;

#[derive(Debug, StructOpt)]
#[structopt(
    name = "sensor-report",
    about = "Imaging sensor characterization report from bias, dark and flat field exposures",
    after_help = "The PDF report is compiled only when built with the `pdf` feature, otherwise the LaTeX source is written."
)]
struct Opt {
    /// Frame samples are gray coded
    #[structopt(short, long)]
    graycode: bool,
    /// Path to the analysis directory (prompted for if missing)
    #[structopt(parse(from_os_str))]
    directory: Option<PathBuf>,
}

fn prompt() -> anyhow::Result<PathBuf> {
    print!("Analysis directory: ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin()
        .read_line(&mut line)
        .context("failed to read the analysis directory")?;
    Ok(PathBuf::from(line.trim()))
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let opt = Opt::from_args();

    let directory = match opt.directory {
        Some(directory) => directory,
        None => prompt()?,
    };
    let loader = NpzLoader::new()?.graycode(opt.graycode);
    let products = StandardAnalysis::new(&directory, &loader)
        .run()
        .with_context(|| format!("failed to analyze {:?}", directory))?;
    let report = products.write(&directory)?;
    if report.extension().map_or(true, |ext| ext != "pdf") {
        eprintln!(
            "PDF report not compiled: rebuild with `--features pdf` or compile {:?}",
            report
        );
    }
    println!("Report: {:?}", report);

    Ok(())
}
