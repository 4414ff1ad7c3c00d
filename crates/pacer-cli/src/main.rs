use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use log::info;
use pacer_lib::{
    microfarads,
    plot::{figure_from_simulation, Figure, PlotBackend, Series},
    simulate_entropy, simulate_seeded, solve, validate_parameters, ResistanceRange,
    SamplingWindow, SimulationConfig, SimulationResult, DEFAULT_NUM_POINTS, DEFAULT_T_MAX,
};
use pacer_run::{read_preset, run_session, sample_rows, write_bundle, write_samples};
use plotters::prelude::*;
use plotters::series::DashedLineSeries;
use std::{
    io,
    path::{Path, PathBuf},
};

#[derive(Parser)]
#[command(
    name = "pacer",
    version,
    about = "Pacer: RC-discharge pacemaker pulse simulator"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum OutputFormat {
    Json,
    Csv,
}

#[derive(Args, Debug, Clone)]
struct WindowArgs {
    /// Pulse window length (s)
    #[arg(long, default_value_t = DEFAULT_T_MAX)]
    t_max: f64,
    /// Samples per pulse
    #[arg(long, default_value_t = DEFAULT_NUM_POINTS)]
    points: usize,
}

#[derive(Args, Debug, Clone)]
struct SimArgs {
    /// Requested initial voltage (V)
    #[arg(long, default_value_t = 5.0)]
    v0: f64,
    /// Base tissue resistance (Ω)
    #[arg(long, default_value_t = 500.0)]
    r: f64,
    /// Capacitance (µF)
    #[arg(long, default_value_t = 20.0)]
    c_uf: f64,
    #[arg(long, default_value_t = 5)]
    beats: usize,
    /// Time between beat onsets (s)
    #[arg(long, default_value_t = 1.0)]
    interval: f64,
    /// Raise V0 so that V(τ) >= v-min
    #[arg(long)]
    feedback: bool,
    #[arg(long, default_value_t = 1.0)]
    v_min: f64,
    /// Draw each beat's resistance from [r-min, r-max]
    #[arg(long)]
    arrhythmia: bool,
    #[arg(long, default_value_t = 300.0)]
    r_min: f64,
    #[arg(long, default_value_t = 1000.0)]
    r_max: f64,
    /// Seed for arrhythmia sampling; entropy when omitted
    #[arg(long)]
    seed: Option<u64>,
    #[command(flatten)]
    window: WindowArgs,
}

impl SimArgs {
    fn to_config(&self) -> SimulationConfig {
        SimulationConfig {
            v0_user: self.v0,
            r_base: self.r,
            c: microfarads(self.c_uf),
            num_beats: self.beats,
            interval: self.interval,
            use_feedback: self.feedback,
            v_min: self.v_min,
            arrhythmia: self.arrhythmia.then_some(ResistanceRange {
                min: self.r_min,
                max: self.r_max,
            }),
            window: self.window.to_window(),
        }
    }

    fn run(&self) -> Result<SimulationResult> {
        let config = self.to_config();
        let result = match self.seed {
            Some(seed) => simulate_seeded(&config, seed),
            None => simulate_entropy(&config),
        };
        result.context("simulation rejected parameters")
    }
}

impl WindowArgs {
    fn to_window(&self) -> SamplingWindow {
        SamplingWindow {
            t_max: self.t_max,
            num_points: self.points,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Evaluate a single discharge pulse
    Pulse {
        #[arg(long, default_value_t = 5.0)]
        v0: f64,
        #[arg(long, default_value_t = 500.0)]
        r: f64,
        #[arg(long, default_value_t = 20.0)]
        c_uf: f64,
        #[command(flatten)]
        window: WindowArgs,
    },
    /// Simulate a train of beats and print the stitched series
    Simulate {
        #[command(flatten)]
        sim: SimArgs,
        #[arg(long, value_enum, default_value = "json")]
        format: OutputFormat,
    },
    /// Power and energy summary of a simulated train
    Metrics {
        #[command(flatten)]
        sim: SimArgs,
    },
    /// Check one parameter set against effectiveness, safety and duration limits
    Validate {
        #[arg(long, default_value_t = 5.0)]
        v0: f64,
        #[arg(long, default_value_t = 500.0)]
        r: f64,
        #[arg(long, default_value_t = 20.0)]
        c_uf: f64,
        #[arg(long, default_value_t = 1.0)]
        v_min: f64,
    },
    /// Render the simulated beats to a PNG via plotters
    Plot {
        #[command(flatten)]
        sim: SimArgs,
        #[arg(long)]
        out: PathBuf,
    },
    /// Run a TOML session preset and write its bundle to a directory
    Run {
        #[arg(long)]
        preset: PathBuf,
        #[arg(long)]
        out: PathBuf,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();
    match cli.command {
        Commands::Pulse { v0, r, c_uf, window } => cmd_pulse(v0, r, c_uf, &window)?,
        Commands::Simulate { sim, format } => cmd_simulate(&sim, format)?,
        Commands::Metrics { sim } => cmd_metrics(&sim)?,
        Commands::Validate { v0, r, c_uf, v_min } => cmd_validate(v0, r, c_uf, v_min)?,
        Commands::Plot { sim, out } => cmd_plot(&sim, &out)?,
        Commands::Run { preset, out } => cmd_run(&preset, &out)?,
    }
    Ok(())
}

fn cmd_pulse(v0: f64, r: f64, c_uf: f64, window: &WindowArgs) -> Result<()> {
    let pulse = solve(v0, r, microfarads(c_uf), window.to_window())?;
    println!("{}", serde_json::to_string(&pulse)?);
    Ok(())
}

fn cmd_simulate(sim: &SimArgs, format: OutputFormat) -> Result<()> {
    let result = sim.run()?;
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string(&result)?),
        OutputFormat::Csv => {
            let metrics = result.energy_metrics()?;
            write_samples(io::stdout().lock(), &sample_rows(&result, &metrics))?;
        }
    }
    Ok(())
}

fn cmd_metrics(sim: &SimArgs) -> Result<()> {
    let result = sim.run()?;
    let metrics = result.energy_metrics()?;
    println!("{}", serde_json::to_string(&metrics.summary())?);
    Ok(())
}

fn cmd_validate(v0: f64, r: f64, c_uf: f64, v_min: f64) -> Result<()> {
    let report = validate_parameters(v0, r, microfarads(c_uf), v_min)?;
    println!("{}", serde_json::to_string(&report)?);
    Ok(())
}

fn cmd_plot(sim: &SimArgs, out: &Path) -> Result<()> {
    let result = sim.run()?;
    let fig = figure_from_simulation(&result, sim.feedback.then_some(sim.v_min));
    PngBackend::new(out).draw(&fig)?;
    info!("wrote {}", out.display());
    Ok(())
}

fn cmd_run(preset: &Path, out: &Path) -> Result<()> {
    let preset = read_preset(preset)?;
    let bundle = run_session(&preset)?;
    write_bundle(out, &bundle)?;
    println!("{}", serde_json::to_string(&bundle.manifest)?);
    Ok(())
}

struct PngBackend<'a> {
    path: &'a Path,
    size: (u32, u32),
}

impl<'a> PngBackend<'a> {
    fn new(path: &'a Path) -> Self {
        Self {
            path,
            size: (1000, 500),
        }
    }
}

impl PlotBackend for PngBackend<'_> {
    fn draw(&mut self, fig: &Figure) -> Result<()> {
        let root = BitMapBackend::new(self.path, self.size).into_drawing_area();
        root.fill(&WHITE)?;
        let (x_min, x_max, y_min, y_max) = fig.bounds().unwrap_or((0.0, 1.0, 0.0, 1.0));
        let mut chart = ChartBuilder::on(&root)
            .margin(10)
            .caption(
                fig.title.clone().unwrap_or_else(|| "Plot".into()),
                ("sans-serif", 24),
            )
            .x_label_area_size(30)
            .y_label_area_size(40)
            .build_cartesian_2d(x_min..x_max, y_min.min(0.0)..y_max * 1.05)?;
        chart
            .configure_mesh()
            .x_desc(fig.x.label.clone().unwrap_or_default())
            .y_desc(fig.y.label.clone().unwrap_or_default())
            .draw()?;
        for series in &fig.series {
            match series {
                Series::Line(line) => {
                    let (r, g, b) = line.style.color.rgb();
                    let color = RGBColor(r, g, b);
                    let style = color.stroke_width(line.style.width.round().max(1.0) as u32);
                    let points = line.points.iter().map(|p| (p[0], p[1]));
                    let drawn = match line.style.dash {
                        Some([on, off]) => chart.draw_series(DashedLineSeries::new(
                            points,
                            on as u32,
                            off as u32,
                            style,
                        ))?,
                        None => chart.draw_series(LineSeries::new(points, style))?,
                    };
                    drawn
                        .label(line.name.clone())
                        .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
                }
            }
        }
        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()?;
        root.present()?;
        Ok(())
    }
}
