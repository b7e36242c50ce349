use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, warn};
use mockup_render::config::{parse_preset_pairs, Config, Engine, Overrides};
use mockup_render::render::{find_renderer, list_patterns, RenderError, Renderer};
use mockup_render::{extract_color_from_path, Color, Params};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

#[derive(Parser, Debug)]
#[command(author, version, about = "Derive thread colors from pattern images and batch render garment mockups")]
struct Args {
    /// Config file path
    #[arg(long, default_value = "config.json")]
    config: PathBuf,

    /// Render samples (8-256)
    #[arg(long)]
    samples: Option<u32>,

    /// Render engine
    #[arg(long, value_enum)]
    engine: Option<Engine>,

    /// Resolution scale in percent (50, 75 or 100)
    #[arg(long, value_parser = parse_resolution)]
    resolution: Option<u32>,

    /// Output image width in pixels
    #[arg(long)]
    width: Option<u32>,

    /// Output image height in pixels
    #[arg(long)]
    height: Option<u32>,

    /// Thread color (#RRGGBB), used instead of the color extracted from each pattern
    #[arg(long = "color", visible_alias = "threads-color")]
    threads_color: Option<Color>,

    /// Render presets as camera/frame pairs, e.g. `--preset Camera.001 180 Camera.002 240`
    #[arg(long, num_args = 1.., value_name = "ARGS")]
    preset: Option<Vec<String>>,

    /// Camera names to render
    #[arg(long, num_args = 1..)]
    cameras: Option<Vec<String>>,

    /// Output directory
    #[arg(long)]
    output: Option<PathBuf>,

    /// Directory holding the pattern images
    #[arg(long, default_value = "patterns")]
    patterns_dir: PathBuf,

    /// Render script template with placeholders
    #[arg(long, default_value = "render_rashguard.py")]
    script: PathBuf,

    /// Renderer executable, searched in the usual install locations if omitted
    #[arg(long)]
    blender: Option<PathBuf>,

    /// Pixels with alpha above this count towards the thread color
    #[arg(long, default_value_t = 200)]
    alpha_threshold: u8,

    /// List available patterns and exit
    #[arg(long)]
    list_patterns: bool,

    /// List available cameras and exit
    #[arg(long)]
    list_cameras: bool,

    /// Print the thread color of every pattern and exit without rendering
    #[arg(long)]
    extract_only: bool,
}

fn parse_resolution(s: &str) -> Result<u32, String> {
    match s.parse::<u32>() {
        Ok(scale @ (50 | 75 | 100)) => Ok(scale),
        _ => Err(format!("'{}' is not one of 50, 75, 100", s)),
    }
}

impl Args {
    fn overrides(&self) -> Result<Overrides> {
        let presets = match &self.preset {
            Some(args) => Some(parse_preset_pairs(args.as_slice())?).filter(|p| !p.is_empty()),
            None => None,
        };

        Ok(Overrides {
            samples: self.samples,
            engine: self.engine,
            resolution_scale: self.resolution,
            output_width: self.width,
            output_height: self.height,
            threads_color: self.threads_color,
            presets,
            cameras: self.cameras.clone(),
            output_dir: self.output.clone(),
        })
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    exit_code(run(Args::parse(), &mut std::io::stdout().lock()))
}

/// Success only when every pattern went through.
fn exit_code(result: Result<bool>) -> ExitCode {
    match result {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Listings and extracted colors go to `out`, progress goes to the log.
fn run<W: Write>(args: Args, out: &mut W) -> Result<bool> {
    let params = Params {
        alpha_threshold: args.alpha_threshold,
        ..Params::default()
    };

    if args.list_patterns {
        print_patterns(out, &args.patterns_dir)?;
        return Ok(true);
    }

    if args.list_cameras {
        writeln!(out, "To see available cameras, render with verbose output")?;
        return Ok(true);
    }

    let patterns = list_patterns(&args.patterns_dir)?;
    if patterns.is_empty() {
        return Err(RenderError::NoPatterns(args.patterns_dir.clone()).into());
    }

    if args.extract_only {
        return print_colors(out, &args.patterns_dir, &patterns, params);
    }

    let mut config = Config::load(&args.config)?;
    config.apply(args.overrides()?);

    let executable = find_renderer(args.blender.as_deref())?;
    let work_dir = std::env::current_dir().context("could not determine the working directory")?;
    let renderer = Renderer::new(executable, config, &args.script, work_dir)
        .with_context(|| format!("could not prepare renders from {}", args.script.display()))?
        .with_params(params);

    info!("will render {} pattern(s): {}", patterns.len(), patterns.join(", "));
    let report = renderer.render_all(&args.patterns_dir, &patterns);

    if report.is_success() {
        info!("all {} patterns rendered", report.total());
    } else {
        warn!("{} of {} patterns failed:", report.failed.len(), report.total());
        for (pattern, e) in &report.failed {
            warn!("  - {}: {}", pattern, e);
        }
    }
    info!("output saved to: {}/", renderer.config().output_dir.display());

    Ok(report.is_success())
}

fn print_patterns<W: Write>(out: &mut W, dir: &Path) -> Result<()> {
    match list_patterns(dir) {
        Ok(patterns) if patterns.is_empty() => writeln!(out, "No patterns found")?,
        Ok(patterns) => {
            writeln!(out, "Available patterns:")?;
            for pattern in patterns {
                writeln!(out, "  - {}", pattern)?;
            }
        }
        Err(RenderError::PatternsDirMissing(_)) => writeln!(out, "Patterns directory not found")?,
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

fn print_colors<W: Write>(out: &mut W, dir: &Path, patterns: &[String], params: Params) -> Result<bool> {
    let mut ok = true;
    for pattern in patterns {
        match extract_color_from_path(dir.join(pattern), params) {
            Ok(color) => writeln!(out, "{}  {}", pattern, color)?,
            Err(e) => {
                warn!("skipping {}: {}", pattern, e);
                ok = false;
            }
        }
    }
    Ok(ok)
}
