use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use takeout_core::{exit_code, AlbumBehavior, CancellationToken, Config, DateDivision, ExtensionFixMode, PipelineError};

#[derive(Parser)]
#[command(
    name = "takeout-sort",
    version,
    about = "Reorganize an extracted Google Photos Takeout into a clean, dated, deduplicated library"
)]
struct Cli {
    /// Directory with the extracted Takeout content
    #[arg(short, long)]
    input: Option<PathBuf>,

    /// Output directory for the reorganized library
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Album handling: shortcut, reverse-shortcut, duplicate-copy, json, nothing
    #[arg(long, default_value = "shortcut")]
    albums: AlbumBehavior,

    /// Date folder depth: 0 = flat, 1 = year, 2 = year/month, 3 = year/month/day
    #[arg(long, default_value_t = 0, value_parser = clap::value_parser!(u8).range(0..=3))]
    divide_to_dates: u8,

    /// Extension repair: none, standard, conservative, solo
    #[arg(long, default_value = "standard")]
    fix_extensions: ExtensionFixMode,

    /// Write recovered dates and GPS back into the media files (default)
    #[arg(long, overrides_with = "no_write_exif")]
    write_exif: bool,

    /// Do not write recovered dates and GPS back into the media files
    #[arg(long, overrides_with = "write_exif")]
    no_write_exif: bool,

    /// Skip -edited, -effects and similar derivative images
    #[arg(long)]
    skip_extras: bool,

    /// Guess dates from filename patterns (default)
    #[arg(long, overrides_with = "no_guess_from_name")]
    guess_from_name: bool,

    /// Disable date guessing from filenames
    #[arg(long, overrides_with = "guess_from_name")]
    no_guess_from_name: bool,

    /// Rename Pixel motion photos (.MP/.MV) to .mp4
    #[arg(long)]
    transform_pixel_mp: bool,

    /// Set filesystem creation time to the recovered date (Windows only)
    #[arg(long)]
    update_creation_time: bool,

    /// Treat files over 64 MiB as unique and skip their EXIF writes
    #[arg(long)]
    limit_filesize: bool,

    /// Place partner-shared media under PARTNER_SHARED instead of ALL_PHOTOS
    #[arg(long)]
    divide_partner_shared: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

fn build_config(cli: &Cli) -> Result<Config, PipelineError> {
    let input = cli
        .input
        .clone()
        .ok_or_else(|| PipelineError::Config("--input is required".into()))?;
    let output = cli
        .output
        .clone()
        .ok_or_else(|| PipelineError::Config("--output is required".into()))?;
    let mut config = Config::new(input, output);
    config.album_behavior = cli.albums;
    config.date_division = DateDivision::from_level(cli.divide_to_dates)
        .map_err(PipelineError::Config)?;
    config.extension_fix = cli.fix_extensions;
    config.write_exif = cli.write_exif || !cli.no_write_exif;
    config.skip_extras = cli.skip_extras;
    config.guess_from_name = cli.guess_from_name || !cli.no_guess_from_name;
    config.transform_pixel_mp = cli.transform_pixel_mp;
    config.update_creation_time = cli.update_creation_time;
    config.limit_file_size = cli.limit_filesize;
    config.divide_partner_shared = cli.divide_partner_shared;
    config.verbose = cli.verbose;
    config.validate()?;
    Ok(config)
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    env_logger::Builder::from_env(
        env_logger::Env::default()
            .default_filter_or(if cli.verbose { "debug" } else { "info" }),
    )
    .init();

    let config = match build_config(&cli) {
        Ok(config) => config,
        Err(err) => {
            log::error!("{err}");
            return ExitCode::from(err.exit_code() as u8);
        }
    };

    let cancel_token = CancellationToken::new();
    let handler_token = cancel_token.clone();
    if let Err(err) = ctrlc::set_handler(move || {
        eprintln!("\nInterrupted! Finishing in-flight file operations...");
        handler_token.cancel();
    }) {
        log::warn!("could not install Ctrl-C handler: {err}");
    }

    let t_total = std::time::Instant::now();
    match takeout_core::run_pipeline(&config, Some(&cancel_token)) {
        Ok(summary) => {
            print_summary(&summary, t_total.elapsed());
            ExitCode::from(exit_code::SUCCESS as u8)
        }
        Err(err) => {
            eprintln!("Processing failed: {err}");
            ExitCode::from(err.exit_code() as u8)
        }
    }
}

fn print_summary(summary: &takeout_core::PipelineSummary, elapsed: std::time::Duration) {
    eprintln!("DONE! ({:.2}s)", elapsed.as_secs_f64());
    eprintln!("  media found:            {}", summary.total_media);
    eprintln!("  extensions fixed:       {}", summary.extensions_fixed);
    eprintln!("  extras skipped:         {}", summary.extras_skipped);
    eprintln!("  duplicates removed:     {}", summary.duplicates_removed);
    eprintln!("  album copies merged:    {}", summary.albums_merged);
    eprintln!("  datetimes written:      {}", summary.datetimes_written);
    eprintln!("  coordinates written:    {}", summary.coordinates_written);
    if summary.creation_times_updated > 0 {
        eprintln!("  creation times updated: {}", summary.creation_times_updated);
    }
    eprintln!("  files moved:            {}", summary.moved);
    if summary.dropped > 0 {
        eprintln!("  album-only dropped:     {}", summary.dropped);
    }

    let tiers = ["json", "exif", "filename", "json-tryhard", "folder-year", "none"];
    let breakdown: Vec<String> = tiers
        .iter()
        .zip(summary.extraction_tiers.iter())
        .filter(|(_, count)| **count > 0)
        .map(|(name, count)| format!("{name}: {count}"))
        .collect();
    if !breakdown.is_empty() {
        eprintln!("  date sources:           {}", breakdown.join(", "));
    }

    for (stage, duration) in &summary.stage_timings {
        log::debug!("stage {stage} took {:.2}s", duration.as_secs_f64());
    }

    if !summary.errors.is_empty() {
        eprintln!("  {} file operation(s) failed:", summary.move_failures);
        for line in summary.error_preview() {
            eprintln!("    {line}");
        }
    }
}
