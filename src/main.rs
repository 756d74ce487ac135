use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;
use tracing_subscriber::EnvFilter;

use sketch_analysis::config::PipelineConfig;
use sketch_analysis::enrich::{apply_video_stats, VideoStats};
use sketch_analysis::models::FullDataSnapshot;
use sketch_analysis::progress::{format_duration, set_log_only};
use sketch_analysis::report::{render_text, to_json};
use sketch_analysis::safety::validate_output_path;
use sketch_analysis::snapshot::{load_full_data, load_scenes, load_videos, read_json, save_full_data};
use sketch_analysis::{AnalysisSession, Attribute, Dimension};

#[derive(Parser, Debug)]
#[command(name = "sketch-analysis")]
#[command(about = "Link archive scenes to channel videos and test engagement differences between groups")]
struct Cli {
    /// Hide progress bars and log periodic progress lines instead
    #[arg(long, global = true)]
    log_only: bool,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fuzzy-link channel videos to archive scenes and write full_data.json
    Link(LinkArgs),

    /// Group sketches, screen for normality and run ANOVA + post-hoc tests
    Analyze(AnalyzeArgs),
}

#[derive(Args, Debug)]
struct LinkArgs {
    /// Archive snapshot (scenes.json)
    #[arg(long)]
    scenes: PathBuf,

    /// Channel snapshot (channel_videos.json)
    #[arg(long)]
    videos: PathBuf,

    /// Output snapshot; name must contain "full_data"
    #[arg(long)]
    output: PathBuf,

    /// Per-video statistics (JSON array) to merge into the linked sketches
    #[arg(long)]
    stats: Option<PathBuf>,

    /// Match threshold in [0, 1] (overrides config)
    #[arg(long)]
    threshold: Option<f64>,

    /// Worker threads, 0 = all cores (overrides config)
    #[arg(long)]
    workers: Option<usize>,

    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct AnalyzeArgs {
    /// Joined snapshot (full_data.json)
    #[arg(long)]
    data: PathBuf,

    /// Attribute to test; repeatable (default: all numeric attributes)
    #[arg(long = "attribute")]
    attributes: Vec<Attribute>,

    /// Grouping dimension; repeatable (default: all)
    #[arg(long = "dimension")]
    dimensions: Vec<Dimension>,

    /// Also write the reports as JSON; name must contain "report"
    #[arg(long)]
    json: Option<PathBuf>,

    /// ANOVA significance level (overrides config)
    #[arg(long)]
    alpha: Option<f64>,

    #[arg(long)]
    config: Option<PathBuf>,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();
    set_log_only(cli.log_only);

    match cli.cmd {
        Command::Link(args) => cmd_link(args),
        Command::Analyze(args) => cmd_analyze(args),
    }
}

fn cmd_link(args: LinkArgs) -> Result<()> {
    let mut config = PipelineConfig::load(args.config.as_deref())?;
    if let Some(threshold) = args.threshold {
        config.match_threshold = threshold;
    }
    if let Some(workers) = args.workers {
        config.workers = workers;
    }

    validate_output_path(&args.output, "full_data", &[&args.scenes, &args.videos])?;

    let start = Instant::now();
    let scenes = load_scenes(&args.scenes)?;
    let videos = load_videos(&args.videos)?;

    let filtered = config.title_filter.apply(&videos.channel_videos);
    info!(
        before = videos.channel_videos.len(),
        after = filtered.len(),
        "applied channel title filter"
    );

    let mut result = config
        .linker()
        .link(&scenes.scene_data, &filtered)
        .context("Linking failed")?;
    result.stats.malformed_records = scenes.malformed + videos.malformed;
    result.stats.log();
    let mut sketches = result.sketches;

    if let Some(stats_path) = &args.stats {
        let stats: Vec<VideoStats> = read_json(stats_path)?;
        apply_video_stats(&mut sketches, &stats);
    }

    let snapshot = FullDataSnapshot::now(sketches);
    save_full_data(&args.output, &snapshot)?;

    println!("\n{:=<60}", "");
    println!("Linking complete!");
    println!("  Videos considered: {}", filtered.len());
    println!("  Sketches: {}", snapshot.full_data.len());
    println!("  Ambiguous titles: {}", result.stats.ambiguous);
    println!("  Malformed records skipped: {}", result.stats.malformed_records);
    if result.stats.lost > 0 {
        println!("  Lost to worker failures: {}", result.stats.lost);
    }
    println!("  Match rate: {:.1}%", result.stats.match_rate());
    println!("  Elapsed: {}", format_duration(start.elapsed()));
    println!("{:=<60}", "");
    Ok(())
}

fn cmd_analyze(args: AnalyzeArgs) -> Result<()> {
    let mut config = PipelineConfig::load(args.config.as_deref())?;
    if let Some(alpha) = args.alpha {
        config.anova_alpha = alpha;
    }
    if let Some(json) = &args.json {
        validate_output_path(json, "report", &[&args.data])?;
    }

    let attributes = if args.attributes.is_empty() {
        Attribute::ALL.to_vec()
    } else {
        args.attributes
    };
    let dimensions = if args.dimensions.is_empty() {
        Dimension::ALL.to_vec()
    } else {
        args.dimensions
    };

    let start = Instant::now();
    let snapshot = load_full_data(&args.data)?;
    let mut session = AnalysisSession::new(snapshot.full_data)?
        .with_tester(config.tester())
        .with_normality_alpha(config.normality_alpha);

    let reports = session.analyze_all(&attributes, &dimensions)?;
    print!("{}", render_text(&reports));

    if let Some(json) = &args.json {
        std::fs::write(json, to_json(&reports)?)
            .with_context(|| format!("Failed to write {}", json.display()))?;
        info!(path = %json.display(), reports = reports.len(), "wrote JSON report");
    }

    let significant = reports.iter().filter(|r| r.is_significant()).count();
    println!("\n{:=<60}", "");
    println!("Analysis complete!");
    println!("  Tests run: {}", reports.len());
    println!("  Significant at alpha {}: {}", config.anova_alpha, significant);
    println!("  Elapsed: {}", format_duration(start.elapsed()));
    println!("{:=<60}", "");
    Ok(())
}
