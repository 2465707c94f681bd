//! Spring RTS demo (.sdfz) parser CLI
//!
//! A command-line interface for parsing, validating, and summarizing demo files.
//!
//! ## Commands
//!
//! - `info` - Display header and setup, reading only the start of the file
//! - `parse` - Decode the whole demo with output format options
//! - `validate` - Decode every section (exit codes for scripting)
//! - `batch` - Summarize every demo in a directory

use clap::{Parser, Subcommand, ValueEnum};
use sdfz_parser::packets::PacketId;
use sdfz_parser::{Demo, DemoParser, DemoParserConfig, DemoSection, ParserError, Script};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

/// Spring RTS demo (.sdfz) parser
#[derive(Parser)]
#[command(name = "sdfz-parser")]
#[command(about = "Spring RTS demo (.sdfz) parser", long_about = None)]
#[command(version)]
struct Cli {
    /// Log decoder diagnostics to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display demo information
    Info {
        /// Path to the demo file
        file: PathBuf,
    },
    /// Parse a demo file
    Parse {
        /// Path to the demo file
        file: PathBuf,
        /// Output format: json, pretty
        #[arg(short, long, default_value = "pretty")]
        output: OutputFormat,
        /// Include decoded packets in output
        #[arg(long)]
        packets: bool,
        /// Include the chat log
        #[arg(long)]
        chat: bool,
        /// Include end-of-game statistics
        #[arg(long)]
        stats: bool,
        /// Read only the header and setup script
        #[arg(long)]
        skip_packets: bool,
        /// Only decode these packet types (name or tag)
        #[arg(long, value_parser = parse_packet_id, num_args = 1..)]
        include: Vec<PacketId>,
        /// Never decode these packet types (name or tag)
        #[arg(long, value_parser = parse_packet_id, num_args = 1..)]
        exclude: Vec<PacketId>,
        /// Only keep packets sent by these players
        #[arg(long, num_args = 1..)]
        player: Vec<u32>,
        /// JSON configuration file
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Validate a demo file
    Validate {
        /// Path to the demo file
        file: PathBuf,
    },
    /// Summarize multiple demo files
    Batch {
        /// Directory containing demo files
        directory: PathBuf,
        /// Output directory for JSON files
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Generate summary report
        #[arg(long)]
        summary: bool,
        /// Continue on errors
        #[arg(long)]
        continue_on_error: bool,
    },
}

/// Output format options
#[derive(Clone, Debug, ValueEnum)]
enum OutputFormat {
    Json,
    Pretty,
}

fn parse_packet_id(value: &str) -> Result<PacketId, String> {
    let id = match value.parse::<u8>() {
        Ok(tag) => PacketId::from_u8(tag),
        Err(_) => PacketId::from_name(value),
    };
    id.ok_or_else(|| format!("unknown packet type '{value}'"))
}

// ============================================================================
// Serializable Output Structures
// ============================================================================

#[derive(Serialize)]
struct ParseOutput<'a> {
    header: HeaderInfo,
    setup: &'a Script,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    winning_ally_team_ids: Vec<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    chat: Option<&'a [sdfz_parser::ChatMessage]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    packets: Option<&'a [sdfz_parser::Packet]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    statistics: Option<&'a sdfz_parser::Statistics>,
    #[serde(skip_serializing_if = "Option::is_none")]
    packet_counts: Option<BTreeMap<&'static str, usize>>,
}

#[derive(Serialize)]
struct HeaderInfo {
    file_size: usize,
    version: i32,
    engine: String,
    game_id: String,
    start_time: i64,
    duration_secs: u32,
    duration: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    map: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    game: Option<String>,
    players: usize,
    ais: usize,
    spectators: usize,
}

#[derive(Serialize)]
struct BatchSummary {
    total_files: usize,
    successful: usize,
    failed: usize,
    map_distribution: HashMap<String, usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    average_duration_secs: Option<u32>,
}

// ============================================================================
// Validation Result Structure
// ============================================================================

struct ValidationResult {
    header_valid: bool,
    script_valid: bool,
    packets_valid: bool,
    statistics_valid: bool,
    errors: Vec<String>,
    warnings: Vec<String>,
}

impl ValidationResult {
    fn is_valid(&self) -> bool {
        self.header_valid && self.script_valid && self.packets_valid && self.statistics_valid
    }
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Info { file } => cmd_info(&file, cli.verbose),
        Commands::Parse {
            file,
            output,
            packets,
            chat,
            stats,
            skip_packets,
            include,
            exclude,
            player,
            config,
        } => {
            let config = match build_config(config.as_deref(), cli.verbose, skip_packets, include, exclude, player) {
                Ok(c) => c,
                Err(e) => {
                    eprintln!("Error loading configuration: {e}");
                    return ExitCode::FAILURE;
                }
            };
            cmd_parse(&file, config, &output, packets, chat, stats)
        }
        Commands::Validate { file } => cmd_validate(&file, cli.verbose),
        Commands::Batch {
            directory,
            output,
            summary,
            continue_on_error,
        } => cmd_batch(&directory, output.as_deref(), summary, continue_on_error),
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn build_config(
    path: Option<&Path>,
    verbose: bool,
    skip_packets: bool,
    include: Vec<PacketId>,
    exclude: Vec<PacketId>,
    player: Vec<u32>,
) -> Result<DemoParserConfig, ParserError> {
    let mut config = match path {
        Some(path) => DemoParserConfig::from_json_file(path)?,
        None => DemoParserConfig::default(),
    };

    config.verbose |= verbose;
    config.skip_packets |= skip_packets;
    if !include.is_empty() {
        config.include_packets = include;
    }
    if !exclude.is_empty() {
        config.exclude_packets = exclude;
    }
    if !player.is_empty() {
        config.include_player_ids = player;
    }
    Ok(config)
}

// ============================================================================
// Info Command Implementation
// ============================================================================

fn cmd_info(file: &Path, verbose: bool) -> ExitCode {
    let file_size = match std::fs::metadata(file) {
        Ok(m) => m.len() as usize,
        Err(e) => {
            eprintln!("Error reading file: {e}");
            return ExitCode::FAILURE;
        }
    };

    let parser = DemoParser::new(DemoParserConfig {
        verbose,
        skip_packets: true,
        ..DemoParserConfig::default()
    });
    let demo = match parser.read_setup_file(file) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("Error reading demo: {e}");
            return ExitCode::FAILURE;
        }
    };

    print_info(&demo, file_size);

    ExitCode::SUCCESS
}

#[allow(clippy::cast_precision_loss)]
fn print_info(demo: &Demo, file_size: usize) {
    let header = &demo.header;
    let info = &demo.info;

    println!("=== Demo Information ===\n");

    println!("File:");
    println!(
        "  Size: {} bytes ({:.2} KB)",
        file_size,
        file_size as f64 / 1024.0
    );
    println!("  Demo Version: {}", header.version);
    println!("  Engine: {}", header.version_string);
    println!("  Game ID: {}", header.game_id);
    println!("  Duration: {}", header.duration_string());

    println!();

    println!("Match:");
    println!("  Map: {}", info.map_name().unwrap_or("unknown"));
    println!("  Game: {}", info.game_type().unwrap_or("unknown"));

    println!();

    for ally_team in &info.ally_teams {
        println!("Ally Team {}:", ally_team.id);
        for team_id in &ally_team.team_ids {
            for player in info.players.iter().filter(|p| p.team_id == *team_id) {
                let faction = player.faction.as_deref().unwrap_or("-");
                println!("  - {} (team {}, {})", player.name, team_id, faction);
            }
            for ai in info.ais.iter().filter(|a| a.team_id == *team_id) {
                println!("  - {} [AI] (team {})", ai.name, team_id);
            }
        }
    }

    if !info.spectators.is_empty() {
        println!("\nSpectators:");
        for spectator in &info.spectators {
            println!("  - {}", spectator.name);
        }
    }

    println!();

    println!("Technical:");
    println!("  Header Size: {} bytes", header.header_size);
    println!("  Script Size: {} bytes", header.script_size);
    println!("  Packet Stream: {} bytes", header.demo_stream_size);
    println!("  Decompressed Size: {} bytes", header.expected_len());
}

// ============================================================================
// Parse Command Implementation
// ============================================================================

fn cmd_parse(
    file: &Path,
    config: DemoParserConfig,
    output: &OutputFormat,
    packets: bool,
    chat: bool,
    stats: bool,
) -> ExitCode {
    let data = match std::fs::read(file) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("Error reading file: {e}");
            return ExitCode::FAILURE;
        }
    };

    let collect = packets;
    let parser = DemoParser::new(DemoParserConfig {
        collect_packets: collect,
        ..config
    });

    let mut counts: BTreeMap<&'static str, usize> = BTreeMap::new();
    let demo = match parser.parse_demo_with(&data, |p| *counts.entry(p.name).or_insert(0) += 1) {
        Ok(d) => d,
        Err(e) => {
            eprintln!("Error: {e}");
            return ExitCode::FAILURE;
        }
    };

    let parse_output = ParseOutput {
        header: build_header_info(&demo, data.len()),
        setup: &demo.info,
        winning_ally_team_ids: demo.winning_ally_team_ids.clone(),
        chat: if chat { demo.chatlog.as_deref() } else { None },
        packets: if packets { Some(demo.packets.as_slice()) } else { None },
        statistics: if stats { demo.statistics.as_ref() } else { None },
        packet_counts: if stats && !parser.config().skip_packets {
            Some(counts)
        } else {
            None
        },
    };

    match output {
        OutputFormat::Json => print_json(&parse_output),
        OutputFormat::Pretty => print_pretty(&parse_output, &demo),
    }

    ExitCode::SUCCESS
}

fn build_header_info(demo: &Demo, file_size: usize) -> HeaderInfo {
    HeaderInfo {
        file_size,
        version: demo.header.version,
        engine: demo.header.version_string.clone(),
        game_id: demo.header.game_id.clone(),
        start_time: demo.header.start_time,
        duration_secs: demo.header.game_time,
        duration: demo.header.duration_string(),
        map: demo.info.map_name().map(str::to_string),
        game: demo.info.game_type().map(str::to_string),
        players: demo.info.players.len(),
        ais: demo.info.ais.len(),
        spectators: demo.info.spectators.len(),
    }
}

fn print_json<T: Serialize>(output: &T) {
    match serde_json::to_string_pretty(output) {
        Ok(json) => println!("{json}"),
        Err(e) => eprintln!("Error serializing to JSON: {e}"),
    }
}

fn print_pretty(output: &ParseOutput<'_>, demo: &Demo) {
    let header = &output.header;
    println!("=== Header ===");
    println!("Engine: {}", header.engine);
    println!("Game ID: {}", header.game_id);
    if let Some(map) = &header.map {
        println!("Map: {map}");
    }
    if let Some(game) = &header.game {
        println!("Game: {game}");
    }
    println!("Duration: {}", header.duration);
    println!();

    println!("=== Players ({}) ===", demo.info.players.len());
    for player in &demo.info.players {
        let [r, g, b] = player.color;
        print!("  {} (team {}, #{r:02x}{g:02x}{b:02x})", player.name, player.team_id);
        if let Some(pos) = player.start_pos {
            print!(" start {:.0},{:.0}", pos.x, pos.z);
        }
        println!();
    }
    for ai in &demo.info.ais {
        println!("  {} [AI] (team {})", ai.name, ai.team_id);
    }
    if !output.winning_ally_team_ids.is_empty() {
        println!("Winning ally teams: {:?}", output.winning_ally_team_ids);
    }
    println!();

    if let Some(chat) = output.chat {
        println!("=== Chat Messages ({}) ===", chat.len());
        for msg in chat {
            println!("  {msg}");
        }
        println!();
    }

    if let Some(counts) = &output.packet_counts {
        println!("=== Packets by Type ===");
        let mut by_count: Vec<_> = counts.iter().collect();
        by_count.sort_by(|a, b| b.1.cmp(a.1));
        for (name, count) in by_count {
            println!("  {name}: {count}");
        }
        println!();
    }

    if let Some(stats) = output.statistics {
        println!("=== Player Statistics ===");
        for (index, player) in stats.players.iter().enumerate() {
            println!(
                "  Player {index}: {} commands, {} clicks, {} key presses",
                player.num_commands, player.mouse_clicks, player.key_presses
            );
        }
        println!("\n=== Final Team Samples ===");
        for (index, sample) in stats.final_samples().enumerate() {
            if let Some(sample) = sample {
                println!(
                    "  Team {index}: {:.0} metal, {:.0} energy produced, {} units killed",
                    sample.metal_produced, sample.energy_produced, sample.units_killed
                );
            }
        }
        println!();
    }

    if let Some(packets) = output.packets {
        println!("=== Packets ({}) ===", packets.len());
        // Only show first 50 packets in pretty mode to avoid spam
        let display_count = std::cmp::min(packets.len(), 50);
        for packet in &packets[..display_count] {
            println!("  {packet}");
        }
        if packets.len() > 50 {
            println!("  ... and {} more packets", packets.len() - 50);
        }
    }
}

// ============================================================================
// Validate Command Implementation
// ============================================================================

fn cmd_validate(file: &Path, verbose: bool) -> ExitCode {
    let result = validate_demo(file, verbose);

    if verbose {
        print_validation_details(&result, file);
    } else {
        print_validation_summary(&result, file);
    }

    if result.is_valid() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn validate_demo(file: &Path, verbose: bool) -> ValidationResult {
    let mut result = ValidationResult {
        header_valid: false,
        script_valid: false,
        packets_valid: false,
        statistics_valid: false,
        errors: Vec::new(),
        warnings: Vec::new(),
    };

    let data = match std::fs::read(file) {
        Ok(d) => d,
        Err(e) => {
            result.errors.push(format!("Failed to read file: {e}"));
            return result;
        }
    };

    let parser = DemoParser::new(DemoParserConfig {
        verbose,
        collect_packets: false,
        ..DemoParserConfig::default()
    });

    match parser.parse_demo(&data) {
        Ok(demo) => {
            result.header_valid = true;
            result.script_valid = true;
            result.packets_valid = true;
            result.statistics_valid = true;

            if demo.info.players.is_empty() && demo.info.ais.is_empty() {
                result.warnings.push("No players found in setup".to_string());
            }
            if demo.winning_ally_team_ids.is_empty() {
                result.warnings.push("No winning ally team recorded".to_string());
            }
        }
        Err(e) => {
            // Phases before the failing one passed.
            let failed = e.section();
            result.header_valid = matches!(
                failed,
                Some(DemoSection::Script | DemoSection::Packets | DemoSection::Statistics)
            );
            result.script_valid =
                matches!(failed, Some(DemoSection::Packets | DemoSection::Statistics));
            result.packets_valid = matches!(failed, Some(DemoSection::Statistics));
            result.errors.push(e.to_string());
        }
    }

    result
}

fn print_validation_summary(result: &ValidationResult, file: &Path) {
    let status = if result.is_valid() { "VALID" } else { "INVALID" };
    println!("{}: {status}", file.display());
}

fn print_validation_details(result: &ValidationResult, file: &Path) {
    println!("Validating: {}\n", file.display());

    println!("Checks:");
    println!("  Header:            {}", status_icon(result.header_valid));
    println!("  Setup script:      {}", status_icon(result.script_valid));
    println!("  Packet stream:     {}", status_icon(result.packets_valid));
    println!("  Statistics:        {}", status_icon(result.statistics_valid));

    if !result.errors.is_empty() {
        println!("\nErrors:");
        for error in &result.errors {
            println!("  - {error}");
        }
    }

    if !result.warnings.is_empty() {
        println!("\nWarnings:");
        for warning in &result.warnings {
            println!("  - {warning}");
        }
    }

    println!(
        "\nResult: {}",
        if result.is_valid() { "VALID" } else { "INVALID" }
    );
}

fn status_icon(valid: bool) -> &'static str {
    if valid {
        "[OK]"
    } else {
        "[FAIL]"
    }
}

// ============================================================================
// Batch Command Implementation
// ============================================================================

fn cmd_batch(
    directory: &Path,
    output_dir: Option<&Path>,
    summary: bool,
    continue_on_error: bool,
) -> ExitCode {
    let demos = find_demos(directory);

    if demos.is_empty() {
        eprintln!("No .sdfz files found in {}", directory.display());
        return ExitCode::FAILURE;
    }

    eprintln!("Found {} demo files", demos.len());

    if let Some(dir) = output_dir {
        if !dir.exists() {
            if let Err(e) = std::fs::create_dir_all(dir) {
                eprintln!("Failed to create output directory: {e}");
                return ExitCode::FAILURE;
            }
        }
    }

    let parser = DemoParser::new(DemoParserConfig {
        skip_packets: true,
        ..DemoParserConfig::default()
    });

    let mut results: Vec<HeaderInfo> = Vec::new();
    let mut error_count = 0;

    for demo_path in &demos {
        eprint!(
            "Processing {}... ",
            demo_path.file_name().unwrap_or_default().to_string_lossy()
        );

        match process_demo(&parser, demo_path, output_dir) {
            Ok(info) => {
                eprintln!("OK");
                results.push(info);
            }
            Err(e) => {
                eprintln!("ERROR: {e}");
                error_count += 1;
                if !continue_on_error {
                    return ExitCode::FAILURE;
                }
            }
        }
    }

    eprintln!(
        "\nProcessed: {} success, {} errors",
        results.len(),
        error_count
    );

    if summary {
        generate_summary(&results, error_count, output_dir);
    }

    if error_count > 0 && !continue_on_error {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn find_demos(directory: &Path) -> Vec<PathBuf> {
    let mut demos = Vec::new();

    if let Ok(entries) = std::fs::read_dir(directory) {
        for entry in entries.flatten() {
            let path = entry.path();
            if path.extension().is_some_and(|e| e == "sdfz") {
                demos.push(path);
            }
        }
    }

    demos.sort();
    demos
}

fn process_demo(
    parser: &DemoParser,
    path: &Path,
    output_dir: Option<&Path>,
) -> Result<HeaderInfo, String> {
    let file_size = std::fs::metadata(path).map_err(|e| e.to_string())?.len() as usize;
    let demo = parser.read_setup_file(path).map_err(|e| e.to_string())?;
    let info = build_header_info(&demo, file_size);

    if let Some(dir) = output_dir {
        let output_file = dir
            .join(path.file_stem().unwrap_or_default())
            .with_extension("json");
        let content = serde_json::to_string_pretty(&ParseOutput {
            header: build_header_info(&demo, file_size),
            setup: &demo.info,
            winning_ally_team_ids: Vec::new(),
            chat: None,
            packets: None,
            statistics: None,
            packet_counts: None,
        })
        .map_err(|e| e.to_string())?;
        std::fs::write(&output_file, content).map_err(|e| e.to_string())?;
    }

    Ok(info)
}

fn generate_summary(results: &[HeaderInfo], failed: usize, output_dir: Option<&Path>) {
    let mut map_distribution: HashMap<String, usize> = HashMap::new();
    for info in results {
        let map = info.map.clone().unwrap_or_else(|| "unknown".to_string());
        *map_distribution.entry(map).or_insert(0) += 1;
    }

    let average_duration_secs = if results.is_empty() {
        None
    } else {
        let total: u64 = results.iter().map(|r| u64::from(r.duration_secs)).sum();
        Some((total / results.len() as u64) as u32)
    };

    let summary = BatchSummary {
        total_files: results.len() + failed,
        successful: results.len(),
        failed,
        map_distribution,
        average_duration_secs,
    };

    println!("\n=== Batch Summary ===");
    println!("Files processed: {}", summary.total_files);
    println!("Successful: {}", summary.successful);
    println!("Failed: {}", summary.failed);

    println!("\nMap distribution:");
    let mut maps: Vec<_> = summary.map_distribution.iter().collect();
    maps.sort_by(|a, b| b.1.cmp(a.1).then(a.0.cmp(b.0)));
    for (map, count) in maps {
        println!("  {map}: {count}");
    }

    if let Some(avg) = summary.average_duration_secs {
        println!("\nAverage duration: {:02}:{:02}", avg / 60, avg % 60);
    }

    if let Some(dir) = output_dir {
        let summary_file = dir.join("summary.json");
        if let Ok(json) = serde_json::to_string_pretty(&summary) {
            if std::fs::write(&summary_file, json).is_ok() {
                println!("\nSummary written to: {}", summary_file.display());
            }
        }
    }
}
