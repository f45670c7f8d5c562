//! Standalone validator for correlator configuration files.
//!
//! Checks the channel mapping, the comment list and the search timing
//! without connecting to Telegram.

use std::process::ExitCode;

use clap::Parser;

use referral_bots::config::{bare_peer_id, CorrelatorConfig};

/// Correlator configuration validator.
#[derive(Parser, Debug)]
#[command(name = "validate_correlator")]
#[command(about = "Validates configuration files for the post correlator userbot")]
#[command(version)]
struct Args {
    /// Path to the JSON configuration file to validate.
    #[arg(short, long, default_value = "correlator.json")]
    file: String,

    /// Generate an example configuration file at the specified path.
    #[arg(long)]
    generate_example: Option<String>,

    /// Show the mapping and comments.
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> ExitCode {
    let args = Args::parse();

    if let Some(output_path) = args.generate_example {
        return generate_example(&output_path);
    }

    validate_config(&args.file, args.verbose)
}

fn generate_example(output_path: &str) -> ExitCode {
    let example = CorrelatorConfig::example();

    match example.save_to_file(output_path) {
        Ok(()) => {
            println!("✓ Example configuration written to: {output_path}");
            println!(
                "\nThe file maps {} channel(s) and holds {} comment(s).",
                example.channels.len(),
                example.comments.len()
            );
            println!("Replace the ids with your channels and their discussion groups.");
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("✗ Failed to write example file: {e}");
            ExitCode::FAILURE
        }
    }
}

fn validate_config(path: &str, verbose: bool) -> ExitCode {
    println!("Validating: {path}\n");

    let config = match CorrelatorConfig::load_from_file(path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("✗ Failed to load configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    if verbose {
        println!("Channels:");
        for link in &config.channels {
            println!(
                "  {} -> {}{}",
                bare_peer_id(link.source),
                bare_peer_id(link.discussion),
                link.label
                    .as_deref()
                    .map(|label| format!(" ({label})"))
                    .unwrap_or_default()
            );
        }
        println!("Comments:");
        for (i, comment) in config.comments.iter().enumerate() {
            println!("  [{i}] \"{}\"", truncate(comment, 40));
        }
        println!(
            "Search: window {} ms, poll every {} ms, scan depth {}\n",
            config.search.window_ms, config.search.poll_interval_ms, config.search.scan_depth
        );
    }

    let errors = config.validate_all();

    if errors.is_empty() {
        println!(
            "✓ Configuration is valid: {} channel(s), {} comment(s)",
            config.channels.len(),
            config.comments.len()
        );
        ExitCode::SUCCESS
    } else {
        for e in &errors {
            println!("  ✗ Error: {e}");
        }
        println!("\n✗ Validation failed: {} error(s)", errors.len());
        ExitCode::FAILURE
    }
}

/// Truncates a string for display.
fn truncate(s: &str, max_len: usize) -> String {
    let chars: Vec<char> = s.chars().collect();
    if chars.len() <= max_len {
        s.to_owned()
    } else {
        format!("{}...", chars[..max_len].iter().collect::<String>())
    }
}
