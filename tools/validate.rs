/// Validate: checks the content tree for broken ids, links and positions.
///
/// Usage: validate
///
/// Exits 1 when any check reports an error.

use std::path::Path;
use std::process;
use wordrush_content::core::pipeline::{ContentPipeline, PipelineConfig, CONFIG_FILE};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match PipelineConfig::load_or_default(Path::new(CONFIG_FILE)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("ERROR: {CONFIG_FILE}: {e}");
            process::exit(1);
        }
    };

    let result = ContentPipeline::builder()
        .config(config)
        .build()
        .and_then(|pipeline| pipeline.validate());

    let (corpus, report) = match result {
        Ok(result) => result,
        Err(e) => {
            eprintln!("ERROR: {e}");
            process::exit(1);
        }
    };

    println!("files scanned: {}", corpus.files_scanned);
    println!("rounds loaded: {}", corpus.round_count());
    println!("records/files skipped: {}", corpus.warnings.len());
    println!("level variants ignored: {}", corpus.level_variants_skipped);
    print!("{report}");

    if report.has_errors() {
        process::exit(1);
    }
}
