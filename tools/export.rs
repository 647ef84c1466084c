/// Export: writes the relational tables for the SQL bulk loader.
///
/// Usage: export
///
/// Validates first; in strict mode (the default) validation errors stop the
/// run before any table is written.

use std::path::Path;
use std::process;
use wordrush_content::core::pipeline::{
    ContentPipeline, PipelineConfig, PipelineError, CONFIG_FILE,
};

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match PipelineConfig::load_or_default(Path::new(CONFIG_FILE)) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("ERROR: {CONFIG_FILE}: {e}");
            process::exit(1);
        }
    };
    let output_dir = config.output_dir.clone();

    let summary = ContentPipeline::builder()
        .config(config)
        .build()
        .and_then(|pipeline| pipeline.export());

    match summary {
        Ok(summary) => {
            print!("{summary}");
            println!("output: {}", output_dir.display());
        }
        Err(PipelineError::Validation { report }) => {
            print!("{report}");
            eprintln!("ERROR: validation failed, nothing exported");
            process::exit(1);
        }
        Err(e) => {
            eprintln!("ERROR: {e}");
            process::exit(1);
        }
    }
}
