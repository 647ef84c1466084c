/// Repair: fills missing titles and damage, relinks broken chains, and
/// re-randomizes the themes listed in `pipeline.ron`.
///
/// Usage: repair

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

    let summary = ContentPipeline::builder()
        .config(config)
        .build()
        .and_then(|pipeline| pipeline.repair());

    match summary {
        Ok(summary) => println!("{summary}"),
        Err(e) => {
            eprintln!("ERROR: {e}");
            process::exit(1);
        }
    }
}
