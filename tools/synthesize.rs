/// Synthesize: generates chapter files from every content family.
///
/// Usage: synthesize
///
/// Reads `families/*.ron` (or the directories named in `pipeline.ron`) and
/// writes `content/{universe}/{theme}/{chapter}.json`.

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
        .and_then(|pipeline| pipeline.synthesize());

    match summary {
        Ok(summary) => print!("{summary}"),
        Err(e) => {
            eprintln!("ERROR: {e}");
            process::exit(1);
        }
    }
}
