//! `validate` command implementation.

use anyhow::Result;

use crate::cli::ValidateArgs;

/// Validate a blueprint file without running the pipeline
pub fn run_validate(args: &ValidateArgs) -> Result<()> {
    let result = config_loader::ConfigLoader::load_from_path(&args.config);

    if args.json {
        let report = match &result {
            Ok(_) => serde_json::json!({ "valid": true, "path": args.config.display().to_string() }),
            Err(e) => serde_json::json!({
                "valid": false,
                "path": args.config.display().to_string(),
                "error": e.to_string(),
            }),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        match &result {
            Ok(bp) => println!(
                "OK: {} ({} sensors, {} frames to take)",
                args.config.display(),
                bp.sensors.len(),
                bp.capture.frames_to_take
            ),
            Err(e) => println!("INVALID: {}", e),
        }
    }

    result.map(|_| ()).map_err(Into::into)
}
