use std::path::PathBuf;

use anyhow::{bail, Context};
use annotation_authoring::annotate::replay::{load_script, run_script};
use annotation_authoring::logging;
use annotation_authoring::settings::Settings;

const USAGE: &str = "usage: annotation_authoring <script.json> [--settings <settings.json>]";

fn main() -> anyhow::Result<()> {
    let mut script_path: Option<PathBuf> = None;
    let mut settings_path: Option<String> = None;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--settings" => {
                settings_path = Some(args.next().context(USAGE)?);
            }
            "-h" | "--help" => {
                println!("{USAGE}");
                return Ok(());
            }
            _ if script_path.is_none() => script_path = Some(PathBuf::from(arg)),
            _ => bail!("unexpected argument '{arg}'\n{USAGE}"),
        }
    }
    let script_path = script_path.context(USAGE)?;

    let settings = match settings_path {
        Some(path) => Settings::load(&path)?,
        None => match Settings::default_path() {
            Some(path) => Settings::load(&path.to_string_lossy())?,
            None => Settings::default(),
        },
    };
    let annotate = settings.load_annotate_settings()?;
    logging::init(
        settings.debug_logging || annotate.debug_logging,
        settings.log_file.clone(),
    );

    let script = load_script(&script_path)?;
    let outcome = run_script(&script, annotate)?;
    for refusal in &outcome.refused {
        tracing::warn!("{refusal}");
    }
    println!(
        "{}",
        serde_json::to_string_pretty(&outcome).context("serialize replay outcome")?
    );
    Ok(())
}
