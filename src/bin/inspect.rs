#![cfg(not(tarpaulin_include))]

use bidsheet::codec::Envelope;
use bidsheet::config::Config;
use bidsheet::extract::extract_fields;
use bidsheet::template::load_metadata;
use bidsheet::worksheet::WorksheetKind;
use std::env;
use std::fs;
use std::io::{self, Read};
use std::path::PathBuf;
use std::time::Instant;

/// Decodes a snapshot blob, reruns the worksheet formulas over it and prints
/// the totals and the fields an explicit save would push.
///
/// Usage: `bidsheet-inspect <blob-file|-> [kind]`. The kind defaults to the
/// envelope's `worksheetType`; `-` reads the blob from stdin.
fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();

    let start = Instant::now();
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 || args.len() > 3 {
        eprintln!("Usage: {} <blob-file|-> [kind]", args[0]);
        return Ok(());
    }

    let blob = if args[1] == "-" {
        let mut text = String::new();
        io::stdin().read_to_string(&mut text)?;
        text
    } else {
        fs::read_to_string(PathBuf::from(&args[1]))?
    };

    let envelope = Envelope::decode(&blob)?;
    let kind: WorksheetKind = match args.get(2) {
        Some(kind) => kind.parse()?,
        None => match envelope.kind() {
            Some(kind) => kind,
            None => {
                eprintln!(
                    "Error: unknown worksheetType '{}', pass the kind explicitly",
                    envelope.worksheet_type
                );
                return Ok(());
            }
        },
    };

    let config = Config::load(None)?;
    let mut worksheet = load_metadata(config.metadata_dir.as_deref(), kind)?.build();
    worksheet.restore(&envelope.body_value())?;

    println!("Worksheet:   {}", kind);
    println!("Record:      {}", envelope.opportunity_id);
    println!("Saved:       {}", envelope.saved_date);
    println!("Version:     {}", envelope.version);
    println!("Total:       {:.2}", worksheet.total());
    println!();
    println!("Summary:");
    println!("{}", serde_json::to_string_pretty(&worksheet.summary())?);

    let fields = extract_fields(kind, &worksheet.collect()?);
    println!();
    println!("Fields ({}):", fields.len());
    for (name, value) in &fields {
        println!("  {:<45} {}", name, value);
    }

    println!();
    println!("Total elapsed time: {:.1} seconds", start.elapsed().as_secs_f64());
    Ok(())
}
