//! Command-line interface for xmlcursor

#[cfg(feature = "cli")]
use clap::{Parser, Subcommand};

#[cfg(feature = "cli")]
use std::path::PathBuf;

#[cfg(feature = "cli")]
use xmlcursor::locations::Location;
#[cfg(feature = "cli")]
use xmlcursor::validators::{SchemaTypeSystem, ValidationMode, ValidatorOptions, Validator};
#[cfg(feature = "cli")]
use xmlcursor::Loader;

#[cfg(feature = "cli")]
#[derive(Parser, Debug)]
#[command(name = "xmlcursor")]
#[command(author, version, about = "XML Schema content-model validation tool", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[cfg(feature = "cli")]
#[derive(Subcommand, Debug)]
enum Commands {
    /// Validate an XML document against one or more XSD schemas
    Validate {
        /// XSD schema file, repeatable; included, imported and redefined files are followed
        #[arg(short, long = "schema", value_name = "SCHEMA", required = true)]
        schemas: Vec<PathBuf>,

        /// Path to the XML file to validate
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Validation mode for undeclared root elements: strict, lax, skip
        #[arg(short, long, default_value = "strict")]
        mode: String,

        /// Output the report as JSON
        #[arg(short, long)]
        json: bool,
    },
}

#[cfg(feature = "cli")]
fn main() {
    env_logger::init();
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Validate {
            schemas,
            file,
            mode,
            json,
        } => cmd_validate(schemas, file, mode, json),
    };

    match result {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(2);
        }
    }
}

#[cfg(feature = "cli")]
fn cmd_validate(
    schemas: Vec<PathBuf>,
    file: PathBuf,
    mode: String,
    json_output: bool,
) -> Result<bool, Box<dyn std::error::Error>> {
    let mode = ValidationMode::from_str(&mode)?;
    let system = SchemaTypeSystem::from_files(&schemas)?;
    for error in system.errors() {
        log::warn!("schema error: {}", error);
    }

    let document = Loader::new().load(&Location::Path(file))?;
    let cursor = document.new_cursor()?;
    let report = system.validate_with_options(&cursor, ValidatorOptions::new().with_mode(mode))?;

    if json_output {
        println!("{}", report.to_json()?);
    } else if report.is_valid() {
        println!("✓ Document is valid");
        for issue in &report.issues {
            println!("  - {}", issue);
        }
    } else {
        println!("✗ Document is invalid");
        println!();
        println!("Issues:");
        for issue in &report.issues {
            println!("  - {}", issue);
        }
    }
    Ok(report.is_valid())
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI feature not enabled. Rebuild with --features cli");
    std::process::exit(1);
}
