use anyhow::Result;
use log::info;
use std::env;
use std::fs;
use std::path::Path;

use ledger_import::accounting::importer::{import_move_lines, ImportOutcome};
use ledger_import::data::{self, CsvJournal};

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();

    if args.len() < 3 || args.len() > 6 {
        eprintln!("Usage: cargo run -- <input_file> <catalog_dir> [csv_separator] [decimal_separator] [codepage]");
        std::process::exit(1);
    }

    let options = data::parse_options(&args[3..])?;
    let catalog_dir = Path::new(&args[2]);
    let catalog = data::load_catalog(catalog_dir)?;
    let target = data::load_target_move(catalog_dir)?;
    let input = fs::read(&args[1])?;

    let mut journal = CsvJournal::new(std::io::stdout());
    match import_move_lines(&input, &target, &options, &catalog, &mut journal)? {
        ImportOutcome::Committed { lines } => info!("imported {} lines into move {}", lines, target.id),
        ImportOutcome::Rejected(report) => {
            eprint!("{}", report);
            std::process::exit(2);
        },
    }

    Ok(())
}
