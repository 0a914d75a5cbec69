//! `tadsrc` — bundle named blob resources into a compiled image.
//!
//! Usage: `tadsrc [options] image-file [operations]`. Operations are
//! processed in order: `-add` (the default mode), `-recurse` /
//! `-norecurse` toggles, bare file or directory paths, and `path=alias`
//! renames. The classic single-dash spellings (`-create`, `-add`, ...)
//! are accepted alongside the standard double-dash forms.

use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use tadsc_res::{add_resources, parse_operations};

#[derive(Parser)]
#[command(
    name = "tadsrc",
    version,
    about = "Bundle resources into a compiled image file"
)]
struct Args {
    /// Create a new image file instead of appending to an existing one
    #[arg(long)]
    create: bool,

    /// The image file to bundle into
    image_file: PathBuf,

    /// Operations: -add, -recurse, -norecurse, paths, path=alias
    #[arg(allow_hyphen_values = true, trailing_var_arg = true)]
    operations: Vec<String>,
}

fn main() -> ExitCode {
    // accept the classic single-dash option spelling
    let argv: Vec<String> = std::env::args()
        .map(|a| if a == "-create" { "--create".into() } else { a })
        .collect();
    let args = Args::parse_from(argv);

    let list = match parse_operations(&args.operations) {
        Ok(list) => list,
        Err(e) => {
            eprintln!("tadsrc: {e}");
            return ExitCode::FAILURE;
        }
    };

    for entry in list.entries() {
        println!("+ {} ({})", entry.path.display(), entry.url);
    }

    match add_resources(&args.image_file, &list, args.create) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("tadsrc: {e}");
            ExitCode::FAILURE
        }
    }
}
