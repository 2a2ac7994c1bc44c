// Generates the opflow man page into target/man/

use clap::CommandFactory;
use opflow::cli::Cli;
use std::fs;
use std::path::PathBuf;

fn main() -> std::io::Result<()> {
    let out_dir = PathBuf::from("target").join("man");
    fs::create_dir_all(&out_dir)?;

    let cmd = Cli::command();
    let man = clap_mangen::Man::new(cmd);
    let mut buffer: Vec<u8> = Vec::new();
    man.render(&mut buffer)?;

    let out_path = out_dir.join("opflow.1");
    fs::write(&out_path, buffer)?;
    println!("Wrote {}", out_path.display());
    Ok(())
}
