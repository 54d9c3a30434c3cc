//! Thin CLI harness: opens an Android shared library and looks up symbols
//! named on the command line, printing their resolved address. Ambient
//! tooling around the loader, not part of its public contract.

use std::process::ExitCode;

fn main() -> ExitCode {
    env_logger::init();

    let mut args = std::env::args().skip(1);
    let Some(path) = args.next() else {
        eprintln!("usage: dump-symbols <library.so> [symbol ...]");
        return ExitCode::FAILURE;
    };

    let library = match android_so_loader::open_library(&path) {
        Ok(lib) => lib,
        Err(err) => {
            eprintln!("failed to load {path}: {err}");
            return ExitCode::FAILURE;
        }
    };

    println!(
        "loaded {} at base {:#x} ({} bytes)",
        library.path(),
        library.image_base(),
        library.image_len()
    );
    if !library.needed().is_empty() {
        println!("needed: {}", library.needed().join(", "));
    }

    let symbols: Vec<String> = args.collect();
    if symbols.is_empty() {
        return ExitCode::SUCCESS;
    }

    let mut ok = true;
    for name in symbols {
        match library.load_symbol(&name) {
            Ok(addr) => println!("{name} = {addr:#x}"),
            Err(err) => {
                eprintln!("{err}");
                ok = false;
            }
        }
    }

    if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
