//! The `click` binary: load a router configuration, optionally write
//! it back out, and run it.
//!
//! ```text
//! click [-f FILE | -e EXPR] [-o FILE] [-C PATH] [-u|-l|-b] [-F] [-k]
//! ```
//!
//! Exit status is 0 on success, 1 if any configuration error was
//! reported. Diagnostics go to stderr.

use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser};
use tracing_subscriber::EnvFilter;

use click::driver::{LoadOptions, load};
use click::errors::{ErrorSink, FileSink};
use click::registry::Driver;

#[derive(Parser)]
#[command(
    name = "click",
    version,
    about = "Modular packet router",
    disable_version_flag = true
)]
struct Cli {
    /// Read the router configuration from FILE ('-' for stdin).
    #[arg(short = 'f', long = "file", value_name = "FILE")]
    file: Option<PathBuf>,

    /// Use EXPR as the router configuration.
    #[arg(short = 'e', long = "expression", value_name = "EXPR", conflicts_with = "file")]
    expression: Option<String>,

    /// Write the (possibly flattened) configuration to FILE instead
    /// of running it.
    #[arg(short = 'o', long = "output", value_name = "FILE")]
    output: Option<PathBuf>,

    /// Colon-separated search path for libraries and element maps.
    #[arg(short = 'C', long = "clickpath", value_name = "PATH")]
    clickpath: Option<String>,

    /// Select the user-level driver (the default).
    #[arg(short = 'u', long = "userlevel")]
    userlevel: bool,

    /// Check against the Linux kernel module driver.
    #[arg(short = 'l', long = "linuxmodule", conflicts_with = "userlevel")]
    linuxmodule: bool,

    /// Check against the BSD kernel module driver.
    #[arg(short = 'b', long = "bsdmodule", conflicts_with_all = ["userlevel", "linuxmodule"])]
    bsdmodule: bool,

    /// Inline all compound element classes in the output.
    #[arg(short = 'F', long = "flatten")]
    flatten: bool,

    /// Check the configuration (including uninstantiated compound
    /// classes) and exit without running it.
    #[arg(short = 'k', long = "check")]
    check: bool,

    /// Print version information and exit.
    #[arg(short = 'v', long = "version", action = ArgAction::Version)]
    version: Option<bool>,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    if let Some(path) = &cli.clickpath {
        // single-threaded at this point; the variable is read lazily
        // by registry::clickpath
        unsafe { std::env::set_var("CLICKPATH", path) };
    }

    let mut errh = FileSink::stderr();

    // configuration source
    let (source, filename, file_dir) = match (&cli.expression, &cli.file) {
        (Some(expr), _) => (expr.clone(), "<expr>".to_string(), None),
        (None, Some(path)) if path.as_os_str() != "-" => {
            match std::fs::read_to_string(path) {
                Ok(text) => (
                    text,
                    path.display().to_string(),
                    path.parent().map(PathBuf::from),
                ),
                Err(e) => {
                    eprintln!("click: {}: {e}", path.display());
                    return ExitCode::FAILURE;
                }
            }
        }
        _ => {
            let mut text = String::new();
            if let Err(e) = std::io::stdin().read_to_string(&mut text) {
                eprintln!("click: <stdin>: {e}");
                return ExitCode::FAILURE;
            }
            (text, "<stdin>".to_string(), None)
        }
    };

    let driver = if cli.linuxmodule {
        Driver::LinuxModule
    } else if cli.bsdmodule {
        Driver::BsdModule
    } else {
        Driver::Userlevel
    };

    let options = LoadOptions {
        filename,
        file_dir,
        driver,
        elementmap_files: Vec::new(),
    };

    if cli.check {
        return match click::driver::check(&source, &options, &mut errh) {
            Ok(_) => ExitCode::SUCCESS,
            Err(()) => ExitCode::FAILURE,
        };
    }

    let Ok(mut loaded) = load(&source, &options, &mut errh) else {
        return ExitCode::FAILURE;
    };
    if errh.nerrors() > 0 {
        return ExitCode::FAILURE;
    }

    if let Some(out) = &cli.output {
        let text = loaded.unparse(cli.flatten);
        let result = if out.as_os_str() == "-" {
            use std::io::Write;
            std::io::stdout().write_all(text.as_bytes())
        } else {
            std::fs::write(out, text)
        };
        if let Err(e) = result {
            eprintln!("click: {}: {e}", out.display());
            return ExitCode::FAILURE;
        }
        loaded.shutdown();
        return ExitCode::SUCCESS;
    }

    if driver != Driver::Userlevel {
        // kernel-driver configurations can only be checked or written
        // out from this binary
        loaded.shutdown();
        return ExitCode::SUCCESS;
    }

    loaded.run();
    loaded.shutdown();
    ExitCode::SUCCESS
}
