// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

/// Positional argument: formula path
fn formula_arg() -> Arg {
    Arg::new("formula")
        .required(true)
        .value_name("FORMULA")
        .help("Path to the formula file")
}

/// Installation prefix
fn prefix_arg() -> Arg {
    Arg::new("prefix")
        .short('p')
        .long("prefix")
        .value_name("DIR")
        .help("Installation prefix; the binary lands in <prefix>/bin")
}

fn flag(name: &'static str, help: &'static str) -> Arg {
    Arg::new(name)
        .long(name)
        .action(ArgAction::SetTrue)
        .help(help)
}

/// Options that change how templates resolve
fn resolve_args() -> [Arg; 3] {
    [
        flag("head", "Build from the VCS head instead of the release archive"),
        Arg::new("commit")
            .long("commit")
            .help("Commit identifier bound to %(commit)s"),
        Arg::new("tap-user")
            .long("tap-user")
            .help("Tap user bound to %(tap_user)s"),
    ]
}

fn build_cli() -> Command {
    Command::new("kettle")
        .version(env!("CARGO_PKG_VERSION"))
        .author("Kettle Contributors")
        .about("Build, install and smoke-test a binary from a formula")
        .subcommand_required(false)
        .subcommand(
            Command::new("cook")
                .about("Build, install and verify a formula")
                .arg(formula_arg())
                .arg(prefix_arg().required(true))
                .args(resolve_args())
                .arg(Arg::new("source-cache").long("source-cache").help("Source cache directory"))
                .arg(
                    Arg::new("timeout")
                        .long("timeout")
                        .default_value("3600")
                        .help("Toolchain timeout in seconds"),
                )
                .arg(
                    Arg::new("test-timeout")
                        .long("test-timeout")
                        .default_value("60")
                        .help("Timeout in seconds for each post-install step and assertion"),
                )
                .arg(flag(
                    "allow-unverified",
                    "Accept a release archive whose checksum is a placeholder",
                ))
                .arg(flag("keep-builddir", "Keep the build directory after completion"))
                .arg(flag("json", "Print the run report as JSON")),
        )
        .subcommand(
            Command::new("validate")
                .about("Validate a formula without building")
                .arg(formula_arg()),
        )
        .subcommand(
            Command::new("resolve")
                .about("Resolve templates and print the flags and toolchain command")
                .arg(formula_arg())
                .arg(prefix_arg().default_value("/usr/local"))
                .args(resolve_args())
                .arg(flag("json", "Print the variable binding and flags as JSON")),
        )
        .subcommand(
            Command::new("fetch")
                .about("Fetch and unpack sources without building")
                .arg(formula_arg())
                .arg(flag("head", "Fetch the VCS head instead of the release archive"))
                .arg(Arg::new("dest").short('d').long("dest").help("Directory to unpack into"))
                .arg(Arg::new("source-cache").long("source-cache").help("Source cache directory"))
                .arg(
                    Arg::new("timeout")
                        .long("timeout")
                        .default_value("3600")
                        .help("Timeout in seconds for each download, extraction or clone"),
                )
                .arg(flag(
                    "allow-unverified",
                    "Accept a release archive whose checksum is a placeholder",
                )),
        )
        .subcommand(
            Command::new("test")
                .about("Run the smoke tests against an installed binary")
                .arg(formula_arg())
                .arg(prefix_arg().required(true))
                .args(resolve_args())
                .arg(
                    Arg::new("test-timeout")
                        .long("test-timeout")
                        .default_value("60")
                        .help("Timeout in seconds for each assertion"),
                )
                .arg(flag("json", "Print the assertion results as JSON")),
        )
        .subcommand(
            Command::new("completions")
                .about("Generate shell completion scripts for kettle")
                .arg(
                    Arg::new("shell")
                        .required(true)
                        .value_parser(["bash", "elvish", "fish", "powershell", "zsh"])
                        .help("Shell to generate completions for"),
                ),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    // Create man directory - use CARGO_MANIFEST_DIR which is always set by cargo
    let manifest_dir = match env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(e) => {
            println!("cargo:warning=CARGO_MANIFEST_DIR not set: {}", e);
            return;
        }
    };
    let man_dir = manifest_dir.join("man");

    if let Err(e) = fs::create_dir_all(&man_dir) {
        println!("cargo:warning=Failed to create man directory: {}", e);
        return;
    }

    let man = Man::new(build_cli());
    let mut buffer = Vec::new();

    if let Err(e) = man.render(&mut buffer) {
        println!("cargo:warning=Failed to render man page: {}", e);
        return;
    }

    let man_path = man_dir.join("kettle.1");
    if let Err(e) = fs::write(&man_path, buffer) {
        println!("cargo:warning=Failed to write man page: {}", e);
    }
}
