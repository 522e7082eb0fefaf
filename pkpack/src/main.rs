//TODO: update clap to remove the need for this
#![allow(dangerous_implicit_autorefs)]

use std::io::{self, Write};
use std::process;
use std::rc::Rc;

use clap::{crate_description, crate_name, crate_version, App, AppSettings, Arg};
use pkpack::codec;
use pkpack::core::{Pack, README_ENTRY};
use pkpack::ext::PackExt;
use pkpack::source::{self, Source};
use pkpack::{verbose, Bundler, Config, Dispatcher, USAGE};

fn main() -> anyhow::Result<()> {
    let config = Config::from_env();
    config.scrub_env();

    let matches = App::new(crate_name!())
        .about(crate_description!())
        .version(crate_version!())
        .setting(AppSettings::TrailingVarArg)
        .setting(AppSettings::AllowLeadingHyphen)
        // Every other token belongs to the entry being run
        .setting(AppSettings::DisableHelpFlags)
        .setting(AppSettings::DisableVersion)
        .arg(
            Arg::with_name("pack")
                .help("Write a bundle of this archive to stdout, with ENTRY as its default entry")
                .long("pack")
                .takes_value(true)
                .value_name("ENTRY")
                .conflicts_with_all(&["ls", "args"]),
        )
        .arg(
            Arg::with_name("ls")
                .help("List entry paths whose beginning matches PATTERN")
                .long("ls")
                .takes_value(true)
                .min_values(0)
                .max_values(1)
                .value_name("PATTERN")
                .conflicts_with("args"),
        )
        .arg(
            Arg::with_name("args")
                .help("Entry to run, followed by its arguments")
                .multiple(true)
                .allow_hyphen_values(true)
                .value_name("ARGS"),
        )
        .get_matches();

    let archive = match Source::acquire(&config, source::stdin_is_tty(), io::stdin())? {
        Some(archive) => archive,
        None => {
            print!("{}", USAGE);
            process::exit(1);
        }
    };
    let pack = Rc::new(Pack::new(codec::unpack(&archive)?));
    verbose!("{:?}", pack);

    if let Some(entry) = matches.value_of("pack") {
        if !pack.contains(entry) {
            eprintln!("pkpack: warning: {} is not in the archive", entry);
        }
        let stdout = io::stdout();
        let mut out = stdout.lock();
        Bundler::new(&pack).entry(entry).write(&mut out)?;
        return Ok(());
    }

    if matches.is_present("ls") {
        println!("{}", pack.ls(matches.value_of("ls").unwrap_or(""))?);
        return Ok(());
    }

    let args: Vec<String> = matches
        .values_of("args")
        .map(|values| values.map(String::from).collect())
        .unwrap_or_default();

    if args.is_empty() {
        if let Some(readme) = pack.read(README_ENTRY) {
            let stdout = io::stdout();
            let mut out = stdout.lock();
            out.write_all(readme)?;
            if !readme.ends_with(b"\n") {
                out.write_all(b"\n")?;
            }
            out.flush()?;
            return Ok(());
        }
        verbose!("no {}, running the default entry", README_ENTRY);
    }

    let stdout = io::stdout();
    let mut dispatcher = Dispatcher::with_config(pack, stdout.lock(), &config);
    let outcome = dispatcher.run(&args)?;
    drop(dispatcher);

    if outcome.code != 0 {
        process::exit(outcome.code);
    }
    Ok(())
}
