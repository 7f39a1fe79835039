//! Sdpcom command line interface.

use std::{env, process};

use clap::{crate_authors, crate_description, crate_name, crate_version, App, AppSettings::*, Arg};
use console::style;
use log::{debug, trace, LevelFilter};
use simplelog::*;

use sdpcom::{self as sdp, Error};

fn main() {
    println!("[SDP] sdpcom v{}", crate_version!());

    if let Err(e) = ctrlc::set_handler(move || {
        println!("🛑 received Ctrl+C!");
        process::exit(130);
    }) {
        eprintln!("{}: cannot install the Ctrl-C handler: {}", style("warning").yellow(), e);
    }

    let matches = App::new(crate_name!())
        .version(format!("v{}", crate_version!()).as_str())
        .author(crate_authors!())
        .about(crate_description!())
        .long_about(
            "\n\
            Sdpcom pushes boot images to an i.MX/Vybrid part waiting in serial \
            download mode. It associates with the boot ROM over the UART, then \
            processes the work items of the target one after the other:\n\
               \t* applies the memory directives of the item \n\
               \t* downloads the image to its load address \n\
               \t* starts it when asked to, and checks the device status \n\
            \n\
            The work file names the target and lists its default work items. \
            Images given on the command line replace that default list; the \
            first one is started through its image header.\
        ",
        )
        .max_term_width(80)
        .setting(ColoredHelp)
        .setting(NextLineHelp)
        .setting(TrailingVarArg)
        .arg(
            Arg::with_name("UART")
                .help("the serial device connected to the boot ROM")
                .required(true)
                .index(1),
        )
        .arg(
            Arg::with_name("CONFIG")
                .help("the work file of the target")
                .long_help(
                    "the work file of the target; looked for next to the \
                     executable, then in /etc/imx-loader.d/.",
                )
                .required(true)
                .index(2),
        )
        .arg(
            Arg::with_name("JOBS")
                .help("images to load, each optionally followed by -l <addr> and -s <size>")
                .multiple(true)
                .allow_hyphen_values(true)
                .index(3),
        )
        .arg(
            Arg::with_name("VERIFY")
                .help("read back and compare every downloaded image")
                .short("-v")
                .long("--verify"),
        )
        .arg(
            Arg::with_name("NO_CTSRTS")
                .help("do not use RTS/CTS flow control")
                .short("-n")
                .long("--no-ctsrts"),
        )
        .arg(Arg::with_name("d").short("d").multiple(true).help(
            "Sets the logging level of verbosity, repeat several times for \
                higher verbosity",
        ))
        .get_matches();

    // Vary the output based on how many times the user used the "debug" flag
    // (i.e. 'sdpcom -d -d -d' or 'sdpcom -ddd' vs 'sdpcom -d'
    let log_level = match matches.occurrences_of("d") {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Info,
        2 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    };

    if let Err(e) = TermLogger::init(
        log_level,
        Config::default(),
        TerminalMode::Mixed,
        ColorChoice::Auto,
    ) {
        eprintln!("{}: logging is unavailable: {}", style("warning").yellow(), e);
    }

    trace!("{:#?}", matches);

    // Required arguments are always present once clap returns the matches.
    let uart = matches.value_of("UART").unwrap_or_default();
    let config = matches.value_of("CONFIG").unwrap_or_default();
    let job_args: Vec<&str> = matches
        .values_of("JOBS")
        .map(|values| values.collect())
        .unwrap_or_default();

    let jobs = sdp::parse_jobs(&job_args[..]).unwrap_or_else(|e| {
        println!("{}: {}", style("error").red(), e);
        process::exit(-1);
    });

    let settings = sdp::SettingsBuilder::new()
        .path(uart)
        .work_file(config)
        .verify(matches.is_present("VERIFY"))
        .use_flow_control(!matches.is_present("NO_CTSRTS"))
        .finalize();
    debug!("{:#?}", settings);

    // Run the session =========================================================

    let exe = env::current_exe().ok();
    let exit_code = match sdp::load(&settings, jobs, exe.as_deref()) {
        Ok(()) => {
            println!("[SDP] {}", style("done").green());
            0
        }
        Err(e) => {
            println!("{}: {}", style("error").red(), e);
            if let Error::HandshakeMismatch { .. } = e {
                println!(
                    "   {} is the board strapped for serial download?",
                    style("-->").cyan()
                );
            }
            1
        }
    };
    debug!("exit code: {}", exit_code);
    process::exit(exit_code);
}
