use std::env;
use std::process;

use getopts::Options;
use kartbok::establish_connection;

fn print_usage(program: &str, opts: Options) {
    let brief = format!("Usage: {} --yes", program);
    print!("{}", opts.usage(&brief));
}

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let program = args[0].clone();

    let mut opts = Options::new();
    opts.optflag("y", "yes", "really drop every table");
    opts.optflag("h", "help", "print this help menu");
    let matches = match opts.parse(&args[1..]) {
        Ok(m) => m,
        Err(f) => {
            eprintln!("{}", f);
            process::exit(2);
        }
    };
    if matches.opt_present("h") || !matches.opt_present("y") {
        print_usage(&program, opts);
        return;
    }

    let result = establish_connection().and_then(|db| Ok(db.empty_db()?));
    if let Err(err) = result {
        eprintln!("Failed to empty DB: {}", err);
        process::exit(1);
    }
}
