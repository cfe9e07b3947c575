use std::env;
use std::process;

use getopts::Options;
use kartbok::gpx::read_whole_file;
use kartbok::quickroute;
use kartbok::track::geo_info;

fn print_usage(program: &str, opts: Options) {
    let brief = format!("Usage: {} -f FILE", program);
    print!("{}", opts.usage(&brief));
}

fn main() {
    env_logger::init();

    let args: Vec<String> = env::args().collect();
    let program = args[0].clone();

    let mut opts = Options::new();
    opts.optopt("f", "file", "georeferenced JPEG map", "FILE");
    opts.optflag("h", "help", "print this help menu");
    let matches = match opts.parse(&args[1..]) {
        Ok(m) => m,
        Err(f) => {
            eprintln!("{}", f);
            process::exit(2);
        }
    };
    if matches.opt_present("h") {
        print_usage(&program, opts);
        return;
    }
    let filename = match matches.opt_str("f") {
        Some(filename) => filename,
        None => {
            print_usage(&program, opts);
            return;
        }
    };

    let image = match read_whole_file(&filename) {
        Ok(image) => image,
        Err(err) => {
            eprintln!("Failed to read {}: {}", filename, err);
            process::exit(1);
        }
    };

    match quickroute::extract(&image) {
        Ok(Some(payload)) => match serde_json::to_string_pretty(&geo_info(payload)) {
            Ok(json) => println!("{}", json),
            Err(err) => {
                eprintln!("Failed to encode: {}", err);
                process::exit(1);
            }
        },
        Ok(None) => println!("{} is not georeferenced", filename),
        Err(err) => {
            eprintln!("Failed to decode {}: {}", filename, err);
            process::exit(1);
        }
    }
}
