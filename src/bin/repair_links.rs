use std::process;

use kartbok::{establish_connection, Service};

fn main() {
    env_logger::init();

    let service = match establish_connection() {
        Ok(db) => Service::new(db),
        Err(err) => {
            eprintln!("Failed to connect: {}", err);
            process::exit(1);
        }
    };

    match service.repair_links() {
        Ok(report) if report.is_clean() => println!("All links consistent"),
        Ok(report) => println!(
            "Repaired links: {} entries added, {} entries pulled",
            report.added, report.pulled
        ),
        Err(err) => {
            eprintln!("Repair failed: {}", err);
            process::exit(1);
        }
    }
}
